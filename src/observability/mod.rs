//! Observability subsystem for topowatch
//!
//! - Structured logging through `tracing`, every lifecycle line tagged with an [`Event`]
//! - Lock-free counters in [`MetricsRegistry`]
//!
//! Observability is read-only: nothing here influences how requests are answered.
//!
//! # Usage
//!
//! ```ignore
//! use topowatch::observability::{self, Event, LoggingConfig, MetricsRegistry};
//!
//! observability::init(&LoggingConfig::default())?;
//! tracing::info!(event = %Event::BootStart, "starting");
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_publishes();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{init, LogFormat, LoggingConfig, FILTER_ENV};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
