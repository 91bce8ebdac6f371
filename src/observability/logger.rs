//! Logging setup
//!
//! Logs go through `tracing`. The subscriber is installed once per process,
//! in one of two formats: human readable lines or one JSON object per line.
//!
//! The `TOPOWATCH_LOG` environment variable, when set, overrides the configured
//! level with a full filter directive (e.g. `topowatch=debug,tower_http=warn`).

use std::fmt;
use std::str::FromStr;
use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// ENV used to override the log filter
pub const FILTER_ENV: &str = "TOPOWATCH_LOG";

/// Default log level
const DEFAULT_FILTER_LEVEL: &str = "info";

static INIT: Once = Once::new();

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Readable,
    /// One JSON object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Readable => write!(f, "readable"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    DEFAULT_FILTER_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Parse the configured level.
    pub fn level_filter(&self) -> Result<LevelFilter, String> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| format!("unknown log level '{}'", self.level))
    }

    /// Build the filter: `TOPOWATCH_LOG` if set, the configured level otherwise.
    pub fn env_filter(&self) -> Result<EnvFilter, String> {
        let level = self.level_filter()?;
        Ok(EnvFilter::builder()
            .with_default_directive(level.into())
            .with_env_var(FILTER_ENV)
            .from_env_lossy())
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(config: &LoggingConfig) -> Result<(), String> {
    let filter = config.env_filter()?;
    let format = config.format;

    INIT.call_once(move || {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);

        // Another subscriber may already be installed (tests, embedding
        // applications); keep it.
        let _ = match format {
            LogFormat::Readable => builder.try_init(),
            LogFormat::Json => builder.json().flatten_event(true).try_init(),
        };
    });

    Ok(())
}
