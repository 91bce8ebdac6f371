//! # topowatch HTTP Server Module
//!
//! Carries hello requests over HTTP with Extended JSON bodies.
//!
//! # Endpoints
//!
//! - `POST /hello` - Awaitable topology request
//! - `POST /topology` - Publish a new replica set description
//! - `GET /health` - Health check
//! - `GET /metrics` - Counters and pending waiters

pub mod config;
pub mod hello_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use hello_routes::{hello_routes, HelloState};
pub use server::HttpServer;
