//! CLI module for topowatch
//!
//! Provides command-line interface for:
//! - init: Write a default configuration file
//! - serve: Run the HTTP server until Ctrl-C

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, run, run_command, serve};
pub use config::{Config, ConfigError};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_response;
