//! CLI command implementations

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::http_server::HttpServer;
use crate::observability::{self, Event};
use crate::topology::Notifier;

use super::args::Command;
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the requested command.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Serve { config, port } => serve(&config, port),
    }
}

/// Write a default configuration file
///
/// Fails if a file already exists at `config_path`.
pub fn init(config_path: &Path) -> CliResult<()> {
    Config::default().write_new(config_path)?;

    write_response(json!({
        "initialized": true,
        "config": config_path.display().to_string(),
    }))
}

/// Serve hello requests over HTTP until Ctrl-C
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = Config::load(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
        config.validate()?;
    }

    observability::init(&config.logging).map_err(CliError::config_error)?;
    info!(event = %Event::BootStart, version = env!("CARGO_PKG_VERSION"), "starting topowatch");
    info!(
        event = %Event::ConfigLoaded,
        path = %config_path.display(),
        addr = %config.http.socket_addr(),
        role = %config.topology.role,
        "configuration loaded"
    );

    let notifier = Arc::new(Notifier::new(config.topology.clone()));
    let server = HttpServer::with_config(config.http.clone(), notifier);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        server
            .start(shutdown_signal())
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the server runs until killed.
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topowatch.json");

        init(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topowatch.json");

        init(&path).unwrap();
        let err = init(&path).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::AlreadyInitialized);
    }

    #[test]
    fn test_serve_without_config_fails() {
        let dir = TempDir::new().unwrap();
        let err = serve(&dir.path().join("absent.json"), None).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::ConfigError);
    }

    #[test]
    fn test_serve_rejects_zero_port_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topowatch.json");
        init(&path).unwrap();

        let err = serve(&path, Some(0)).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::ConfigError);
    }
}
