//! Configuration file
//!
//! JSON, every field optional:
//!
//! ```json
//! {
//!   "http": { "host": "0.0.0.0", "port": 54321, "cors_origins": [], "max_await_ms": 3600000 },
//!   "logging": { "level": "info", "format": "readable" },
//!   "topology": { "me": "localhost:54321", "role": "standalone" }
//! }
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_server::HttpServerConfig;
use crate::observability::LoggingConfig;
use crate::topology::{DescriptionError, ReplicaSetDescription};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("http.port must be > 0")]
    ZeroPort,

    #[error("http.max_await_ms must be > 0")]
    ZeroMaxAwait,

    #[error("logging: {0}")]
    Logging(String),

    #[error("topology: {0}")]
    Topology(#[from] DescriptionError),
}

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Description published at counter 0
    #[serde(default)]
    pub topology: ReplicaSetDescription,
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.http.max_await_ms == 0 {
            return Err(ConfigError::ZeroMaxAwait);
        }

        self.logging.level_filter().map_err(ConfigError::Logging)?;
        self.topology.validate()?;

        Ok(())
    }

    /// Write this configuration to `path`, refusing to replace an existing file
    pub fn write_new(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => ConfigError::AlreadyExists(path.to_path_buf()),
                _ => ConfigError::Write {
                    path: path.to_path_buf(),
                    source,
                },
            })?;

        file.write_all(content.as_bytes())
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}
