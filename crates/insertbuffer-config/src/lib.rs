//! Configuration management for insertbuffer
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (INSERTBUFFER_* prefix)
//! 3. An explicit config file (`--config`)
//! 4. ~/.config/insertbuffer/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Default listening socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/insertbuffer.socket";

/// Key that must appear in the database parameters.
const DATABASE_KEY: &str = "db";

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket clients connect to.
    pub socket_path: PathBuf,
    /// Number of statements buffered before clients are throttled.
    pub buffer_size: usize,
    /// Concurrent client connections.
    pub max_connections: usize,
    /// Largest accepted request payload, in bytes.
    pub max_payload_size: usize,
    /// `IP:PORT` of the HTTP status endpoint, if any.
    pub status_address: Option<String>,
    /// Backend connection parameters, e.g. `db=shop path=/var/lib/shop.db`.
    pub database: Option<String>,
    pub worker: WorkerSection,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            buffer_size: 20_000,
            max_connections: 1024,
            max_payload_size: 16 * 1024 * 1024,
            status_address: None,
            database: None,
            worker: WorkerSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Pause between reconnect attempts, in milliseconds.
    pub retry_interval_ms: u64,
    /// Executions per statement before it is counted as an error.
    pub max_attempts: u32,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            retry_interval_ms: 1000,
            max_attempts: 2,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration with an explicit file layered on top of the defaults
    pub fn load_with_file(path: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_file(path).load()
    }

    /// Parse a TOML document on its own, without other sources.
    pub fn from_toml_str(path: impl Into<PathBuf>, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::ParseError {
            path: path.into(),
            source,
        })
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Pause between reconnect attempts.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.worker.retry_interval_ms)
    }

    /// Parsed status endpoint address.
    pub fn status_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.status_address
            .as_deref()
            .map(|addr| {
                addr.parse().map_err(|_| {
                    ConfigError::ValidationError(format!(
                        "status_address {addr:?} is not an IP:PORT address"
                    ))
                })
            })
            .transpose()
    }

    /// Check that the configuration can start a daemon.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "buffer_size must be at least 1".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.worker.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "worker.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "socket_path must not be empty".to_string(),
            ));
        }

        let Some(database) = self.database.as_deref() else {
            return Err(ConfigError::ValidationError(
                "database connection parameters are required".to_string(),
            ));
        };
        let has_db = database
            .split_whitespace()
            .filter_map(|pair| pair.split_once('='))
            .any(|(key, _)| key == DATABASE_KEY);
        if !has_db {
            return Err(ConfigError::ValidationError(format!(
                "database parameters must include {DATABASE_KEY}=<name>"
            )));
        }

        self.status_addr()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn valid() -> DaemonConfig {
        DaemonConfig {
            database: Some("db=shop".to_string()),
            ..DaemonConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/insertbuffer.socket"));
        assert_eq!(config.buffer_size, 20_000);
        assert_eq!(config.worker.max_attempts, 2);
        assert_eq!(config.retry_interval(), Duration::from_secs(1));
        assert!(config.database.is_none());
    }

    #[test]
    fn test_valid_config() {
        valid().validate().unwrap();
    }

    #[test_case("database = 'db=shop'\nbuffer_size = 0"; "zero buffer")]
    #[test_case("database = 'db=shop'\nmax_connections = 0"; "zero connections")]
    #[test_case("database = 'db=shop'\n[worker]\nmax_attempts = 0"; "zero attempts")]
    #[test_case("buffer_size = 10"; "no database")]
    #[test_case("database = 'path=/x.db'"; "no db key")]
    #[test_case("database = 'dbx=1'"; "db prefix only")]
    #[test_case("database = 'db=shop'\nstatus_address = 'localhost'"; "bad status address")]
    fn test_invalid_config(doc: &str) {
        let config = DaemonConfig::from_toml_str("test.toml", doc).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_status_addr() {
        let mut config = valid();
        assert_eq!(config.status_addr().unwrap(), None);
        config.status_address = Some("127.0.0.1:8080".to_string());
        assert_eq!(
            config.status_addr().unwrap(),
            Some("127.0.0.1:8080".parse().unwrap())
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = valid();
        config.status_address = Some("127.0.0.1:9000".to_string());
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[worker]"));
        assert_eq!(DaemonConfig::from_toml_str("x.toml", &rendered).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = DaemonConfig::from_toml_str("x.toml", "buffer_size = 5\n").unwrap();
        assert_eq!(config.buffer_size, 5);
        assert_eq!(config.max_connections, 1024);
    }

    #[test]
    fn test_bad_toml_names_file() {
        let err = DaemonConfig::from_toml_str("broken.toml", "buffer_size = ").unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
