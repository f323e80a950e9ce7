//! Daemon configuration.
//!
//! Read from `$XDG_CONFIG_HOME/shortstop/config.toml` when present. Every
//! field has a default, so an empty or missing file is a valid config.
//! `SHORTSTOP_SOCKET` and `SHORTSTOP_STORE` override the two paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;
use tracing::debug;

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "SHORTSTOP_SOCKET";

/// Environment variable overriding the store path.
pub const STORE_ENV: &str = "SHORTSTOP_STORE";

const APP_DIR: &str = "shortstop";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("invalid config {path}: {error}")]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on.
    pub socket_path: PathBuf,

    /// JSON file backing the counter store.
    pub store_path: PathBuf,

    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Whether intervention notifications are shown at all.
    pub notifications_enabled: bool,

    pub classifier: ClassifierConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            store_path: default_store_path(),
            log_filter: "shortstopd=info".to_string(),
            notifications_enabled: true,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Loads config from the default location plus env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Loads config from `path`; a missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    error,
                })
            }
        };
        Self::parse(&text).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Applies `SHORTSTOP_SOCKET` / `SHORTSTOP_STORE` overrides.
    pub fn apply_env(&mut self) {
        if let Some(socket) = std::env::var_os(SOCKET_ENV).filter(|v| !v.is_empty()) {
            self.socket_path = PathBuf::from(socket);
        }
        if let Some(store) = std::env::var_os(STORE_ENV).filter(|v| !v.is_empty()) {
            self.store_path = PathBuf::from(store);
        }
    }
}

/// Timing of the view classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Time an item must stay on screen to count as watched.
    pub dwell_ms: u64,
    /// Watch-time tick period while media plays.
    pub tick_ms: u64,
    /// Media element discovery retry period.
    pub discovery_retry_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 1000,
            tick_ms: 1000,
            discovery_retry_ms: 50,
        }
    }
}

impl ClassifierConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn discovery_retry(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_ms.max(1))
    }
}

/// Default socket path: `$XDG_RUNTIME_DIR/shortstop.sock`, else `/tmp`.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("shortstop.sock")
}

/// Default store path: `$XDG_DATA_HOME/shortstop/store.json`.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("store.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.classifier.dwell(), Duration::from_millis(1000));
        assert_eq!(config.classifier.discovery_retry(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = DaemonConfig::parse(
            r#"
            notifications_enabled = false

            [classifier]
            dwell_ms = 1500
            "#,
        )
        .unwrap();
        assert!(!config.notifications_enabled);
        assert_eq!(config.classifier.dwell_ms, 1500);
        assert_eq!(config.classifier.tick_ms, 1000);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = DaemonConfig::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "dwell_ms = [").unwrap();
        assert!(matches!(
            DaemonConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
