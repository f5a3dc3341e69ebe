//! Bridge configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Event bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name of the reducer thread
    pub reducer_thread_name: String,
    /// Name of the default-path worker thread
    pub path_thread_name: String,
    /// Notify the user when the tunnel goes down with an error
    pub notify_on_failure: bool,
    /// Also notify for error states not preceded by an erroring disconnect
    pub notify_on_error_state: bool,
    /// Title of failure notifications
    pub failure_title: String,
    /// How long hosts wait for the tunnel to start (seconds)
    pub start_timeout_secs: u64,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl BridgeConfig {
    /// Parse a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&input)
    }

    /// Startup wait budget
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.reducer_thread_name, &self.path_thread_name] {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyThreadName);
            }
            if name.contains('\0') {
                return Err(ConfigError::InvalidThreadName(name.to_string()));
            }
        }
        let notifies = self.notify_on_failure || self.notify_on_error_state;
        if notifies && self.failure_title.trim().is_empty() {
            return Err(ConfigError::EmptyTitle);
        }
        if self.start_timeout_secs == 0 {
            return Err(ConfigError::ZeroStartTimeout);
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reducer_thread_name: "tunnel-reducer".to_string(),
            path_thread_name: "tunnel-path".to_string(),
            notify_on_failure: true,
            notify_on_error_state: false,
            failure_title: "VPN".to_string(),
            start_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Thread names must not be empty")]
    EmptyThreadName,

    #[error("Thread name {0:?} contains a NUL byte")]
    InvalidThreadName(String),

    #[error("Failure notification title must not be empty")]
    EmptyTitle,

    #[error("Start timeout must be at least one second")]
    ZeroStartTimeout,

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to read config: {0}")]
    Io(String),
}
