//! Exporter configuration.
//!
//! Loaded from a TOML file. Every section is optional and falls back to
//! its defaults:
//!
//! ```toml
//! log_level = "info"
//!
//! [source]
//! kind = "remote"            # or "local"
//!
//! [source.remote]
//! hostname = "localhost"
//! port = 8176
//! username = "admin"
//! password = "secret"
//!
//! [collect]
//! variables = true
//! device_states = false
//!
//! [endpoint]
//! port = 8176
//! ```

use crate::coercion::CoercionRules;
use crate::collection::CollectConfig;
use crate::source::{SourceConfig, SourceKind};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Ports accepted for the metrics endpoint.
pub const ENDPOINT_PORTS: RangeInclusive<u16> = 1024..=49151;

/// Endpoint port used with a remote source when none is configured.
pub const DEFAULT_REMOTE_ENDPOINT_PORT: u16 = 8176;

/// Endpoint port used with a local source when none is configured.
pub const DEFAULT_LOCAL_ENDPOINT_PORT: u16 = 9176;

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Endpoint port outside the registered port range.
    #[error("endpoint port {0} out of range (must be 1024-49151)")]
    InvalidPort(u16),
    /// Remote source without a hostname.
    #[error("remote source requires a hostname")]
    MissingHostname,
    /// Password set but no username.
    #[error("password configured without a username")]
    PasswordWithoutUsername,
    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// Config file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Listen port; defaults depend on the source kind.
    #[serde(default)]
    pub port: Option<u16>,
}

/// Label configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelsConfig {
    /// Template for the `user_info` label on variables and devices.
    #[serde(default)]
    pub user_info: Option<String>,
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Entity source settings.
    #[serde(default)]
    pub source: SourceConfig,
    /// Pass gates.
    #[serde(default)]
    pub collect: CollectConfig,
    /// Truth tokens for string coercion.
    #[serde(default)]
    pub coercion: CoercionRules,
    /// Extra labels.
    #[serde(default)]
    pub labels: LabelsConfig,
    /// Metrics endpoint.
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            source: SourceConfig::default(),
            collect: CollectConfig::default(),
            coercion: CoercionRules::default(),
            labels: LabelsConfig::default(),
            endpoint: EndpointConfig::default(),
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let port = self.endpoint_port();
        if !ENDPOINT_PORTS.contains(&port) {
            return Err(ConfigError::InvalidPort(port));
        }
        if self.source.kind == SourceKind::Remote {
            let remote = &self.source.remote;
            if remote.hostname.trim().is_empty() {
                return Err(ConfigError::MissingHostname);
            }
            if remote.username.is_none() && remote.password.is_some() {
                return Err(ConfigError::PasswordWithoutUsername);
            }
        }
        Ok(())
    }

    /// Returns the metrics endpoint port.
    pub fn endpoint_port(&self) -> u16 {
        self.endpoint.port.unwrap_or(match self.source.kind {
            SourceKind::Remote => DEFAULT_REMOTE_ENDPOINT_PORT,
            SourceKind::Local => DEFAULT_LOCAL_ENDPOINT_PORT,
        })
    }
}
