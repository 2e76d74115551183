//! Entity sources.
//!
//! An [`EntitySource`] enumerates the controller's variables, devices and
//! custom mappings, and accepts the state updates that collecting a custom
//! mapping produces. Two implementations are provided:
//!
//! - [`RemoteSource`] polls the controller's REST API over HTTP
//! - [`LocalRegistry`] serves entities from an in-process registry

mod local;
mod remote;

pub use local::{LocalConfig, LocalRegistry, RegistrySnapshot};
pub use remote::{RemoteConfig, RemoteSource};

use crate::entity::{CustomMapping, Device, RawValue, Variable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by entity sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP transport failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Response body did not decode.
    #[error("failed to decode JSON from {url}: {source}")]
    Json {
        /// Requested URL.
        url: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The digest challenge could not be answered.
    #[error("digest authentication failed: {0}")]
    Auth(String),
    /// No device with this id.
    #[error("device not found: {0}")]
    NotFound(i64),
    /// No custom mapping with this id.
    #[error("custom mapping not found: {0}")]
    MappingNotFound(i64),
    /// The source cannot perform this operation.
    #[error("operation not supported by this source: {0}")]
    Unsupported(&'static str),
    /// Snapshot file missing or malformed.
    #[error("failed to load registry snapshot: {0}")]
    Snapshot(String),
    /// A writer panicked while holding the registry lock.
    #[error("entity registry lock poisoned")]
    Poisoned,
}

/// Lazy sequence of entities; each item may fail on its own.
pub type Entities<'a, T> = Box<dyn Iterator<Item = Result<T, SourceError>> + 'a>;

/// Source of controller entities.
///
/// Listing calls fail as a whole only when the listing itself cannot be
/// obtained. Failures resolving a single entity surface as `Err` items so
/// the caller can skip that entity and keep going.
pub trait EntitySource: Send + Sync {
    /// Enumerates all variables.
    fn variables(&self) -> Result<Entities<'_, Variable>, SourceError>;

    /// Enumerates all devices, including custom mapping devices.
    fn devices(&self) -> Result<Entities<'_, Device>, SourceError>;

    /// Enumerates all custom mappings.
    fn custom_mappings(&self) -> Result<Entities<'_, CustomMapping>, SourceError>;

    /// Fetches a single device by id.
    fn device(&self, id: i64) -> Result<Device, SourceError>;

    /// Writes named states onto a custom mapping.
    fn write_mapping_states(&self, id: i64, states: &[(&str, RawValue)])
        -> Result<(), SourceError>;

    /// Sets or clears a custom mapping's error indicator.
    fn set_mapping_error(&self, id: i64, message: Option<String>) -> Result<(), SourceError>;
}

/// Which entity source to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Poll the controller's REST API.
    #[default]
    Remote,
    /// Serve entities from an in-process registry.
    Local,
}

/// Entity source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source implementation.
    pub kind: SourceKind,
    /// Owner id of devices created by this exporter.
    pub exporter_id: String,
    /// Remote source settings.
    pub remote: RemoteConfig,
    /// Local source settings.
    pub local: LocalConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            exporter_id: "indigo-exporter".into(),
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
        }
    }
}

/// Builds the configured entity source.
pub fn from_config(config: &SourceConfig) -> Result<Arc<dyn EntitySource>, SourceError> {
    match config.kind {
        SourceKind::Remote => Ok(Arc::new(RemoteSource::new(&config.remote)?)),
        SourceKind::Local => {
            let registry = match &config.local.snapshot {
                Some(path) => LocalRegistry::from_snapshot_file(path, &config.exporter_id)?,
                None => LocalRegistry::new(&config.exporter_id),
            };
            Ok(Arc::new(registry))
        }
    }
}
