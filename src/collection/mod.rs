//! Collection orchestration.
//!
//! Drives a scrape across custom mappings, variables and devices,
//! isolating per-entity failures and applying custom mapping writeback.

mod orchestrator;
mod writeback;

pub use orchestrator::{Collector, Pass, Scrape, ScrapeSummary};
pub use writeback::Writeback;

use crate::source::SourceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while collecting entities.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The source failed to produce an entity.
    #[error("entity source error: {0}")]
    Source(#[from] SourceError),
    /// A custom mapping refers to a state its source device lacks.
    #[error("device {device} has no state named {state:?}")]
    MissingState {
        /// Source device id.
        device: i64,
        /// Requested state name.
        state: String,
    },
    /// Processing an entity panicked.
    #[error("entity processing panicked")]
    Panicked,
    /// Every attempted variable and device listing failed.
    #[error("entity source unavailable ({failed_listings} listings failed)")]
    SourceUnavailable {
        /// Number of listings that failed.
        failed_listings: u64,
    },
}

/// Which optional passes run on each scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Report variables.
    pub variables: bool,
    /// Report device headline values.
    pub device_states: bool,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            variables: true,
            device_states: false,
        }
    }
}
