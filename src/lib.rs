//! Indigo Prometheus Exporter Library
//!
//! Exposes the live state of an Indigo home-automation controller
//! (variables, devices and custom mappings) as Prometheus metrics.
//!
//! # Architecture
//!
//! Each scrape runs the same pipeline:
//!
//! ```text
//! source → coercion → assembly → exposition
//!    ↑                    │
//!    └──── writeback ─────┘ (custom mappings)
//! ```
//!
//! # Design Principles
//!
//! - **Stateless scrapes**: every scrape recomputes from live entity state
//! - **Stable names**: metric names derive from entity ids, not names
//! - **Failure isolation**: one bad entity never fails a whole scrape
//! - **Fresh derived values**: custom mappings are collected first
//!
//! # Example
//!
//! ```no_run
//! use indigo_exporter::{
//!     assembly::Assembler,
//!     coercion::Coercer,
//!     collection::{CollectConfig, Collector},
//!     entity::Variable,
//!     source::LocalRegistry,
//! };
//! use std::sync::Arc;
//!
//! let registry = LocalRegistry::new("indigo-exporter");
//! registry.insert_variable(Variable::new(5, "Temp", "72.5")).unwrap();
//!
//! let collector = Collector::new(
//!     Arc::new(registry),
//!     Assembler::new(Coercer::default(), "indigo-exporter"),
//!     CollectConfig::default(),
//! );
//!
//! for metric in collector.scrape() {
//!     println!("{} = {}", metric.name, metric.value);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod assembly;
pub mod coercion;
pub mod collection;
pub mod config;
pub mod entity;
pub mod metrics;
pub mod source;

// Re-export commonly used types at crate root
pub use assembly::{Assembler, Metric, MetricKind, TemplateEngine};
pub use coercion::{Coercer, CoercionRules, MetricValue};
pub use collection::{CollectConfig, CollectError, Collector, Scrape, ScrapeSummary};
pub use config::FileConfig;
pub use entity::{CustomMapping, Device, RawValue, Variable};
pub use source::{EntitySource, LocalRegistry, RemoteSource, SourceError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds a collector from a loaded configuration.
pub fn collector_from_config(config: &FileConfig) -> Result<Collector, SourceError> {
    let source = source::from_config(&config.source)?;
    let assembler = Assembler::new(Coercer::new(&config.coercion), &config.source.exporter_id)
        .with_user_info(config.labels.user_info.clone());
    Ok(Collector::new(source, assembler, config.collect.clone()))
}
