//! Prometheus exposition.
//!
//! Every request to `/metrics` runs one scrape and encodes its metrics in
//! the Prometheus text format, in scrape order, followed by the exporter's
//! own metrics.
//!
//! # Metrics Exposed
//!
//! ## Entity Metrics
//! - `indigo_var_<id>` - Variable value
//! - `indigo_dev_<id>` - Device headline value
//! - `indigo_dev_<id>_<state>` - Device state reported by a custom mapping
//!
//! ## Exporter Metrics
//! - `indigo_exporter_scrapes_total` - Scrapes served
//! - `indigo_exporter_scrape_failures_total` - Scrapes failed on source outage
//! - `indigo_exporter_last_scrape_duration_seconds` - Last scrape duration
//! - `indigo_exporter_last_scrape_metrics` - Entity metrics in the last scrape
//! - `indigo_exporter_last_scrape_skipped` - Entities excluded or not coercible
//! - `indigo_exporter_last_scrape_failed` - Entities skipped on faults
//!
//! # Example
//!
//! ```no_run
//! use indigo_exporter::metrics::{render, ExporterMetrics};
//! use indigo_exporter::{Assembler, CollectConfig, Coercer, Collector, LocalRegistry, Variable};
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
//! let exporter = ExporterMetrics::new().expect("Failed to create registry");
//!
//! let body = render(&collector, &exporter).unwrap();
//! assert!(body.contains("indigo_var_5"));
//! ```

mod exposition;
mod registry;
#[cfg(feature = "server")]
mod server;

pub use exposition::{encode_metrics, metric_family, render, ExpositionError};
pub use registry::{ExporterMetrics, MetricsError};
#[cfg(feature = "server")]
pub use server::{shutdown_signal, MetricsServer, MetricsServerConfig, MetricsState, ServerError};
