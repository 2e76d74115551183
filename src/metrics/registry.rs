//! Exporter self-metrics.

use crate::collection::ScrapeSummary;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation, registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus registry describing the exporter's own scrapes.
pub struct ExporterMetrics {
    registry: Registry,

    scrapes_total: IntCounter,
    scrape_failures_total: IntCounter,
    last_scrape_duration_seconds: Gauge,
    last_scrape_metrics: IntGauge,
    last_scrape_skipped: IntGauge,
    last_scrape_failed: IntGauge,
}

impl ExporterMetrics {
    /// Creates a registry with all exporter metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let scrapes_total = IntCounter::new(
            "indigo_exporter_scrapes_total",
            "Total number of scrapes served",
        )?;
        let scrape_failures_total = IntCounter::new(
            "indigo_exporter_scrape_failures_total",
            "Scrapes that failed because the entity source was unavailable",
        )?;
        let last_scrape_duration_seconds = Gauge::new(
            "indigo_exporter_last_scrape_duration_seconds",
            "Duration of the last successful scrape",
        )?;
        let last_scrape_metrics = IntGauge::new(
            "indigo_exporter_last_scrape_metrics",
            "Entity metrics produced by the last scrape",
        )?;
        let last_scrape_skipped = IntGauge::new(
            "indigo_exporter_last_scrape_skipped",
            "Entities that produced no metric in the last scrape",
        )?;
        let last_scrape_failed = IntGauge::new(
            "indigo_exporter_last_scrape_failed",
            "Entities skipped because of a fault in the last scrape",
        )?;

        registry.register(Box::new(scrapes_total.clone()))?;
        registry.register(Box::new(scrape_failures_total.clone()))?;
        registry.register(Box::new(last_scrape_duration_seconds.clone()))?;
        registry.register(Box::new(last_scrape_metrics.clone()))?;
        registry.register(Box::new(last_scrape_skipped.clone()))?;
        registry.register(Box::new(last_scrape_failed.clone()))?;

        Ok(Self {
            registry,
            scrapes_total,
            scrape_failures_total,
            last_scrape_duration_seconds,
            last_scrape_metrics,
            last_scrape_skipped,
            last_scrape_failed,
        })
    }

    /// Records a completed scrape.
    pub fn record(&self, summary: &ScrapeSummary) {
        self.scrapes_total.inc();
        self.last_scrape_duration_seconds
            .set(summary.duration.as_secs_f64());
        self.last_scrape_metrics.set(summary.emitted as i64);
        self.last_scrape_skipped.set(summary.omitted as i64);
        self.last_scrape_failed.set(summary.failed as i64);
    }

    /// Records a scrape that could not be served.
    pub fn record_failure(&self) {
        self.scrapes_total.inc();
        self.scrape_failures_total.inc();
    }

    /// Appends all exporter metrics in Prometheus text format.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> Result<(), prometheus::Error> {
        TextEncoder::new().encode(&self.registry.gather(), buffer)
    }

    /// Encodes all exporter metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        self.encode_into(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
