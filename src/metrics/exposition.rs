//! Text exposition of scraped metrics.

use super::ExporterMetrics;
use crate::assembly::{Metric, MetricKind};
use crate::collection::{CollectError, Collector};
use prometheus::proto::{self, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur while rendering a scrape.
#[derive(Debug, Error)]
pub enum ExpositionError {
    /// Text encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    /// The scrape itself failed.
    #[error("collection failed: {0}")]
    Collect(#[from] CollectError),
}

/// Converts an assembled metric into a single-sample metric family.
pub fn metric_family(metric: &Metric) -> MetricFamily {
    let mut sample = proto::Metric::default();
    for (name, value) in &metric.labels {
        let mut pair = proto::LabelPair::default();
        pair.set_name(name.clone());
        pair.set_value(value.clone());
        sample.mut_label().push(pair);
    }

    let value = metric.value.as_f64();
    let field_type = match metric.kind {
        MetricKind::Gauge => {
            let mut gauge = proto::Gauge::default();
            gauge.set_value(value);
            sample.set_gauge(gauge);
            MetricType::GAUGE
        }
        MetricKind::Counter => {
            let mut counter = proto::Counter::default();
            counter.set_value(value);
            sample.set_counter(counter);
            MetricType::COUNTER
        }
    };

    let mut family = MetricFamily::default();
    family.set_name(metric.name.clone());
    family.set_help(metric.help.clone());
    family.set_field_type(field_type);
    family.mut_metric().push(sample);
    family
}

/// Encodes metrics in Prometheus text format as they are produced.
///
/// A metric whose name was already written in this exposition is dropped
/// with a warning, since a repeated family is rejected by scrapers.
pub fn encode_metrics<I>(metrics: I, buffer: &mut Vec<u8>) -> Result<usize, prometheus::Error>
where
    I: IntoIterator<Item = Metric>,
{
    let encoder = TextEncoder::new();
    let mut seen = HashSet::new();
    let mut written = 0;

    for metric in metrics {
        if !seen.insert(metric.name.clone()) {
            tracing::warn!(name = %metric.name, "Duplicate metric name dropped");
            continue;
        }
        encoder.encode(&[metric_family(&metric)], buffer)?;
        written += 1;
    }
    Ok(written)
}

/// Runs one scrape and renders the full `/metrics` response body.
///
/// The exporter's own metrics are appended after the entity metrics.
pub fn render(collector: &Collector, exporter: &ExporterMetrics) -> Result<String, ExpositionError> {
    let mut buffer = Vec::new();
    let mut scrape = collector.scrape();
    let written = encode_metrics(scrape.by_ref(), &mut buffer);

    let summary = match (written, scrape.finish()) {
        (Ok(_), Ok(summary)) => summary,
        (Err(e), _) => {
            exporter.record_failure();
            return Err(e.into());
        }
        (_, Err(e)) => {
            exporter.record_failure();
            return Err(e.into());
        }
    };

    exporter.record(&summary);
    tracing::info!(
        metrics = summary.emitted,
        failed = summary.failed,
        duration_ms = summary.duration.as_millis() as u64,
        "Scrape complete"
    );

    exporter.encode_into(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Assembler, Labels};
    use crate::coercion::{Coercer, MetricValue};
    use crate::collection::CollectConfig;
    use crate::entity::{CustomMapping, Device, Variable};
    use crate::source::LocalRegistry;
    use std::sync::Arc;

    fn encode(metrics: Vec<Metric>) -> String {
        let mut buffer = Vec::new();
        encode_metrics(metrics, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_gauge_line() {
        let mut labels = Labels::new();
        labels.insert("name".into(), "Temp".into());
        labels.insert("readOnly".into(), "False".into());
        let output = encode(vec![Metric {
            name: "indigo_var_5".into(),
            help: "Temp".into(),
            kind: MetricKind::Gauge,
            labels,
            value: MetricValue::Float(72.5),
        }]);

        assert!(output.contains("# HELP indigo_var_5 Temp"));
        assert!(output.contains("# TYPE indigo_var_5 gauge"));
        assert!(output.contains(r#"indigo_var_5{name="Temp",readOnly="False"} 72.5"#));
    }

    #[test]
    fn test_counter_and_bool_value() {
        let output = encode(vec![Metric {
            name: "indigo_dev_3_power".into(),
            help: "Power".into(),
            kind: MetricKind::Counter,
            labels: Labels::new(),
            value: MetricValue::Bool(true),
        }]);
        assert!(output.contains("# TYPE indigo_dev_3_power counter"));
        assert!(output.contains("indigo_dev_3_power 1"));
    }

    #[test]
    fn test_duplicate_names_dropped() {
        let metric = Metric {
            name: "indigo_dev_3_t".into(),
            help: "t".into(),
            kind: MetricKind::Gauge,
            labels: Labels::new(),
            value: MetricValue::Int(1),
        };
        let mut buffer = Vec::new();
        let written = encode_metrics(vec![metric.clone(), metric], &mut buffer).unwrap();
        assert_eq!(written, 1);
    }

    #[test]
    fn test_render_full_scrape() {
        let registry = LocalRegistry::new("me");
        registry.insert_variable(Variable::new(5, "Temp", "72.5")).unwrap();
        registry
            .insert_device(Device::new(3, "Thermostat").with_state("temperature", "68"))
            .unwrap();
        registry
            .insert_mapping(CustomMapping::new(Device::new(40, "Outdoor"), 3, "temperature"))
            .unwrap();

        let collector = Collector::new(
            Arc::new(registry),
            Assembler::new(Coercer::default(), "me"),
            CollectConfig::default(),
        );
        let exporter = ExporterMetrics::new().unwrap();
        let output = render(&collector, &exporter).unwrap();

        let custom = output.find("indigo_dev_3_temperature{").unwrap();
        let var = output.find("indigo_var_5{").unwrap();
        assert!(custom < var);
        assert!(output.contains("indigo_exporter_scrapes_total 1"));
        assert!(output.contains("indigo_exporter_last_scrape_metrics 2"));
    }
}
