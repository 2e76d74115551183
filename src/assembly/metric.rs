//! Assembled metric records.

use crate::coercion::MetricValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prometheus metric type of an assembled metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Value that may go up and down.
    #[default]
    Gauge,
    /// Monotonically increasing value.
    Counter,
}

/// Label set of a metric. Values are always strings.
pub type Labels = BTreeMap<String, String>;

/// A single named, typed, labeled sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Metric name.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Metric type.
    pub kind: MetricKind,
    /// Labels attached to the sample.
    pub labels: Labels,
    /// Sample value.
    pub value: MetricValue,
}

/// Metric name for a variable.
pub fn variable_metric_name(id: i64) -> String {
    format!("indigo_var_{id}")
}

/// Metric name for a device's headline value.
pub fn device_metric_name(id: i64) -> String {
    format!("indigo_dev_{id}")
}

/// Metric name for a custom mapping of `state` on device `device_id`.
pub fn custom_metric_name(device_id: i64, state: &str) -> String {
    format!("indigo_dev_{device_id}_{}", sanitize_name_component(state))
}

/// Replaces characters outside the metric name alphabet with `_`.
pub fn sanitize_name_component(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Renders a boolean label value.
#[inline]
pub fn bool_label(b: bool) -> String {
    String::from(if b { "True" } else { "False" })
}
