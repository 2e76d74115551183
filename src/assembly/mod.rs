//! Metric assembly.
//!
//! Names, types and labels metrics from entity metadata. Names depend only
//! on entity kind and numeric id, so renaming an entity in the controller
//! never breaks a time series:
//!
//! - variables: `indigo_var_<id>`
//! - devices: `indigo_dev_<id>`
//! - custom mappings: `indigo_dev_<source device id>_<source state>`

mod assembler;
mod metric;
mod template;

pub use assembler::{Assembler, CustomOutcome};
pub use metric::{
    bool_label, custom_metric_name, device_metric_name, sanitize_name_component,
    variable_metric_name, Labels, Metric, MetricKind,
};
pub use template::{TemplateEngine, Verbatim};
