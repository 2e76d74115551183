//! Builds metrics from entities.

use super::metric::{
    bool_label, custom_metric_name, device_metric_name, variable_metric_name, Labels, Metric,
    MetricKind,
};
use super::template::{TemplateEngine, Verbatim};
use crate::coercion::Coercer;
use crate::collection::{CollectError, Writeback};
use crate::entity::{CustomMapping, Device, Variable};
use std::sync::Arc;

/// Result of assembling a custom mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomOutcome {
    /// Metric to emit, if the source value was coercible.
    pub metric: Option<Metric>,
    /// State update to apply to the mapping, if any.
    pub writeback: Option<Writeback>,
}

impl CustomOutcome {
    fn skipped() -> Self {
        Self {
            metric: None,
            writeback: None,
        }
    }
}

/// Turns entities into named, typed, labeled metrics.
pub struct Assembler {
    coercer: Coercer,
    exporter_id: String,
    user_info: Option<String>,
    templates: Arc<dyn TemplateEngine>,
}

impl Assembler {
    /// Creates an assembler for an exporter identified by `exporter_id`.
    ///
    /// Devices owned by `exporter_id` are never reported as plain devices.
    pub fn new(coercer: Coercer, exporter_id: impl Into<String>) -> Self {
        Self {
            coercer,
            exporter_id: exporter_id.into(),
            user_info: None,
            templates: Arc::new(Verbatim),
        }
    }

    /// Sets the `user_info` template for variables and devices.
    pub fn with_user_info(mut self, template: Option<String>) -> Self {
        self.user_info = template;
        self
    }

    /// Replaces the template engine used for `user_info` labels.
    pub fn with_template_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.templates = Arc::new(engine);
        self
    }

    /// Builds the metric for a variable.
    pub fn variable_metric(&self, var: &Variable) -> Option<Metric> {
        tracing::debug!(id = var.id, name = %var.name, value = %var.value, "Reading variable");

        let value = self.coercer.coerce(&var.value)?;

        let mut labels = Labels::new();
        labels.insert("readOnly".into(), bool_label(var.read_only));
        labels.insert("visible".into(), bool_label(var.remotely_visible));
        labels.insert("name".into(), var.name.clone());
        self.insert_user_info(&mut labels, self.user_info.as_deref());

        Some(Metric {
            name: variable_metric_name(var.id),
            help: var.name.clone(),
            kind: MetricKind::Gauge,
            labels,
            value,
        })
    }

    /// Builds the headline metric for a device.
    pub fn device_metric(&self, dev: &Device) -> Option<Metric> {
        tracing::debug!(id = dev.id, name = %dev.name, "Reading device");

        if !dev.is_active() {
            tracing::debug!(id = dev.id, "Device disabled or unconfigured");
            return None;
        }
        if self.is_own_device(dev) {
            tracing::trace!(id = dev.id, "Skipping exporter-owned device");
            return None;
        }

        let value = self.coercer.coerce(&dev.display_value)?;

        let mut labels = Labels::new();
        labels.insert("address".into(), dev.address.clone());
        labels.insert("enabled".into(), bool_label(dev.enabled));
        labels.insert("visible".into(), bool_label(dev.remotely_visible));
        labels.insert("model".into(), dev.model.clone());
        labels.insert("name".into(), dev.name.clone());
        self.insert_user_info(&mut labels, self.user_info.as_deref());

        Some(Metric {
            name: device_metric_name(dev.id),
            help: dev.name.clone(),
            kind: MetricKind::Gauge,
            labels,
            value,
        })
    }

    /// Builds the metric for a custom mapping reading from `source`.
    ///
    /// Fails when `source` has no state named by the mapping.
    pub fn custom_metric(
        &self,
        mapping: &CustomMapping,
        source: &Device,
    ) -> Result<CustomOutcome, CollectError> {
        if !mapping.device.is_active() {
            tracing::debug!(id = mapping.id(), "Mapping disabled or unconfigured");
            return Ok(CustomOutcome::skipped());
        }
        if !source.is_active() {
            tracing::debug!(
                id = mapping.id(),
                source = source.id,
                "Mapping source device disabled or unconfigured"
            );
            return Ok(CustomOutcome::skipped());
        }

        let raw = source
            .state(&mapping.source_state_name)
            .ok_or_else(|| CollectError::MissingState {
                device: source.id,
                state: mapping.source_state_name.clone(),
            })?;

        tracing::debug!(
            id = mapping.id(),
            source = source.id,
            state = %mapping.source_state_name,
            value = %raw,
            "Reading custom mapping"
        );

        let Some(value) = self.coercer.coerce(raw) else {
            return Ok(CustomOutcome {
                metric: None,
                writeback: Some(Writeback::Failed {
                    type_name: raw.type_name(),
                }),
            });
        };

        let mut labels = Labels::new();
        labels.insert("name".into(), mapping.name().to_owned());
        if !source.name.is_empty() {
            labels.insert("device".into(), source.name.clone());
        }
        self.insert_user_info(&mut labels, mapping.user_info_template.as_deref());

        Ok(CustomOutcome {
            metric: Some(Metric {
                name: custom_metric_name(mapping.source_device_id, &mapping.source_state_name),
                help: mapping.name().to_owned(),
                kind: mapping.kind,
                labels,
                value,
            }),
            writeback: Some(Writeback::Reported(value)),
        })
    }

    fn is_own_device(&self, dev: &Device) -> bool {
        !self.exporter_id.is_empty() && dev.owner_id == self.exporter_id
    }

    fn insert_user_info(&self, labels: &mut Labels, template: Option<&str>) {
        let Some(template) = template.filter(|t| !t.is_empty()) else {
            return;
        };
        let info = self.templates.substitute(template);
        if !info.is_empty() {
            labels.insert("user_info".into(), info);
        }
    }
}
