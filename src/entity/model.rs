//! Variables, devices and custom mappings.

use super::RawValue;
use crate::assembly::MetricKind;
use serde::Deserialize;
use std::collections::BTreeMap;

/// State written with the last coerced value of a custom mapping.
pub const STATUS_STATE: &str = "status";

/// State written with the time of the last successful report.
pub const LAST_REPORTED_STATE: &str = "lastReportedAt";

/// Status value written when a mapping's source value cannot be coerced.
pub const ERROR_STATUS: &str = "Error";

fn default_true() -> bool {
    true
}

/// A named controller variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Stable numeric identifier.
    pub id: i64,
    /// Human-readable name.
    pub name: String,
    /// Current value.
    #[serde(default)]
    pub value: RawValue,
    /// Whether the variable is read-only.
    #[serde(default)]
    pub read_only: bool,
    /// Whether the variable is shown in remote clients.
    #[serde(default = "default_true", alias = "remoteDisplay", alias = "displayInRemoteUI")]
    pub remotely_visible: bool,
}

impl Variable {
    /// Creates a writable, visible variable.
    pub fn new(id: i64, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        Self {
            id,
            name: name.into(),
            value: value.into(),
            read_only: false,
            remotely_visible: true,
        }
    }
}

/// A controller device and its states.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable numeric identifier.
    pub id: i64,
    /// Human-readable name.
    pub name: String,
    /// Hardware or protocol address.
    #[serde(default, alias = "addressStr")]
    pub address: String,
    /// Whether the device is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the device has completed configuration.
    #[serde(default = "default_true")]
    pub configured: bool,
    /// Whether the device is shown in remote clients.
    #[serde(default = "default_true", alias = "remoteDisplay", alias = "displayInRemoteUI")]
    pub remotely_visible: bool,
    /// Model description.
    #[serde(default)]
    pub model: String,
    /// Identifier of the plugin that owns the device.
    #[serde(default, alias = "pluginId")]
    pub owner_id: String,
    /// Primary state used for the device's headline metric.
    #[serde(default, alias = "displayRawState")]
    pub display_value: RawValue,
    /// All device states by name.
    #[serde(default)]
    pub states: BTreeMap<String, RawValue>,
}

impl Device {
    /// Creates an enabled, configured, visible device with no states.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: String::new(),
            enabled: true,
            configured: true,
            remotely_visible: true,
            model: String::new(),
            owner_id: String::new(),
            display_value: RawValue::Null,
            states: BTreeMap::new(),
        }
    }

    /// Sets the headline value.
    pub fn with_display_value(mut self, value: impl Into<RawValue>) -> Self {
        self.display_value = value.into();
        self
    }

    /// Adds or replaces a named state.
    pub fn with_state(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.states.insert(name.into(), value.into());
        self
    }

    /// Returns true when the device is both enabled and configured.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled && self.configured
    }

    /// Looks up a state by name.
    pub fn state(&self, name: &str) -> Option<&RawValue> {
        self.states.get(name)
    }
}

/// A device that re-exposes another device's state as a metric.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMapping {
    /// The mapping's own device record.
    #[serde(flatten)]
    pub device: Device,
    /// Device whose state is reported.
    pub source_device_id: i64,
    /// Name of the reported state on the source device.
    pub source_state_name: String,
    /// Metric type to report.
    #[serde(default)]
    pub kind: MetricKind,
    /// Template for the `user_info` label.
    #[serde(default)]
    pub user_info_template: Option<String>,
    /// Fault message shown for the mapping, if any.
    #[serde(default)]
    pub error_state: Option<String>,
}

impl CustomMapping {
    /// Creates a gauge mapping for `source_device_id`'s `source_state_name`.
    pub fn new(
        device: Device,
        source_device_id: i64,
        source_state_name: impl Into<String>,
    ) -> Self {
        Self {
            device,
            source_device_id,
            source_state_name: source_state_name.into(),
            kind: MetricKind::Gauge,
            user_info_template: None,
            error_state: None,
        }
    }

    /// Sets the reported metric type.
    pub fn with_kind(mut self, kind: MetricKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the mapping's device id.
    #[inline]
    pub fn id(&self) -> i64 {
        self.device.id
    }

    /// Returns the mapping's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.device.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_from_rest_json() {
        let json = r#"{"id": 5, "name": "Temp", "value": "72.5", "readOnly": false,
                       "displayInRemoteUI": true, "folderId": 0}"#;
        let var: Variable = serde_json::from_str(json).unwrap();
        assert_eq!(var, Variable::new(5, "Temp", "72.5"));
    }

    #[test]
    fn test_device_defaults() {
        let dev: Device = serde_json::from_str(r#"{"id": 3, "name": "Lamp"}"#).unwrap();
        assert!(dev.is_active());
        assert!(dev.remotely_visible);
        assert_eq!(dev.display_value, RawValue::Null);
        assert!(dev.states.is_empty());
    }

    #[test]
    fn test_device_rest_aliases() {
        let json = r#"{"id": 9, "name": "Thermostat", "addressStr": "1A.2B.3C",
                       "displayRawState": 68, "pluginId": "com.example.zwave",
                       "states": {"temperature": "68.0", "modes": [1, 2]}}"#;
        let dev: Device = serde_json::from_str(json).unwrap();
        assert_eq!(dev.address, "1A.2B.3C");
        assert_eq!(dev.display_value, RawValue::Int(68));
        assert_eq!(dev.owner_id, "com.example.zwave");
        assert_eq!(dev.state("temperature"), Some(&RawValue::from("68.0")));
        assert!(matches!(dev.state("modes"), Some(RawValue::Composite(_))));
    }

    #[test]
    fn test_mapping_flattens_device() {
        let json = r#"{"id": 40, "name": "Outdoor temp", "sourceDeviceId": 3,
                       "sourceStateName": "temperature", "kind": "counter"}"#;
        let mapping: CustomMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.id(), 40);
        assert_eq!(mapping.name(), "Outdoor temp");
        assert_eq!(mapping.kind, MetricKind::Counter);
        assert_eq!(mapping.source_state_name, "temperature");
        assert!(mapping.error_state.is_none());
    }
}
