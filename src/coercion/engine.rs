//! Raw value to metric value coercion.

use crate::entity::RawValue;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A numeric sample value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Boolean sample, exported as 1 or 0.
    Bool(bool),
    /// Integer sample.
    Int(i64),
    /// Floating-point sample.
    Float(f64),
}

impl MetricValue {
    /// Returns the sample as a float for exposition.
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            MetricValue::Int(i) => i as f64,
            MetricValue::Float(f) => f,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&RawValue::from(*self), f)
    }
}

impl From<MetricValue> for RawValue {
    fn from(v: MetricValue) -> Self {
        match v {
            MetricValue::Bool(b) => RawValue::Bool(b),
            MetricValue::Int(i) => RawValue::Int(i),
            MetricValue::Float(f) => RawValue::Float(f),
        }
    }
}

/// Token sets recognized as booleans in textual values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoercionRules {
    /// Strings coerced to `true`.
    pub truthy: Vec<String>,
    /// Strings coerced to `false`.
    pub falsy: Vec<String>,
}

impl Default for CoercionRules {
    fn default() -> Self {
        Self {
            truthy: vec!["true".into(), "on".into(), "yes".into()],
            falsy: vec!["false".into(), "off".into(), "no".into()],
        }
    }
}

/// Converts raw entity values into metric values.
///
/// Rules are applied in order and the first match wins:
///
/// 1. booleans, integers and floats pass through unchanged
/// 2. composites are rejected
/// 3. strings in the truthy set become `true`
/// 4. strings in the falsy set become `false`
/// 5. strings that parse as integers become integers
/// 6. strings that parse as floats become floats
/// 7. anything else is rejected
///
/// Token matching ignores case and surrounding whitespace.
#[derive(Debug, Clone)]
pub struct Coercer {
    truthy: HashSet<String>,
    falsy: HashSet<String>,
}

impl Coercer {
    /// Creates a coercer from the given token sets.
    pub fn new(rules: &CoercionRules) -> Self {
        let normalize = |tokens: &[String]| {
            tokens
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        };
        Self {
            truthy: normalize(&rules.truthy),
            falsy: normalize(&rules.falsy),
        }
    }

    /// Coerces a raw value, returning `None` if it has no numeric form.
    pub fn coerce(&self, raw: &RawValue) -> Option<MetricValue> {
        let text = match raw {
            RawValue::Bool(b) => return Some(MetricValue::Bool(*b)),
            RawValue::Int(i) => return Some(MetricValue::Int(*i)),
            RawValue::Float(f) => return Some(MetricValue::Float(*f)),
            RawValue::Composite(kind) => {
                tracing::debug!(kind = kind.type_name(), "Composite value rejected");
                return None;
            }
            RawValue::Str(s) => s.trim(),
            RawValue::Null => "",
        };

        if !text.is_empty() {
            let token = text.to_lowercase();
            if self.truthy.contains(&token) {
                return Some(MetricValue::Bool(true));
            }
            if self.falsy.contains(&token) {
                return Some(MetricValue::Bool(false));
            }
            if let Ok(i) = text.parse::<i64>() {
                return Some(MetricValue::Int(i));
            }
            if let Ok(f) = text.parse::<f64>() {
                return Some(MetricValue::Float(f));
            }
        }

        tracing::debug!(
            value = %raw,
            value_type = raw.type_name(),
            "Value has no numeric form"
        );
        None
    }
}

impl Default for Coercer {
    fn default() -> Self {
        Self::new(&CoercionRules::default())
    }
}
