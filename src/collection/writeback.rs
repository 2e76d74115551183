//! Custom mapping state writeback.

use crate::coercion::MetricValue;
use crate::entity::{RawValue, ERROR_STATUS, LAST_REPORTED_STATE, STATUS_STATE};
use crate::source::{EntitySource, SourceError};
use chrono::{DateTime, Local};

/// State update requested by collecting a custom mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Writeback {
    /// The source value was reported; record it and the scrape time.
    Reported(MetricValue),
    /// The source value had no numeric form.
    Failed {
        /// Type name of the rejected value.
        type_name: &'static str,
    },
}

impl Writeback {
    /// Fault message recorded for a failed report.
    pub fn error_message(type_name: &str) -> String {
        format!("unsupported type: {type_name}")
    }

    /// Applies the update to mapping `id`.
    ///
    /// Failures are logged and swallowed; a rejected write never stops a
    /// scrape.
    pub fn apply(&self, source: &dyn EntitySource, id: i64, scraped_at: &DateTime<Local>) {
        if let Err(e) = self.try_apply(source, id, scraped_at) {
            tracing::warn!(mapping = id, error = %e, "Custom mapping writeback failed");
        }
    }

    fn try_apply(
        &self,
        source: &dyn EntitySource,
        id: i64,
        scraped_at: &DateTime<Local>,
    ) -> Result<(), SourceError> {
        match *self {
            Writeback::Reported(value) => {
                let reported_at = scraped_at.format("%c").to_string();
                source.write_mapping_states(
                    id,
                    &[
                        (STATUS_STATE, RawValue::from(value)),
                        (LAST_REPORTED_STATE, RawValue::Str(reported_at)),
                    ],
                )?;
                source.set_mapping_error(id, None)
            }
            Writeback::Failed { type_name } => {
                tracing::warn!(mapping = id, value_type = type_name, "Unsupported mapping value");
                source.write_mapping_states(id, &[(STATUS_STATE, RawValue::from(ERROR_STATUS))])?;
                source.set_mapping_error(id, Some(Self::error_message(type_name)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CustomMapping, Device};
    use crate::source::LocalRegistry;

    fn registry() -> LocalRegistry {
        let registry = LocalRegistry::new("me");
        registry
            .insert_mapping(CustomMapping::new(Device::new(40, "Outdoor"), 3, "temperature"))
            .unwrap();
        registry
    }

    #[test]
    fn test_reported_writes_status_and_timestamp() {
        let registry = registry();
        registry.set_mapping_error(40, Some("stale".into())).unwrap();

        let now = Local::now();
        Writeback::Reported(MetricValue::Float(68.5)).apply(&registry, 40, &now);

        let mapping = registry.mapping(40).unwrap();
        assert_eq!(mapping.device.state(STATUS_STATE), Some(&RawValue::Float(68.5)));
        assert_eq!(
            mapping.device.state(LAST_REPORTED_STATE),
            Some(&RawValue::Str(now.format("%c").to_string()))
        );
        assert!(mapping.error_state.is_none());
    }

    #[test]
    fn test_failed_writes_error() {
        let registry = registry();
        Writeback::Failed { type_name: "string" }.apply(&registry, 40, &Local::now());

        let mapping = registry.mapping(40).unwrap();
        assert_eq!(mapping.device.state(STATUS_STATE), Some(&RawValue::from("Error")));
        assert_eq!(mapping.error_state.as_deref(), Some("unsupported type: string"));
        assert!(mapping.device.state(LAST_REPORTED_STATE).is_none());
    }

    #[test]
    fn test_rejected_write_is_swallowed() {
        // Unknown mapping id; must not panic
        Writeback::Reported(MetricValue::Int(1)).apply(&registry(), 99, &Local::now());
    }
}
