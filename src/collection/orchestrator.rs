//! Scrape orchestration.
//!
//! A scrape walks three passes in a fixed order:
//!
//! ```text
//! custom mappings → variables → devices → done
//! ```
//!
//! Custom mappings always run first. Collecting a mapping writes its
//! `status` state, and the device pass later in the same scrape must see
//! that fresh value rather than the previous scrape's.

use super::{CollectConfig, CollectError};
use crate::assembly::{Assembler, Metric};
use crate::entity::{CustomMapping, Device, Variable};
use crate::source::{Entities, EntitySource, SourceError};
use chrono::{DateTime, Local};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Collection passes, in scrape order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Custom mappings.
    Custom,
    /// Variables.
    Variables,
    /// Devices.
    Devices,
    /// All passes exhausted.
    Done,
}

impl Pass {
    fn next(self) -> Pass {
        match self {
            Pass::Custom => Pass::Variables,
            Pass::Variables => Pass::Devices,
            Pass::Devices | Pass::Done => Pass::Done,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Pass::Custom => "custom",
            Pass::Variables => "variables",
            Pass::Devices => "devices",
            Pass::Done => "done",
        }
    }
}

/// Outcome counters of a finished scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrapeSummary {
    /// Metrics produced.
    pub emitted: u64,
    /// Entities that produced no metric (excluded or not coercible).
    pub omitted: u64,
    /// Entities skipped because of a fault.
    pub failed: u64,
    /// Listings that could not be obtained.
    pub failed_listings: u64,
    /// Wall-clock duration of the scrape.
    pub duration: Duration,
}

/// Drives scrapes against an entity source.
pub struct Collector {
    source: Arc<dyn EntitySource>,
    assembler: Assembler,
    config: CollectConfig,
}

impl Collector {
    /// Creates a collector.
    pub fn new(source: Arc<dyn EntitySource>, assembler: Assembler, config: CollectConfig) -> Self {
        Self {
            source,
            assembler,
            config,
        }
    }

    /// Starts a scrape.
    ///
    /// Nothing is read from the source until the returned iterator is
    /// advanced.
    pub fn scrape(&self) -> Scrape<'_> {
        tracing::debug!("BEGIN metrics collection");
        Scrape {
            collector: self,
            next_pass: Pass::Custom,
            cursor: None,
            started: Instant::now(),
            scraped_at: Local::now(),
            listings_attempted: 0,
            listings_ok: 0,
            summary: ScrapeSummary::default(),
        }
    }

    fn collect_custom(
        &self,
        mapping: &CustomMapping,
        scraped_at: &DateTime<Local>,
    ) -> Result<Option<Metric>, CollectError> {
        if !mapping.device.is_active() {
            tracing::debug!(id = mapping.id(), "Mapping disabled or unconfigured");
            return Ok(None);
        }

        let source_device = self.source.device(mapping.source_device_id)?;
        let outcome = self.assembler.custom_metric(mapping, &source_device)?;
        if let Some(writeback) = outcome.writeback {
            writeback.apply(self.source.as_ref(), mapping.id(), scraped_at);
        }
        Ok(outcome.metric)
    }

    fn collect_entry(
        &self,
        entry: Entry,
        scraped_at: &DateTime<Local>,
    ) -> Result<Option<Metric>, CollectError> {
        match entry {
            Entry::Custom(mapping) => self.collect_custom(&mapping?, scraped_at),
            Entry::Variable(var) => Ok(self.assembler.variable_metric(&var?)),
            Entry::Device(dev) => Ok(self.assembler.device_metric(&dev?)),
        }
    }
}

enum Cursor<'a> {
    Custom(Entities<'a, CustomMapping>),
    Variables(Entities<'a, Variable>),
    Devices(Entities<'a, Device>),
}

enum Entry {
    Custom(Result<CustomMapping, SourceError>),
    Variable(Result<Variable, SourceError>),
    Device(Result<Device, SourceError>),
}

impl Cursor<'_> {
    fn next_entry(&mut self) -> Option<Entry> {
        match self {
            Cursor::Custom(it) => it.next().map(Entry::Custom),
            Cursor::Variables(it) => it.next().map(Entry::Variable),
            Cursor::Devices(it) => it.next().map(Entry::Device),
        }
    }
}

/// A single in-progress scrape.
///
/// Yields metrics lazily in pass order, preserving source enumeration order
/// within each pass. Faults while processing one entity are logged and the
/// entity is skipped.
pub struct Scrape<'a> {
    collector: &'a Collector,
    next_pass: Pass,
    cursor: Option<Cursor<'a>>,
    started: Instant,
    scraped_at: DateTime<Local>,
    // Variable and device listings only; custom mappings never reach the
    // controller.
    listings_attempted: u64,
    listings_ok: u64,
    summary: ScrapeSummary,
}

impl Scrape<'_> {
    /// Drains any remaining entities and reports the outcome.
    ///
    /// Fails with [`CollectError::SourceUnavailable`] when every variable
    /// and device listing that was attempted failed. An empty but readable
    /// listing counts as reachable.
    pub fn finish(mut self) -> Result<ScrapeSummary, CollectError> {
        self.by_ref().for_each(drop);

        let mut summary = self.summary;
        summary.duration = self.started.elapsed();

        tracing::debug!(
            emitted = summary.emitted,
            omitted = summary.omitted,
            failed = summary.failed,
            "END metrics collection"
        );

        if self.listings_attempted > 0 && self.listings_ok == 0 {
            return Err(CollectError::SourceUnavailable {
                failed_listings: summary.failed_listings,
            });
        }
        Ok(summary)
    }

    /// Opens the next enabled pass. Returns false once all passes are done.
    fn open_next_pass(&mut self) -> bool {
        loop {
            let pass = self.next_pass;
            self.next_pass = pass.next();

            let collector = self.collector;
            let source = collector.source.as_ref();
            let config = &collector.config;
            let listing = match pass {
                Pass::Custom => source.custom_mappings().map(Cursor::Custom),
                Pass::Variables if config.variables => source.variables().map(Cursor::Variables),
                Pass::Devices if config.device_states => source.devices().map(Cursor::Devices),
                Pass::Variables | Pass::Devices => {
                    tracing::trace!(pass = pass.name(), "Pass disabled");
                    continue;
                }
                Pass::Done => return false,
            };

            let counted = pass != Pass::Custom;
            if counted {
                self.listings_attempted += 1;
            }

            match listing {
                Ok(cursor) => {
                    tracing::trace!(pass = pass.name(), "Pass started");
                    if counted {
                        self.listings_ok += 1;
                    }
                    self.cursor = Some(cursor);
                    return true;
                }
                Err(e) => {
                    tracing::warn!(pass = pass.name(), error = %e, "Entity listing failed");
                    self.summary.failed_listings += 1;
                }
            }
        }
    }

    fn process(&mut self, entry: Entry) -> Option<Metric> {
        let collector = self.collector;
        let scraped_at = &self.scraped_at;
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| collector.collect_entry(entry, scraped_at)));

        match result {
            Ok(Ok(Some(metric))) => {
                self.summary.emitted += 1;
                Some(metric)
            }
            Ok(Ok(None)) => {
                self.summary.omitted += 1;
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Skipping entity");
                self.summary.failed += 1;
                None
            }
            Err(_) => {
                tracing::warn!(error = %CollectError::Panicked, "Skipping entity");
                self.summary.failed += 1;
                None
            }
        }
    }
}

impl Iterator for Scrape<'_> {
    type Item = Metric;

    fn next(&mut self) -> Option<Metric> {
        loop {
            let Some(cursor) = self.cursor.as_mut() else {
                if !self.open_next_pass() {
                    return None;
                }
                continue;
            };

            let Some(entry) = cursor.next_entry() else {
                self.cursor = None;
                continue;
            };

            if let Some(metric) = self.process(entry) {
                return Some(metric);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::{Coercer, MetricValue};
    use crate::entity::{RawValue, LAST_REPORTED_STATE, STATUS_STATE};
    use crate::source::LocalRegistry;
    use std::sync::Mutex;

    const EXPORTER: &str = "indigo-exporter";

    fn collector(source: Arc<dyn EntitySource>, config: CollectConfig) -> Collector {
        Collector::new(source, Assembler::new(Coercer::default(), EXPORTER), config)
    }

    fn all_passes() -> CollectConfig {
        CollectConfig {
            variables: true,
            device_states: true,
        }
    }

    fn names(metrics: impl Iterator<Item = Metric>) -> Vec<String> {
        metrics.map(|m| m.name).collect()
    }

    #[test]
    fn test_empty_source() {
        let collector = collector(Arc::new(LocalRegistry::new(EXPORTER)), all_passes());
        let mut scrape = collector.scrape();
        assert!(scrape.next().is_none());
        let summary = scrape.finish().unwrap();
        assert_eq!(summary.emitted, 0);
    }

    #[test]
    fn test_pass_order_and_source_order() {
        let registry = LocalRegistry::new(EXPORTER);
        registry.insert_variable(Variable::new(9, "B", "1")).unwrap();
        registry.insert_variable(Variable::new(2, "A", "2")).unwrap();
        registry
            .insert_device(Device::new(3, "Thermostat").with_display_value(1).with_state("t", 70))
            .unwrap();
        registry
            .insert_mapping(CustomMapping::new(Device::new(40, "Outdoor"), 3, "t"))
            .unwrap();

        let collector = collector(Arc::new(registry), all_passes());
        assert_eq!(
            names(collector.scrape()),
            vec!["indigo_dev_3_t", "indigo_var_9", "indigo_var_2", "indigo_dev_3"]
        );
    }

    #[test]
    fn test_passes_gated_but_custom_always_runs() {
        let registry = LocalRegistry::new(EXPORTER);
        registry.insert_variable(Variable::new(1, "A", "1")).unwrap();
        registry
            .insert_device(Device::new(3, "Thermostat").with_display_value(1).with_state("t", 70))
            .unwrap();
        registry
            .insert_mapping(CustomMapping::new(Device::new(40, "Outdoor"), 3, "t"))
            .unwrap();

        let config = CollectConfig {
            variables: false,
            device_states: false,
        };
        let collector = collector(Arc::new(registry), config);
        assert_eq!(names(collector.scrape()), vec!["indigo_dev_3_t"]);
    }

    #[test]
    fn test_variable_scenario() {
        let registry = LocalRegistry::new(EXPORTER);
        registry.insert_variable(Variable::new(5, "Temp", "72.5")).unwrap();
        registry.insert_variable(Variable::new(6, "Mode", "away")).unwrap();

        let collector = collector(Arc::new(registry), CollectConfig::default());
        let mut scrape = collector.scrape();
        let metric = scrape.next().unwrap();
        assert_eq!(metric.name, "indigo_var_5");
        assert_eq!(metric.value, MetricValue::Float(72.5));
        assert!(scrape.next().is_none());

        let summary = scrape.finish().unwrap();
        assert_eq!((summary.emitted, summary.omitted), (1, 1));
    }

    #[test]
    fn test_unsupported_mapping_value_writes_error() {
        let registry = Arc::new(LocalRegistry::new(EXPORTER));
        registry
            .insert_device(Device::new(3, "Thermostat").with_state("temperature", "N/A"))
            .unwrap();
        registry
            .insert_mapping(CustomMapping::new(Device::new(40, "Outdoor"), 3, "temperature"))
            .unwrap();

        let collector = collector(registry.clone(), all_passes());
        let emitted: Vec<String> = names(collector.scrape());
        assert!(emitted.iter().all(|n| n != "indigo_dev_3_temperature"));

        let mapping = registry.mapping(40).unwrap();
        assert_eq!(mapping.device.state(STATUS_STATE), Some(&RawValue::from("Error")));
        assert!(mapping.error_state.unwrap().contains("string"));
    }

    #[test]
    fn test_disabled_source_device_no_metric_no_writeback() {
        let registry = Arc::new(LocalRegistry::new(EXPORTER));
        let mut source = Device::new(3, "Thermostat").with_state("temperature", 70);
        source.enabled = false;
        registry.insert_device(source).unwrap();
        registry
            .insert_mapping(CustomMapping::new(Device::new(40, "Outdoor"), 3, "temperature"))
            .unwrap();

        let collector = collector(registry.clone(), all_passes());
        assert_eq!(collector.scrape().count(), 0);

        let mapping = registry.mapping(40).unwrap();
        assert!(mapping.device.state(STATUS_STATE).is_none());
        assert!(mapping.error_state.is_none());
    }

    #[test]
    fn test_missing_source_device_is_skipped() {
        let registry = LocalRegistry::new(EXPORTER);
        registry
            .insert_mapping(CustomMapping::new(Device::new(40, "Outdoor"), 77, "temperature"))
            .unwrap();
        registry.insert_variable(Variable::new(1, "A", 1)).unwrap();

        let collector = collector(Arc::new(registry), all_passes());
        let mut scrape = collector.scrape();
        assert_eq!(scrape.next().map(|m| m.name), Some("indigo_var_1".into()));
        let summary = scrape.finish().unwrap();
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_mapping_reads_fresh_status_of_earlier_mapping() {
        // Mapping 41 reports mapping 40's status. 40 is collected first in
        // the same scrape, so 41 sees the value written moments earlier.
        let registry = Arc::new(LocalRegistry::new(EXPORTER));
        registry
            .insert_device(Device::new(3, "Thermostat").with_state("temperature", 70))
            .unwrap();
        registry
            .insert_mapping(CustomMapping::new(Device::new(40, "Outdoor"), 3, "temperature"))
            .unwrap();
        registry
            .insert_mapping(CustomMapping::new(Device::new(41, "Relay"), 40, STATUS_STATE))
            .unwrap();

        let collector = collector(registry.clone(), CollectConfig::default());
        let metrics: Vec<Metric> = collector.scrape().collect();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].name, "indigo_dev_40_status");
        assert_eq!(metrics[1].value, MetricValue::Int(70));
        assert!(registry
            .mapping(40)
            .unwrap()
            .device
            .state(LAST_REPORTED_STATE)
            .is_some());
    }

    /// Source that records the order of listings and writes.
    struct RecordingSource {
        inner: LocalRegistry,
        log: Mutex<Vec<String>>,
        fail_variables: bool,
    }

    impl RecordingSource {
        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(event.to_owned());
        }
    }

    impl EntitySource for RecordingSource {
        fn variables(&self) -> Result<Entities<'_, Variable>, SourceError> {
            self.record("list variables");
            if self.fail_variables {
                return Err(SourceError::Unsupported("variables"));
            }
            self.inner.variables()
        }

        fn devices(&self) -> Result<Entities<'_, Device>, SourceError> {
            self.record("list devices");
            self.inner.devices()
        }

        fn custom_mappings(&self) -> Result<Entities<'_, CustomMapping>, SourceError> {
            self.record("list mappings");
            self.inner.custom_mappings()
        }

        fn device(&self, id: i64) -> Result<Device, SourceError> {
            self.inner.device(id)
        }

        fn write_mapping_states(
            &self,
            id: i64,
            states: &[(&str, RawValue)],
        ) -> Result<(), SourceError> {
            self.record(&format!("write {id}"));
            self.inner.write_mapping_states(id, states)
        }

        fn set_mapping_error(&self, id: i64, message: Option<String>) -> Result<(), SourceError> {
            self.inner.set_mapping_error(id, message)
        }
    }

    fn recording(fail_variables: bool) -> Arc<RecordingSource> {
        let inner = LocalRegistry::new(EXPORTER);
        inner
            .insert_device(Device::new(3, "Thermostat").with_display_value(1).with_state("t", 70))
            .unwrap();
        inner
            .insert_mapping(CustomMapping::new(Device::new(40, "A"), 3, "t"))
            .unwrap();
        inner
            .insert_mapping(CustomMapping::new(Device::new(41, "B"), 3, "t"))
            .unwrap();
        Arc::new(RecordingSource {
            inner,
            log: Mutex::new(Vec::new()),
            fail_variables,
        })
    }

    #[test]
    fn test_writebacks_complete_before_device_pass() {
        let source = recording(false);
        let collector = collector(source.clone(), all_passes());
        collector.scrape().finish().unwrap();

        let log = source.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "list mappings",
                "write 40",
                "write 41",
                "list variables",
                "list devices",
            ]
        );
    }

    #[test]
    fn test_scrape_is_lazy() {
        let source = recording(false);
        let collector = collector(source.clone(), all_passes());
        let mut scrape = collector.scrape();
        assert!(source.log.lock().unwrap().is_empty());

        scrape.next().unwrap();
        assert_eq!(*source.log.lock().unwrap(), vec!["list mappings", "write 40"]);
    }

    #[test]
    fn test_failed_listing_does_not_abort_scrape() {
        let source = recording(true);
        let collector = collector(source.clone(), all_passes());
        let mut scrape = collector.scrape();
        let emitted: Vec<String> = scrape.by_ref().map(|m| m.name).collect();
        assert_eq!(emitted, vec!["indigo_dev_3_t", "indigo_dev_3_t", "indigo_dev_3"]);

        let summary = scrape.finish().unwrap();
        assert_eq!(summary.failed_listings, 1);
    }

    /// Source whose variable and device listings can be made to fail.
    struct Unreachable {
        variables_down: bool,
        devices_down: bool,
    }

    impl EntitySource for Unreachable {
        fn variables(&self) -> Result<Entities<'_, Variable>, SourceError> {
            if self.variables_down {
                return Err(SourceError::Unsupported("down"));
            }
            Ok(Box::new(std::iter::empty()))
        }
        fn devices(&self) -> Result<Entities<'_, Device>, SourceError> {
            if self.devices_down {
                return Err(SourceError::Unsupported("down"));
            }
            Ok(Box::new(std::iter::empty()))
        }
        fn custom_mappings(&self) -> Result<Entities<'_, CustomMapping>, SourceError> {
            Ok(Box::new(std::iter::empty()))
        }
        fn device(&self, id: i64) -> Result<Device, SourceError> {
            Err(SourceError::NotFound(id))
        }
        fn write_mapping_states(
            &self,
            _id: i64,
            _states: &[(&str, RawValue)],
        ) -> Result<(), SourceError> {
            Ok(())
        }
        fn set_mapping_error(&self, _id: i64, _msg: Option<String>) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[test]
    fn test_total_outage_reported() {
        let source = Unreachable {
            variables_down: true,
            devices_down: true,
        };
        let collector = collector(Arc::new(source), all_passes());
        let result = collector.scrape().finish();
        assert!(matches!(
            result,
            Err(CollectError::SourceUnavailable { failed_listings: 2 })
        ));
    }

    #[test]
    fn test_empty_listing_with_failed_listing_is_not_outage() {
        let source = Unreachable {
            variables_down: false,
            devices_down: true,
        };
        let collector = collector(Arc::new(source), all_passes());
        let summary = collector.scrape().finish().unwrap();
        assert_eq!(summary.emitted, 0);
        assert_eq!(summary.failed_listings, 1);
    }

    #[test]
    fn test_outage_only_counts_enabled_passes() {
        let source = Unreachable {
            variables_down: true,
            devices_down: false,
        };
        // Device pass disabled: the one attempted listing failed.
        let variables_only = collector(Arc::new(source), CollectConfig::default());
        assert!(matches!(
            variables_only.scrape().finish(),
            Err(CollectError::SourceUnavailable { failed_listings: 1 })
        ));

        let source = Unreachable {
            variables_down: true,
            devices_down: true,
        };
        let config = CollectConfig {
            variables: false,
            device_states: false,
        };
        let custom_only = collector(Arc::new(source), config);
        assert!(custom_only.scrape().finish().is_ok());
    }

    #[test]
    fn test_panicking_entity_is_isolated() {
        let registry = LocalRegistry::new(EXPORTER);
        registry.insert_variable(Variable::new(1, "A", 1)).unwrap();
        registry.insert_variable(Variable::new(2, "B", 2)).unwrap();

        let assembler = Assembler::new(Coercer::default(), EXPORTER)
            .with_user_info(Some("x".into()))
            .with_template_engine(|t: &str| -> String {
                if t == "x" {
                    panic!("template failure");
                }
                t.to_owned()
            });
        let collector = Collector::new(Arc::new(registry), assembler, CollectConfig::default());

        let mut scrape = collector.scrape();
        assert!(scrape.next().is_none());
        let summary = scrape.finish().unwrap();
        assert_eq!(summary.failed, 2);
    }
}
