//! In-process entity registry.

use super::{Entities, EntitySource, SourceError};
use crate::entity::{CustomMapping, Device, RawValue, Variable, STATUS_STATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Local source settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    /// JSON snapshot used to seed the registry.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

/// Serialized registry contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Variables in listing order.
    #[serde(default)]
    pub variables: Vec<Variable>,
    /// Plain devices in listing order.
    #[serde(default)]
    pub devices: Vec<Device>,
    /// Custom mappings in listing order.
    #[serde(default)]
    pub custom_mappings: Vec<CustomMapping>,
}

#[derive(Debug, Default)]
struct Entries {
    variables: Vec<Variable>,
    devices: Vec<Device>,
    mappings: Vec<CustomMapping>,
}

/// Entities held in memory by the host process.
///
/// Listings return a snapshot taken under a read lock, in insertion order.
/// Custom mappings are devices too: they are listed by
/// [`EntitySource::devices`] after the plain devices, owned by the
/// exporter.
#[derive(Debug)]
pub struct LocalRegistry {
    exporter_id: String,
    entries: RwLock<Entries>,
}

impl LocalRegistry {
    /// Creates an empty registry.
    pub fn new(exporter_id: impl Into<String>) -> Self {
        Self {
            exporter_id: exporter_id.into(),
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Creates a registry holding the given snapshot.
    pub fn from_snapshot(snapshot: RegistrySnapshot, exporter_id: impl Into<String>) -> Self {
        let registry = Self::new(exporter_id);
        {
            let mut entries = registry.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.variables = snapshot.variables;
            entries.devices = snapshot.devices;
        }
        for mapping in snapshot.custom_mappings {
            registry.insert_mapping_unchecked(mapping);
        }
        registry
    }

    /// Loads a registry from a JSON snapshot file.
    pub fn from_snapshot_file(
        path: impl AsRef<Path>,
        exporter_id: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Snapshot(format!("{}: {e}", path.display())))?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&content)
            .map_err(|e| SourceError::Snapshot(format!("{}: {e}", path.display())))?;

        tracing::info!(
            path = %path.display(),
            variables = snapshot.variables.len(),
            devices = snapshot.devices.len(),
            mappings = snapshot.custom_mappings.len(),
            "Loaded registry snapshot"
        );
        Ok(Self::from_snapshot(snapshot, exporter_id))
    }

    /// Adds or replaces a variable.
    pub fn insert_variable(&self, var: Variable) -> Result<(), SourceError> {
        let mut entries = self.write()?;
        upsert(&mut entries.variables, var, |v| v.id);
        Ok(())
    }

    /// Adds or replaces a device.
    pub fn insert_device(&self, dev: Device) -> Result<(), SourceError> {
        let mut entries = self.write()?;
        upsert(&mut entries.devices, dev, |d| d.id);
        Ok(())
    }

    /// Adds or replaces a custom mapping, marking it as owned by the exporter.
    pub fn insert_mapping(&self, mapping: CustomMapping) -> Result<(), SourceError> {
        let mapping = self.owned(mapping);
        let mut entries = self.write()?;
        upsert(&mut entries.mappings, mapping, |m| m.id());
        Ok(())
    }

    /// Returns a copy of a custom mapping.
    pub fn mapping(&self, id: i64) -> Result<CustomMapping, SourceError> {
        self.read()?
            .mappings
            .iter()
            .find(|m| m.id() == id)
            .cloned()
            .ok_or(SourceError::MappingNotFound(id))
    }

    fn insert_mapping_unchecked(&self, mapping: CustomMapping) {
        let mapping = self.owned(mapping);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        upsert(&mut entries.mappings, mapping, |m| m.id());
    }

    fn owned(&self, mut mapping: CustomMapping) -> CustomMapping {
        mapping.device.owner_id = self.exporter_id.clone();
        mapping
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Entries>, SourceError> {
        self.entries.read().map_err(|_| SourceError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Entries>, SourceError> {
        self.entries.write().map_err(|_| SourceError::Poisoned)
    }

    fn with_mapping<F>(&self, id: i64, update: F) -> Result<(), SourceError>
    where
        F: FnOnce(&mut CustomMapping),
    {
        let mut entries = self.write()?;
        let mapping = entries
            .mappings
            .iter_mut()
            .find(|m| m.id() == id)
            .ok_or(SourceError::MappingNotFound(id))?;
        update(mapping);
        Ok(())
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> i64) {
    let id = key(&item);
    match items.iter_mut().find(|existing| key(existing) == id) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

fn snapshot<'a, T: 'a>(items: Vec<T>) -> Entities<'a, T> {
    Box::new(items.into_iter().map(Ok))
}

impl EntitySource for LocalRegistry {
    fn variables(&self) -> Result<Entities<'_, Variable>, SourceError> {
        Ok(snapshot(self.read()?.variables.clone()))
    }

    fn devices(&self) -> Result<Entities<'_, Device>, SourceError> {
        let entries = self.read()?;
        let devices: Vec<Device> = entries
            .devices
            .iter()
            .cloned()
            .chain(entries.mappings.iter().map(|m| m.device.clone()))
            .collect();
        Ok(snapshot(devices))
    }

    fn custom_mappings(&self) -> Result<Entities<'_, CustomMapping>, SourceError> {
        Ok(snapshot(self.read()?.mappings.clone()))
    }

    fn device(&self, id: i64) -> Result<Device, SourceError> {
        let entries = self.read()?;
        entries
            .devices
            .iter()
            .find(|d| d.id == id)
            .or_else(|| entries.mappings.iter().map(|m| &m.device).find(|d| d.id == id))
            .cloned()
            .ok_or(SourceError::NotFound(id))
    }

    fn write_mapping_states(
        &self,
        id: i64,
        states: &[(&str, RawValue)],
    ) -> Result<(), SourceError> {
        self.with_mapping(id, |mapping| {
            for (name, value) in states {
                if *name == STATUS_STATE {
                    mapping.device.display_value = value.clone();
                }
                mapping.device.states.insert((*name).to_owned(), value.clone());
            }
        })
    }

    fn set_mapping_error(&self, id: i64, message: Option<String>) -> Result<(), SourceError> {
        self.with_mapping(id, |mapping| mapping.error_state = message)
    }
}
