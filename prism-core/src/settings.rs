//! # Settings Store
//!
//! The persisted per-filter settings live outside the pipeline. The core only
//! reads them, keyed by strings such as `"vignette.intensity"`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{FilterError, Result};
use crate::options::OptionValue;

pub trait SettingsStore: Send + Sync {
    fn value(&self, key: &str) -> Option<OptionValue>;
}

/// A store with nothing in it; every filter runs with its defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSettings;

impl SettingsStore for NoSettings {
    fn value(&self, _key: &str) -> Option<OptionValue> {
        None
    }
}

/// In-memory store, loadable from and savable to a flat JSON object.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, OptionValue>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let values: HashMap<String, OptionValue> =
            serde_json::from_str(json).map_err(|e| FilterError::Settings(e.to_string()))?;
        Ok(Self {
            values: RwLock::new(values),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| FilterError::Settings(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&*self.values.read())
            .map_err(|e| FilterError::Settings(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| FilterError::Settings(format!("{}: {}", path.display(), e)))
    }

    pub fn set(&self, key: impl Into<String>, value: OptionValue) {
        self.values.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<OptionValue> {
        self.values.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl SettingsStore for MemorySettings {
    fn value(&self, key: &str) -> Option<OptionValue> {
        self.values.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_remove() {
        let settings = MemorySettings::new();
        settings.set("gamma.gamma", OptionValue::Float(2.2));
        assert_eq!(settings.value("gamma.gamma"), Some(OptionValue::Float(2.2)));
        assert_eq!(settings.remove("gamma.gamma"), Some(OptionValue::Float(2.2)));
        assert!(settings.is_empty());
    }

    #[test]
    fn malformed_json_is_a_settings_error() {
        assert!(matches!(
            MemorySettings::from_json("{not json"),
            Err(FilterError::Settings(_))
        ));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = MemorySettings::new();
        settings.set("flip.horizontal", OptionValue::Bool(true));
        settings.set("pixellate.scale", OptionValue::Int(8));
        settings.save(&path).unwrap();

        let loaded = MemorySettings::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.value("pixellate.scale"), Some(OptionValue::Int(8)));
        assert_eq!(loaded.value("flip.horizontal"), Some(OptionValue::Bool(true)));
    }
}
