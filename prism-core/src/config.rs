//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FilterError, Result};
use crate::pool::{BufferPoolManager, DEFAULT_MAX_DIMENSION};

/// Buffers every filter pre-warms when it is initialized.
pub const DEFAULT_MIN_BUFFERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pool size each filter pre-warms; also its allocation threshold.
    pub min_buffers: usize,
    /// Largest accepted frame width or height.
    pub max_dimension: u32,
    /// Return the first input instead of failing on mismatched multi-frame input.
    pub lenient_inputs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_buffers: DEFAULT_MIN_BUFFERS,
            max_dimension: DEFAULT_MAX_DIMENSION,
            lenient_inputs: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FilterError::Settings(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| FilterError::Settings(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn pool_manager(&self) -> BufferPoolManager {
        BufferPoolManager::new(self.max_dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = PipelineConfig::from_json(r#"{"lenient_inputs": true}"#).unwrap();
        assert!(config.lenient_inputs);
        assert_eq!(config.min_buffers, 3);
        assert_eq!(config.max_dimension, 16384);
    }

    #[test]
    fn pool_manager_uses_max_dimension() {
        let config = PipelineConfig {
            max_dimension: 32,
            ..Default::default()
        };
        assert_eq!(config.pool_manager().max_dimension(), 32);
    }
}
