//! Configuration structures for the ball-tree index.

use crate::error::{BallTreeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default maximum number of records per leaf.
pub const DEFAULT_LEAF_SIZE: usize = 20;

/// Configuration for building and persisting a ball-tree index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum number of records in a leaf. Larger sets are split.
    pub leaf_size: usize,
    /// Paged storage settings.
    pub storage: StorageConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            leaf_size: DEFAULT_LEAF_SIZE,
            storage: StorageConfig::default(),
        }
    }
}

impl IndexConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| BallTreeError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_size == 0 {
            return Err(BallTreeError::InvalidConfig {
                name: "leaf_size".to_string(),
                value: self.leaf_size.to_string(),
            });
        }
        self.storage.validate()
    }
}

/// Storage configuration for the paged storage engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Buffer pool size in frames, per storage kind.
    pub max_frames_per_kind: usize,
    /// Minimum number of slots a page holds. The page size is this many
    /// slots plus the page tail, rounded up to a 1 KB boundary.
    pub slots_per_page: usize,
    /// Enable fsync when flushing pages.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_frames_per_kind: 64,
            slots_per_page: 64,
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_frames_per_kind == 0 {
            return Err(BallTreeError::InvalidConfig {
                name: "max_frames_per_kind".to_string(),
                value: self.max_frames_per_kind.to_string(),
            });
        }
        if self.slots_per_page == 0 {
            return Err(BallTreeError::InvalidConfig {
                name: "slots_per_page".to_string(),
                value: self.slots_per_page.to_string(),
            });
        }
        Ok(())
    }
}
