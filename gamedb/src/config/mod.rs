use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the optional config file inside a data directory.
pub const CONFIG_FILE: &str = "gamedb.yaml";

/// Store settings, read from `gamedb.yaml` when the data directory has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file name, relative to the data directory.
    pub database: String,
    /// Page size used when a caller asks for `limit = 0`.
    pub default_page_size: usize,
    /// Upper bound on any single page of rows.
    pub max_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            database: "gamedb.sqlite".to_string(),
            default_page_size: 100,
            max_page_size: 1000,
        }
    }
}

impl StoreConfig {
    /// Load the config for a data directory, falling back to defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(StoreConfig::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: StoreConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Clamp a requested page size: 0 means the default, anything above the
    /// maximum is cut down to it.
    pub fn page_limit(&self, requested: usize) -> usize {
        let limit = if requested == 0 {
            self.default_page_size
        } else {
            requested
        };
        limit.min(self.max_page_size).max(1)
    }
}
