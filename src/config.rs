//! Store configuration
//!
//! Page size bounds and defaults, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page size used when the device block size is unknown or out of range
    pub default_page_size: usize,
    /// Smallest device block size adopted as page size
    pub min_page_size: usize,
    /// Largest device block size adopted as page size
    pub max_page_size: usize,
    /// Whether to query the device block size at all
    pub probe_block_size: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            min_page_size: MIN_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            probe_block_size: true,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.min_page_size == 0 {
            return Err(StoreError::Config("min_page_size must be positive".into()));
        }
        if self.min_page_size > self.max_page_size {
            return Err(StoreError::Config(format!(
                "min_page_size {} exceeds max_page_size {}",
                self.min_page_size, self.max_page_size
            )));
        }
        if self.default_page_size == 0 {
            return Err(StoreError::InvalidPageSize(self.default_page_size));
        }
        Ok(())
    }

    /// Whether a probed device block size may be used as page size
    pub fn accepts_page_size(&self, size: u64) -> bool {
        size >= self.min_page_size as u64 && size <= self.max_page_size as u64
    }
}
