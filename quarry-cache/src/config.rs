//! Cache configuration

use std::time::Duration;

use crate::error::{CacheError, Result};

/// How often a resident item is re-synced unless configured otherwise
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Construction parameters for an [`AutoRefreshCache`](crate::AutoRefreshCache)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name used in logs and errors
    pub name: String,

    /// Delay between two syncs of the same item
    pub resync_interval: Duration,

    /// Number of background sync workers
    pub workers: usize,

    /// Maximum number of items handed to the sync function at once
    pub batch_size: usize,

    /// Maximum number of resident items
    pub max_items: usize,
}

impl CacheConfig {
    /// Creates a configuration with defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            workers: 10,
            batch_size: 10,
            max_items: 1000,
        }
    }

    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CacheError::InvalidConfig("name cannot be empty".to_string()));
        }

        if self.resync_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "resync_interval must be greater than 0".to_string(),
            ));
        }

        if self.workers == 0 {
            return Err(CacheError::InvalidConfig(
                "workers must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(CacheError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.max_items == 0 {
            return Err(CacheError::InvalidConfig(
                "max_items must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::new("queries");
        assert_eq!(config.resync_interval, DEFAULT_RESYNC_INTERVAL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CacheConfig::new("queries");

        config.workers = 0;
        assert!(config.validate().is_err());
        config.workers = 2;

        config.batch_size = 0;
        assert!(config.validate().is_err());
        config.batch_size = 5;

        config.resync_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.resync_interval = Duration::from_millis(50);

        config.max_items = 0;
        assert!(config.validate().is_err());
        config.max_items = 1;

        assert!(config.validate().is_ok());
        assert!(CacheConfig::new("").validate().is_err());
    }
}
