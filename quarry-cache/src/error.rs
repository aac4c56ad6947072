//! Error types for the auto-refresh cache

use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur when using the cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// No room for another resident item
    #[error("Cache '{name}' is full ({max_items} items)")]
    CapacityExceeded { name: String, max_items: usize },

    /// `create` called for a key that is already resident
    #[error("Item already exists: {0}")]
    AlreadyExists(String),

    /// The sync function gave up on a whole batch
    #[error("Sync failed: {0}")]
    Sync(String),

    /// Construction parameters make no sense
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync(message.into())
    }

    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}
