//! Sync function contract
//!
//! The cache engine knows nothing about what it stores. Refreshing items is
//! delegated to a [`SyncFunction`], which receives a batch of resident items
//! and answers with one [`ItemSyncResponse`] per item it wants to change.

use async_trait::async_trait;

use crate::error::Result;

/// One resident item handed to the sync function
#[derive(Debug, Clone, PartialEq)]
pub struct ItemWrapper<T> {
    pub id: String,
    pub item: T,
}

/// Items due for a sync, processed together
pub type Batch<T> = Vec<ItemWrapper<T>>;

/// What to do with one item after a sync
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction<T> {
    /// Keep the stored item and re-arm its timer
    Unchanged,
    /// Replace the stored item and re-arm its timer
    Update(T),
    /// Evict the item
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemSyncResponse<T> {
    pub id: String,
    pub action: SyncAction<T>,
    /// Schedule another sync after the resync interval
    ///
    /// A cleared flag keeps the item resident but never syncs it again.
    pub rearm: bool,
}

impl<T> ItemSyncResponse<T> {
    pub fn unchanged(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: SyncAction::Unchanged,
            rearm: true,
        }
    }

    pub fn update(id: impl Into<String>, item: T) -> Self {
        Self {
            id: id.into(),
            action: SyncAction::Update(item),
            rearm: true,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: SyncAction::Delete,
            rearm: false,
        }
    }

    /// Stops scheduling the item after this response is applied
    pub fn parked(mut self) -> Self {
        self.rearm = false;
        self
    }
}

/// Refreshes one batch of cache items
///
/// A failure affecting a single item should be folded into that item's own
/// `Update` response. Returning an error aborts the whole batch: every item in
/// it is retried later through the rate limiter.
#[async_trait]
pub trait SyncFunction<T>: Send + Sync {
    async fn sync(&self, batch: Batch<T>) -> Result<Vec<ItemSyncResponse<T>>>;
}
