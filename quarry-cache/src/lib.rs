//! Quarry Cache
//!
//! A generic auto-refreshing, rate-limited keyed cache.
//!
//! Items are created by callers and then periodically re-synced by a pool of
//! background workers. Each worker pulls a batch of due keys from a delaying
//! work queue, hands the batch to a user-supplied [`SyncFunction`], and applies
//! the returned mutations one key at a time.
//!
//! For any key, at most one sync is in flight and at most one mutation is
//! applied at a time. Readers always see either the pre-sync or the post-sync
//! value of an item.

mod cache;
pub mod config;
pub mod error;
pub mod queue;
pub mod rate_limiter;
mod sync;

pub use cache::{AutoRefreshCache, RefreshHandle};
pub use config::{CacheConfig, DEFAULT_RESYNC_INTERVAL};
pub use error::{CacheError, Result};
pub use rate_limiter::{
    ExponentialBackoffLimiter, MaxOfLimiter, RateLimiter, TokenBucketLimiter,
    default_controller_rate_limiter,
};
pub use sync::{Batch, ItemSyncResponse, ItemWrapper, SyncAction, SyncFunction};
