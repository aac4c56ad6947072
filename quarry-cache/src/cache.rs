//! Auto-refresh cache engine

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::queue::WorkQueue;
use crate::rate_limiter::{RateLimiter, default_controller_rate_limiter};
use crate::sync::{Batch, ItemWrapper, SyncAction, SyncFunction};

/// Keyed store whose items are periodically re-synced in the background
///
/// Items live in a sharded concurrent map so unrelated keys never contend.
/// Mutations coming from syncs go through the work queue, which never hands
/// the same key to two workers at once.
pub struct AutoRefreshCache<T> {
    config: CacheConfig,
    items: DashMap<String, T>,
    resident: AtomicUsize,
    queue: Arc<WorkQueue>,
    sync_fn: Arc<dyn SyncFunction<T>>,
}

/// Background tasks of a started cache
pub struct RefreshHandle {
    queue: Arc<WorkQueue>,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Stops the workers and waits for in-flight batches to finish
    pub async fn shutdown(self) {
        self.queue.shut_down();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Cache task panicked: {}", e);
            }
        }
    }
}

impl<T> AutoRefreshCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a cache using the default controller rate limiter
    pub fn new(config: CacheConfig, sync_fn: Arc<dyn SyncFunction<T>>) -> Result<Arc<Self>> {
        Self::with_rate_limiter(config, sync_fn, default_controller_rate_limiter())
    }

    pub fn with_rate_limiter(
        config: CacheConfig,
        sync_fn: Arc<dyn SyncFunction<T>>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new(Self {
            config,
            items: DashMap::new(),
            resident: AtomicUsize::new(0),
            queue: Arc::new(WorkQueue::new(limiter)),
            sync_fn,
        }))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Starts the delay loop and the sync workers
    pub fn start(self: &Arc<Self>) -> RefreshHandle {
        info!(
            "Starting cache '{}' ({} workers, batch size {}, resync every {:?})",
            self.config.name, self.config.workers, self.config.batch_size, self.config.resync_interval
        );

        let mut tasks = Vec::with_capacity(self.config.workers + 1);
        tasks.push(tokio::spawn(Arc::clone(&self.queue).run_delay_loop()));

        for worker in 0..self.config.workers {
            let cache = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                cache.run_worker(worker).await;
            }));
        }

        RefreshHandle {
            queue: Arc::clone(&self.queue),
            tasks,
        }
    }

    /// Inserts a new item and schedules its first sync
    ///
    /// Fails if the key is already resident or the cache is full.
    pub fn create(&self, key: &str, item: T) -> Result<T> {
        match self.items.entry(key.to_string()) {
            Entry::Occupied(_) => return Err(CacheError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                self.reserve_slot()?;
                slot.insert(item.clone());
            }
        }

        self.queue.add(key);
        Ok(item)
    }

    /// Returns a snapshot of the item stored under `key`
    pub fn get(&self, key: &str) -> Option<T> {
        self.items.get(key).map(|item| item.value().clone())
    }

    /// Returns the resident item, inserting `default` if there is none
    pub fn get_or_create(&self, key: &str, default: T) -> Result<T> {
        let item = match self.items.entry(key.to_string()) {
            Entry::Occupied(slot) => return Ok(slot.get().clone()),
            Entry::Vacant(slot) => {
                self.reserve_slot()?;
                slot.insert(default.clone());
                default
            }
        };

        self.queue.add(key);
        Ok(item)
    }

    /// Evicts `key`, returning the item it held
    pub fn delete(&self, key: &str) -> Option<T> {
        let removed = self.items.remove(key).map(|(_, item)| item);
        if removed.is_some() {
            self.resident.fetch_sub(1, Ordering::AcqRel);
            self.queue.remove_pending(key);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.resident.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reserve_slot(&self) -> Result<()> {
        let max_items = self.config.max_items;
        self.resident
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max_items).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| CacheError::CapacityExceeded {
                name: self.config.name.clone(),
                max_items,
            })
    }

    async fn run_worker(&self, worker: usize) {
        debug!("Cache '{}' worker {} started", self.config.name, worker);

        while let Some(keys) = self.queue.get_batch(self.config.batch_size).await {
            self.process_batch(keys).await;
        }

        debug!("Cache '{}' worker {} stopped", self.config.name, worker);
    }

    /// Syncs one batch of keys and applies the responses
    async fn process_batch(&self, keys: Vec<String>) {
        let mut batch: Batch<T> = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get(&key) {
                Some(item) => batch.push(ItemWrapper { id: key, item }),
                // Evicted while queued
                None => self.queue.done(&key),
            }
        }

        if batch.is_empty() {
            return;
        }

        let ids: Vec<String> = batch.iter().map(|w| w.id.clone()).collect();
        debug!(
            "Cache '{}' syncing batch of {} item(s)",
            self.config.name,
            ids.len()
        );

        match self.sync_fn.sync(batch).await {
            Ok(responses) => {
                let mut actions: HashMap<String, (SyncAction<T>, bool)> = HashMap::new();
                for response in responses {
                    if ids.contains(&response.id) {
                        actions.insert(response.id, (response.action, response.rearm));
                    } else {
                        warn!(
                            "Cache '{}' ignoring sync response for key {} outside the batch",
                            self.config.name, response.id
                        );
                    }
                }

                for id in ids {
                    let (action, rearm) = actions
                        .remove(&id)
                        .unwrap_or((SyncAction::Unchanged, true));
                    self.apply(&id, action, rearm);
                    self.queue.done(&id);
                }
            }
            Err(e) => {
                error!(
                    "Cache '{}' failed to sync batch of {} item(s): {}",
                    self.config.name,
                    ids.len(),
                    e
                );
                for id in ids {
                    self.queue.add_rate_limited(&id);
                    self.queue.done(&id);
                    debug!(
                        "Cache '{}' requeued key {} (attempt {})",
                        self.config.name,
                        id,
                        self.queue.num_requeues(&id)
                    );
                }
            }
        }
    }

    fn apply(&self, id: &str, action: SyncAction<T>, rearm: bool) {
        match action {
            SyncAction::Unchanged => {
                if self.items.contains_key(id) {
                    self.reschedule(id, rearm);
                }
            }
            SyncAction::Update(item) => {
                let updated = match self.items.get_mut(id) {
                    Some(mut slot) => {
                        *slot = item;
                        true
                    }
                    None => false,
                };

                if updated {
                    self.reschedule(id, rearm);
                } else {
                    debug!(
                        "Cache '{}' dropping update for evicted key {}",
                        self.config.name, id
                    );
                }
            }
            SyncAction::Delete => {
                debug!("Cache '{}' evicting key {}", self.config.name, id);
                self.delete(id);
            }
        }
    }

    /// Re-arms `id` on the resync interval, or parks it for good
    fn reschedule(&self, id: &str, rearm: bool) {
        if rearm {
            self.rearm(id);
        } else {
            debug!("Cache '{}' parking key {}", self.config.name, id);
            self.queue.forget(id);
        }
    }

    fn rearm(&self, id: &str) {
        self.queue.forget(id);
        self.queue.add_after(id, self.config.resync_interval);
    }
}
