//! Resource sync service
//!
//! Tells the status cache how to refresh a batch of tracked queries: ask the
//! backend for each query's native status and fold the answer into the cache
//! item. All backend polling happens here, on the cache's workers.
//!
//! A query whose status cannot be fetched stays in the cache with a bumped
//! failure counter. A status nobody knows how to map aborts the whole batch.
//! Once a query is terminal it stays resident but is never synced again.

use async_trait::async_trait;
use chrono::Utc;
use quarry_cache::{Batch, CacheError, ItemSyncResponse, SyncFunction};
use quarry_core::backend::RemoteBackend;
use quarry_core::domain::job::{CacheItem, RemoteSnapshot};
use quarry_core::domain::phase::{ExecutionPhase, map_native_status};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ResourceSyncer {
    backend: Arc<dyn RemoteBackend>,
}

impl ResourceSyncer {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SyncFunction<CacheItem> for ResourceSyncer {
    async fn sync(
        &self,
        batch: Batch<CacheItem>,
    ) -> quarry_cache::Result<Vec<ItemSyncResponse<CacheItem>>> {
        let mut responses = Vec::with_capacity(batch.len());

        for resource in batch {
            let id = resource.id;
            let mut item = resource.item;

            if id.is_empty() {
                warn!("Sync loop - resource key is blank, skipping");
                responses.push(ItemSyncResponse::unchanged(id));
                continue;
            }

            if item.phase.is_terminal() {
                debug!("Sync loop - {} already terminal ({})", id, item.phase);
                responses.push(ItemSyncResponse::unchanged(id).parked());
                continue;
            }

            let Some(handle) = item.handle.clone() else {
                debug!("Sync loop - {} has no backend handle yet", id);
                responses.push(ItemSyncResponse::unchanged(id));
                continue;
            };

            debug!("Querying backend for {} ({})", handle.command_id, id);
            let status = match self.backend.status(&handle).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        "Error retrieving status of {} ({}): {}",
                        handle.command_id, id, e
                    );
                    item.sync_failure_count += 1;
                    responses.push(ItemSyncResponse::update(id, item));
                    continue;
                }
            };

            let remote_phase = map_native_status(&status.code).map_err(|e| {
                error!(
                    "Backend reported unmappable status for {} ({}): {}",
                    handle.command_id, id, e
                );
                CacheError::sync(e.to_string())
            })?;

            let changed = match &item.last_observed {
                Some(previous) => {
                    previous.phase != remote_phase || previous.status.code != status.code
                }
                None => true,
            };

            if !changed {
                responses.push(ItemSyncResponse::unchanged(id));
                continue;
            }

            // Items here are Submitted and every remote phase maps at or past it
            let next_phase = ExecutionPhase::from(remote_phase);
            if item.phase != next_phase {
                info!(
                    "Moving phase for {} ({}) from {} to {}",
                    handle.command_id, id, item.phase, next_phase
                );
                item.phase = next_phase;
            }

            if let Some(uri) = status.info_uri.clone() {
                if let Some(h) = item.handle.as_mut() {
                    h.uri = Some(uri);
                }
            }

            item.last_observed = Some(RemoteSnapshot {
                status,
                phase: remote_phase,
                observed_at: Utc::now(),
            });

            let terminal = item.phase.is_terminal();
            let response = ItemSyncResponse::update(id, item);
            responses.push(if terminal { response.parked() } else { response });
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use quarry_cache::{ItemWrapper, SyncAction};
    use quarry_core::domain::job::{JobKey, RemoteJobHandle};
    use quarry_core::domain::phase::{FailureKind, RemotePhase};
    use quarry_core::domain::query::NativeStatus;

    fn wrap(key: &str, item: CacheItem) -> ItemWrapper<CacheItem> {
        ItemWrapper {
            id: key.to_string(),
            item,
        }
    }

    fn submitted(key: &str, command_id: &str) -> CacheItem {
        CacheItem::submitted(JobKey::from(key), Some(RemoteJobHandle::new(command_id)))
    }

    fn updated(response: &ItemSyncResponse<CacheItem>) -> &CacheItem {
        match &response.action {
            SyncAction::Update(item) => item,
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminal_items_are_never_queried() {
        let backend = Arc::new(FakeBackend::new());
        let syncer = ResourceSyncer::new(backend.clone());

        let mut succeeded = submitted("a", "1");
        succeeded.phase = ExecutionPhase::Succeeded;
        let mut failed = submitted("b", "2");
        failed.phase = ExecutionPhase::Failed(FailureKind::Permanent);

        let responses = syncer
            .sync(vec![wrap("a", succeeded), wrap("b", failed)])
            .await
            .unwrap();

        assert!(responses.iter().all(|r| r.action == SyncAction::Unchanged));
        assert!(responses.iter().all(|r| !r.rearm));
        assert_eq!(backend.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_key_is_skipped() {
        let backend = Arc::new(FakeBackend::new());
        let syncer = ResourceSyncer::new(backend.clone());

        let responses = syncer.sync(vec![wrap("", submitted("", "1"))]).await.unwrap();

        assert_eq!(responses[0].action, SyncAction::Unchanged);
        assert_eq!(backend.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_query_error_bumps_failure_count_and_keeps_item() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_status("1");
        let syncer = ResourceSyncer::new(backend.clone());

        let responses = syncer.sync(vec![wrap("a", submitted("a", "1"))]).await.unwrap();

        let item = updated(&responses[0]);
        assert_eq!(item.sync_failure_count, 1);
        assert_eq!(item.phase, ExecutionPhase::Submitted);
        assert!(responses[0].rearm);
    }

    #[tokio::test]
    async fn test_one_failing_item_does_not_abort_batch() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_status("1");
        backend.set_status("2", NativeStatus::new("FINISHED"));
        let syncer = ResourceSyncer::new(backend.clone());

        let responses = syncer
            .sync(vec![wrap("a", submitted("a", "1")), wrap("b", submitted("b", "2"))])
            .await
            .unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(updated(&responses[0]).sync_failure_count, 1);
        assert_eq!(updated(&responses[1]).phase, ExecutionPhase::Succeeded);
    }

    #[tokio::test]
    async fn test_status_change_updates_phase_and_snapshot() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_status(
            "1",
            NativeStatus::new("FAILED")
                .with_message("line 1:1: mismatched input")
                .with_info_uri("http://presto/ui/1"),
        );
        let syncer = ResourceSyncer::new(backend.clone());

        let responses = syncer.sync(vec![wrap("a", submitted("a", "1"))]).await.unwrap();

        let item = updated(&responses[0]);
        assert_eq!(item.phase, ExecutionPhase::Failed(FailureKind::Permanent));
        assert!(!responses[0].rearm);
        assert_eq!(
            item.last_observed.as_ref().unwrap().phase,
            RemotePhase::Failed(FailureKind::Permanent)
        );
        assert_eq!(
            item.handle.as_ref().unwrap().uri.as_deref(),
            Some("http://presto/ui/1")
        );
        assert_eq!(
            item.failure_reason().as_deref(),
            Some("line 1:1: mismatched input")
        );
    }

    #[tokio::test]
    async fn test_same_status_is_unchanged() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_status("1", NativeStatus::new("RUNNING"));
        let syncer = ResourceSyncer::new(backend.clone());

        let first = syncer.sync(vec![wrap("a", submitted("a", "1"))]).await.unwrap();
        let item = updated(&first[0]).clone();
        assert_eq!(item.phase, ExecutionPhase::Submitted);
        assert!(first[0].rearm);

        let second = syncer.sync(vec![wrap("a", item)]).await.unwrap();
        assert_eq!(second[0].action, SyncAction::Unchanged);
        assert!(second[0].rearm);
    }

    #[tokio::test]
    async fn test_unknown_status_aborts_batch() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_status("1", NativeStatus::new("MELTED"));
        let syncer = ResourceSyncer::new(backend.clone());

        let err = syncer
            .sync(vec![wrap("a", submitted("a", "1"))])
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Sync(ref msg) if msg.contains("MELTED")));
    }

    #[tokio::test]
    async fn test_phase_never_moves_back() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_status("1", NativeStatus::new("FINISHED"));
        let syncer = ResourceSyncer::new(backend.clone());

        let responses = syncer.sync(vec![wrap("a", submitted("a", "1"))]).await.unwrap();
        let item = updated(&responses[0]).clone();
        assert_eq!(item.phase, ExecutionPhase::Succeeded);

        // A later flap back to RUNNING is never even queried
        backend.set_status("1", NativeStatus::new("RUNNING"));
        let responses = syncer.sync(vec![wrap("a", item.clone())]).await.unwrap();
        assert_eq!(responses[0].action, SyncAction::Unchanged);
    }
}
