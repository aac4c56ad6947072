//! Execution service
//!
//! Drives one job through its lifecycle, one step per reconcile tick:
//! - `NotStarted`: ask the admission controller for a token
//! - `Queued`: submit the query to the backend and seed the status cache
//! - `Submitted`: read the job's last known phase from the status cache
//!
//! The state machine never polls the backend for status. That happens on the
//! cache's sync workers, so a tick only ever costs one cache read.

use async_trait::async_trait;
use chrono::Utc;
use quarry_cache::{AutoRefreshCache, CacheError};
use quarry_core::admission::{AdmissionController, AllocationStatus};
use quarry_core::backend::RemoteBackend;
use quarry_core::domain::job::{CacheItem, ExecutionState, JobKey};
use quarry_core::domain::phase::{
    ExecutionPhase, PluginPhaseInfo, map_execution_state_to_phase_info,
};
use quarry_core::error::{AdmissionError, BackendError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::JobContext;

/// Status cache holding every submitted job
pub type StatusCache = AutoRefreshCache<CacheItem>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Admission failed: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Status cache failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Job {0} has no backend handle")]
    MissingHandle(JobKey),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Asks for an admission token
///
/// The first request time is recorded once and never reset. A denial leaves
/// the job `NotStarted` so the next tick asks again.
pub async fn get_allocation_token(
    admission: &dyn AdmissionController,
    ctx: &JobContext,
    mut state: ExecutionState,
) -> Result<ExecutionState> {
    if state.allocation_token_request_start_time.is_none() {
        state.allocation_token_request_start_time = Some(Utc::now());
    }

    match admission.allocate(&ctx.namespace, &ctx.key).await? {
        AllocationStatus::Granted => {
            info!(
                "Allocation token granted for {} in '{}'",
                ctx.key, ctx.namespace
            );
            state.phase = ExecutionPhase::Queued;
        }
        denied => {
            debug!(
                "Allocation token denied for {} in '{}': {:?}",
                ctx.key, ctx.namespace, denied
            );
        }
    }

    Ok(state)
}

/// Submits the query and starts tracking it in the status cache
///
/// A failed submission is counted and retried on the next tick; it is not an
/// error. Once the backend has accepted the query the job is `Submitted` even
/// if the cache refuses it, and the next `monitor_query` seeds it again.
pub async fn kick_off_query(
    backend: &dyn RemoteBackend,
    cache: &StatusCache,
    ctx: &JobContext,
    mut state: ExecutionState,
) -> Result<ExecutionState> {
    let submission = match backend.submit(&ctx.query).await {
        Ok(submission) => submission,
        Err(e) => {
            state.creation_failure_count += 1;
            warn!(
                "Failed to submit query for {} (attempt {}): {}",
                ctx.key, state.creation_failure_count, e
            );
            return Ok(state);
        }
    };

    let mut handle = submission.handle;
    if handle.uri.is_none() {
        handle.uri = submission.status.info_uri.clone();
    }

    info!(
        "Submitted query {} for {} ({})",
        handle.command_id, ctx.key, submission.status.code
    );

    state.handle = Some(handle);
    state.phase = ExecutionPhase::Submitted;

    let item = CacheItem::submitted(ctx.key.clone(), state.handle.clone());
    if let Err(e) = cache.get_or_create(ctx.key.as_str(), item) {
        warn!(
            "Query {} submitted but not yet tracked: {}",
            state.command_id().unwrap_or_default(),
            e
        );
    }

    Ok(state)
}

/// Folds the cached view of the job into its state
///
/// The phase only moves forward. The failure counter and handle always come
/// from the cache since the sync workers are the only ones updating them.
pub async fn monitor_query(
    cache: &StatusCache,
    ctx: &JobContext,
    mut state: ExecutionState,
) -> Result<ExecutionState> {
    let default = CacheItem::submitted(ctx.key.clone(), state.handle.clone());
    let item = cache.get_or_create(ctx.key.as_str(), default)?;

    if item.phase != state.phase && state.phase.can_advance_to(item.phase) {
        info!(
            "Query {} for {} moved from {} to {}",
            state.command_id().unwrap_or_default(),
            ctx.key,
            state.phase,
            item.phase
        );
        state.phase = item.phase;
    }

    state.sync_failure_count = item.sync_failure_count;
    if let Some(reason) = item.failure_reason() {
        state.failure_reason = Some(reason);
    }
    if item.handle.is_some() {
        state.handle = item.handle;
    }

    Ok(state)
}

/// Cancels the remote query if it is still running
///
/// Fire and forget: the cancelled status shows up on a later sync.
pub async fn abort(backend: &dyn RemoteBackend, state: &ExecutionState) -> Result<()> {
    if state.phase.is_terminal() {
        debug!("Not aborting, query already {}", state.phase);
        return Ok(());
    }

    let Some(handle) = state.handle.as_ref() else {
        debug!("Not aborting, nothing was submitted");
        return Ok(());
    };

    info!("Cancelling query {}", handle.command_id);
    backend.cancel(handle).await?;
    Ok(())
}

/// Gives the job's admission token back and stops tracking it
///
/// The cache entry is evicted even when the release fails; the release error
/// is still returned.
pub async fn finalize(
    admission: &dyn AdmissionController,
    cache: &StatusCache,
    ctx: &JobContext,
) -> Result<()> {
    let released = admission.release(&ctx.namespace, &ctx.key).await;
    if cache.delete(ctx.key.as_str()).is_some() {
        debug!("Evicted {} from '{}'", ctx.key, cache.name());
    }
    released?;
    Ok(())
}

/// Service trait for driving jobs through their lifecycle
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Runs one step for the job and reports its phase
    async fn handle(
        &self,
        ctx: &JobContext,
        state: ExecutionState,
    ) -> Result<(ExecutionState, PluginPhaseInfo)>;

    /// Cancels the job's remote query, if any
    async fn abort(&self, ctx: &JobContext, state: &ExecutionState) -> Result<()>;

    /// Releases everything held for the job
    async fn finalize(&self, ctx: &JobContext) -> Result<()>;
}

/// Execution service backed by a remote backend, an admission controller
/// and the shared status cache
pub struct QueryExecutor {
    backend: Arc<dyn RemoteBackend>,
    admission: Arc<dyn AdmissionController>,
    cache: Arc<StatusCache>,
    max_creation_failures: u32,
}

impl QueryExecutor {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        admission: Arc<dyn AdmissionController>,
        cache: Arc<StatusCache>,
        config: &Config,
    ) -> Self {
        Self {
            backend,
            admission,
            cache,
            max_creation_failures: config.max_creation_failures,
        }
    }

    pub fn max_creation_failures(&self) -> u32 {
        self.max_creation_failures
    }
}

#[async_trait]
impl ExecutionService for QueryExecutor {
    async fn handle(
        &self,
        ctx: &JobContext,
        state: ExecutionState,
    ) -> Result<(ExecutionState, PluginPhaseInfo)> {
        let state = match state.phase {
            ExecutionPhase::NotStarted => {
                get_allocation_token(self.admission.as_ref(), ctx, state).await?
            }
            ExecutionPhase::Queued if state.creation_failure_count > self.max_creation_failures => {
                debug!(
                    "Not resubmitting {}, {} failed attempts",
                    ctx.key, state.creation_failure_count
                );
                state
            }
            ExecutionPhase::Queued => {
                kick_off_query(self.backend.as_ref(), &self.cache, ctx, state).await?
            }
            ExecutionPhase::Submitted => monitor_query(&self.cache, ctx, state).await?,
            ExecutionPhase::Succeeded | ExecutionPhase::Failed(_) => state,
        };

        let info = map_execution_state_to_phase_info(&state, self.max_creation_failures);
        Ok((state, info))
    }

    async fn abort(&self, _ctx: &JobContext, state: &ExecutionState) -> Result<()> {
        abort(self.backend.as_ref(), state).await
    }

    async fn finalize(&self, ctx: &JobContext) -> Result<()> {
        finalize(self.admission.as_ref(), &self.cache, ctx).await
    }
}
