//! Job reconciler
//!
//! Plays the host's part: keeps the execution state of every tracked job and,
//! on each tick, hands it to the execution service and stores the state it
//! returns. Jobs that reach a terminal phase are finalized and retired.

use quarry_core::domain::job::{ExecutionState, JobKey};
use quarry_core::domain::phase::{PluginPhase, PluginPhaseInfo, map_execution_state_to_phase_info};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::JobContext;
use crate::service::ExecutionService;

/// A job the reconciler is still driving
#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub ctx: JobContext,
    pub state: ExecutionState,
    pub last_phase: Option<PluginPhase>,
}

/// Final report for a retired job
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub key: JobKey,
    pub state: ExecutionState,
    pub info: PluginPhaseInfo,
    /// Retired by shutdown rather than by reaching a terminal phase
    pub aborted: bool,
}

enum Step {
    Continue(TrackedJob),
    Finished(JobOutcome),
}

pub struct Reconciler {
    executor: Arc<dyn ExecutionService>,
    tick_interval: Duration,
    max_creation_failures: u32,
    jobs: Vec<TrackedJob>,
    finished: Vec<JobOutcome>,
}

impl Reconciler {
    pub fn new(executor: Arc<dyn ExecutionService>, config: &Config) -> Self {
        Self {
            executor,
            tick_interval: config.tick_interval,
            max_creation_failures: config.max_creation_failures,
            jobs: Vec::new(),
            finished: Vec::new(),
        }
    }

    /// Starts driving a new job from `NotStarted`
    pub fn track(&mut self, ctx: JobContext) {
        info!("Tracking job {} in '{}'", ctx.key, ctx.namespace);
        self.jobs.push(TrackedJob {
            ctx,
            state: ExecutionState::default(),
            last_phase: None,
        });
    }

    /// Number of jobs not yet retired
    pub fn active(&self) -> usize {
        self.jobs.len()
    }

    pub fn finished(&self) -> &[JobOutcome] {
        &self.finished
    }

    /// Runs ticks until every job is retired or `shutdown` resolves
    ///
    /// On shutdown every job still running is aborted and finalized.
    pub async fn run<F>(&mut self, shutdown: F) -> Vec<JobOutcome>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting reconcile loop for {} job(s) (interval: {:?})",
            self.jobs.len(),
            self.tick_interval
        );

        tokio::pin!(shutdown);
        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.jobs.is_empty() {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested, aborting {} job(s)", self.jobs.len());
                    self.abort_all().await;
                    break;
                }
                _ = ticker.tick() => {
                    let retired = self.tick().await;
                    if retired > 0 {
                        info!("Retired {} job(s), {} still active", retired, self.jobs.len());
                    }
                }
            }
        }

        std::mem::take(&mut self.finished)
    }

    /// Visits every tracked job once, returning how many were retired
    pub async fn tick(&mut self) -> usize {
        debug!("Reconciling {} job(s)", self.jobs.len());

        let mut tasks = JoinSet::new();
        for job in self.jobs.drain(..) {
            let executor = Arc::clone(&self.executor);
            tasks.spawn(step(executor, job));
        }

        let mut retired = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Step::Continue(job)) => self.jobs.push(job),
                Ok(Step::Finished(outcome)) => {
                    retired += 1;
                    self.finished.push(outcome);
                }
                Err(e) => error!("Job task panicked: {}", e),
            }
        }

        retired
    }

    /// Cancels and finalizes every job still tracked
    pub async fn abort_all(&mut self) {
        for job in std::mem::take(&mut self.jobs) {
            if let Err(e) = self.executor.abort(&job.ctx, &job.state).await {
                warn!("Failed to abort {}: {}", job.ctx.key, e);
            }
            if let Err(e) = self.executor.finalize(&job.ctx).await {
                error!("Failed to finalize {}: {}", job.ctx.key, e);
            }

            let info = map_execution_state_to_phase_info(&job.state, self.max_creation_failures);
            self.finished.push(JobOutcome {
                key: job.ctx.key,
                state: job.state,
                info,
                aborted: true,
            });
        }
    }
}

async fn step(executor: Arc<dyn ExecutionService>, mut job: TrackedJob) -> Step {
    let (state, info) = match executor.handle(&job.ctx, job.state.clone()).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Tick failed for {}: {}", job.ctx.key, e);
            return Step::Continue(job);
        }
    };

    if job.last_phase != Some(info.phase) {
        info!(
            "Job {} is {:?} ({})",
            job.ctx.key,
            info.phase,
            info.reason.as_deref().unwrap_or("-")
        );
        job.last_phase = Some(info.phase);
    }
    job.state = state;

    if !info.phase.is_terminal() {
        return Step::Continue(job);
    }

    // Only the creation-failure ceiling reports terminal for a live job
    if !job.state.phase.is_terminal() {
        warn!(
            "Giving up on {} after {} failed submissions",
            job.ctx.key, job.state.creation_failure_count
        );
        if let Err(e) = executor.abort(&job.ctx, &job.state).await {
            warn!("Failed to abort {}: {}", job.ctx.key, e);
        }
    }

    if let Err(e) = executor.finalize(&job.ctx).await {
        error!("Failed to finalize {}: {}", job.ctx.key, e);
    }

    Step::Finished(JobOutcome {
        key: job.ctx.key,
        state: job.state,
        info,
        aborted: false,
    })
}
