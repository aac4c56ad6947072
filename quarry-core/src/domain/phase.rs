//! Phase taxonomy
//!
//! Three layers of phases live here:
//! - `RemotePhase`: the coarse, backend-agnostic phase a native status maps to
//! - `ExecutionPhase`: where the per-job state machine is in its lifecycle
//! - `PluginPhase`: the generic phase reported upstream to the host
//!
//! Mapping only ever moves forward. Once a job is terminal it stays terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::job::{ExecutionState, TaskInfo, construct_task_info};
use crate::error::PhaseError;

/// Failure class reported by the backend
///
/// Kept all the way through to the plugin phase so the host can decide
/// whether a failed job is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Permanent,
    Retryable,
}

/// Coarse phase of a remote job
///
/// `ResourcesCreated < Succeeded`; `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemotePhase {
    ResourcesCreated,
    Succeeded,
    Failed(FailureKind),
}

impl RemotePhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemotePhase::ResourcesCreated)
    }
}

impl fmt::Display for RemotePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemotePhase::ResourcesCreated => write!(f, "ResourcesCreated"),
            RemotePhase::Succeeded => write!(f, "Succeeded"),
            RemotePhase::Failed(FailureKind::Permanent) => write!(f, "Failed(permanent)"),
            RemotePhase::Failed(FailureKind::Retryable) => write!(f, "Failed(retryable)"),
        }
    }
}

/// Native status codes meaning "not finished yet"
pub const PENDING_STATUS_CODES: &[&str] = &[
    "UNDEFINED",
    "NOT_READY",
    "INITIALIZING",
    "WAITING",
    "WAITING_FOR_RESOURCES",
    "QUEUED",
    "DISPATCHING",
    "PLANNING",
    "STARTING",
    "RUNNING",
    "BLOCKED",
    "FINISHING",
];

/// Native status codes meaning the job completed successfully
pub const SUCCESS_STATUS_CODES: &[&str] = &["SUCCESS", "SUCCEEDED", "FINISHED"];

/// Native status codes for failures that will not go away on retry
pub const PERMANENT_FAILURE_STATUS_CODES: &[&str] = &[
    "FAILED",
    "PERMANENT_FAILURE",
    "CANCELED",
    "CANCELLED",
    "KILLED",
];

/// Native status codes for failures worth another attempt
pub const RETRYABLE_FAILURE_STATUS_CODES: &[&str] =
    &["RETRYABLE_FAILURE", "ABANDONED", "PREEMPTED"];

/// Maps a backend-native status code onto a coarse remote phase
///
/// Matching is case-insensitive. An unrecognized code is an error and is never
/// defaulted to a phase.
pub fn map_native_status(code: &str) -> Result<RemotePhase, PhaseError> {
    let normalized = code.trim().to_ascii_uppercase();
    let code = normalized.as_str();

    if PENDING_STATUS_CODES.contains(&code) {
        Ok(RemotePhase::ResourcesCreated)
    } else if SUCCESS_STATUS_CODES.contains(&code) {
        Ok(RemotePhase::Succeeded)
    } else if PERMANENT_FAILURE_STATUS_CODES.contains(&code) {
        Ok(RemotePhase::Failed(FailureKind::Permanent))
    } else if RETRYABLE_FAILURE_STATUS_CODES.contains(&code) {
        Ok(RemotePhase::Failed(FailureKind::Retryable))
    } else {
        Err(PhaseError::UnknownBackendStatus(normalized))
    }
}

/// Lifecycle phase of one job as driven by the execution state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionPhase {
    #[default]
    NotStarted,
    Queued,
    Submitted,
    Succeeded,
    Failed(FailureKind),
}

impl ExecutionPhase {
    /// Position along `NotStarted < Queued < Submitted < terminal`
    pub fn rank(&self) -> u8 {
        match self {
            ExecutionPhase::NotStarted => 0,
            ExecutionPhase::Queued => 1,
            ExecutionPhase::Submitted => 2,
            ExecutionPhase::Succeeded | ExecutionPhase::Failed(_) => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionPhase::Succeeded | ExecutionPhase::Failed(_))
    }

    /// True while nothing has been handed to the backend yet
    pub fn is_not_yet_submitted(&self) -> bool {
        matches!(self, ExecutionPhase::NotStarted | ExecutionPhase::Queued)
    }

    /// Whether moving from `self` to `next` keeps the phase monotonic
    ///
    /// Terminal phases only "advance" to themselves.
    pub fn can_advance_to(&self, next: ExecutionPhase) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }
}

impl From<RemotePhase> for ExecutionPhase {
    fn from(phase: RemotePhase) -> Self {
        match phase {
            RemotePhase::ResourcesCreated => ExecutionPhase::Submitted,
            RemotePhase::Succeeded => ExecutionPhase::Succeeded,
            RemotePhase::Failed(kind) => ExecutionPhase::Failed(kind),
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPhase::NotStarted => write!(f, "NotStarted"),
            ExecutionPhase::Queued => write!(f, "Queued"),
            ExecutionPhase::Submitted => write!(f, "Submitted"),
            ExecutionPhase::Succeeded => write!(f, "Succeeded"),
            ExecutionPhase::Failed(FailureKind::Permanent) => write!(f, "Failed(permanent)"),
            ExecutionPhase::Failed(FailureKind::Retryable) => write!(f, "Failed(retryable)"),
        }
    }
}

/// Generic execution phase reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginPhase {
    NotReady,
    Running,
    Success,
    RetryableFailure,
    PermanentFailure,
}

impl PluginPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PluginPhase::Success | PluginPhase::RetryableFailure | PluginPhase::PermanentFailure
        )
    }
}

/// Plugin phase plus the details the host renders for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginPhaseInfo {
    pub phase: PluginPhase,
    pub reason: Option<String>,
    pub task_info: Option<TaskInfo>,
}

impl PluginPhaseInfo {
    fn new(phase: PluginPhase, reason: Option<String>, task_info: Option<TaskInfo>) -> Self {
        Self {
            phase,
            reason,
            task_info,
        }
    }
}

/// Maps an execution state onto the phase reported upstream
///
/// A job stuck in `Queued` with more than `max_creation_failures` failed
/// submissions is reported as a retryable failure.
pub fn map_execution_state_to_phase_info(
    state: &ExecutionState,
    max_creation_failures: u32,
) -> PluginPhaseInfo {
    match state.phase {
        ExecutionPhase::NotStarted => PluginPhaseInfo::new(
            PluginPhase::NotReady,
            Some("waiting for an allocation token".to_string()),
            None,
        ),
        ExecutionPhase::Queued => {
            if state.creation_failure_count > max_creation_failures {
                PluginPhaseInfo::new(
                    PluginPhase::RetryableFailure,
                    Some(format!(
                        "too many creation attempts ({})",
                        state.creation_failure_count
                    )),
                    None,
                )
            } else {
                PluginPhaseInfo::new(
                    PluginPhase::Running,
                    Some("query queued for submission".to_string()),
                    construct_task_info(state),
                )
            }
        }
        ExecutionPhase::Submitted => {
            PluginPhaseInfo::new(PluginPhase::Running, None, construct_task_info(state))
        }
        ExecutionPhase::Succeeded => {
            PluginPhaseInfo::new(PluginPhase::Success, None, construct_task_info(state))
        }
        ExecutionPhase::Failed(FailureKind::Permanent) => PluginPhaseInfo::new(
            PluginPhase::PermanentFailure,
            state.failure_reason.clone(),
            construct_task_info(state),
        ),
        ExecutionPhase::Failed(FailureKind::Retryable) => PluginPhaseInfo::new(
            PluginPhase::RetryableFailure,
            state.failure_reason.clone(),
            construct_task_info(state),
        ),
    }
}
