//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::phase::{ExecutionPhase, RemotePhase};
use crate::domain::query::NativeStatus;

/// Caller-chosen identity of one logical remote job
///
/// Used both as the cache key and as the admission token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for JobKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// What the backend needs to re-query or cancel a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJobHandle {
    /// Backend command/query id
    pub command_id: String,
    /// Link to the backend's own status page, if it has one
    pub uri: Option<String>,
}

impl RemoteJobHandle {
    pub fn new(command_id: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            uri: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

/// Last native status seen from the backend and the phase it mapped to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub status: NativeStatus,
    pub phase: RemotePhase,
    pub observed_at: DateTime<Utc>,
}

/// Per-job state persisted by the host between reconciliation ticks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub phase: ExecutionPhase,
    pub handle: Option<RemoteJobHandle>,
    pub creation_failure_count: u32,
    pub sync_failure_count: u32,
    /// When this job first asked for an admission token; never reset
    pub allocation_token_request_start_time: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl ExecutionState {
    pub fn command_id(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.command_id.as_str())
    }
}

/// Cache-resident record tracking one remote job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    pub key: JobKey,
    pub handle: Option<RemoteJobHandle>,
    pub phase: ExecutionPhase,
    pub last_observed: Option<RemoteSnapshot>,
    pub sync_failure_count: u32,
}

impl CacheItem {
    /// Builds the item the cache starts tracking for a submitted job
    pub fn submitted(key: JobKey, handle: Option<RemoteJobHandle>) -> Self {
        Self {
            key,
            handle,
            phase: ExecutionPhase::Submitted,
            last_observed: None,
            sync_failure_count: 0,
        }
    }

    /// Failure message reported by the backend, if the job failed
    pub fn failure_reason(&self) -> Option<String> {
        match self.phase {
            ExecutionPhase::Failed(_) => self
                .last_observed
                .as_ref()
                .map(|s| s.status.message.clone().unwrap_or_else(|| s.status.code.clone())),
            _ => None,
        }
    }
}

/// A user-facing link to the backend's view of the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLog {
    pub name: String,
    pub uri: String,
}

/// Extra details reported alongside a plugin phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub logs: Vec<TaskLog>,
    pub occurred_at: DateTime<Utc>,
}

pub fn construct_task_log(state: &ExecutionState) -> Option<TaskLog> {
    let uri = state.handle.as_ref()?.uri.clone()?;
    Some(TaskLog {
        name: "Status".to_string(),
        uri,
    })
}

/// Returns `None` until the job has a backend handle
pub fn construct_task_info(state: &ExecutionState) -> Option<TaskInfo> {
    state.handle.as_ref()?;

    Some(TaskInfo {
        logs: construct_task_log(state).into_iter().collect(),
        occurred_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::phase::FailureKind;

    #[test]
    fn test_construct_task_log() {
        let expected = "https://presto.example.net:443";
        let state = ExecutionState {
            handle: Some(RemoteJobHandle::new("123").with_uri(expected)),
            ..Default::default()
        };

        let log = construct_task_log(&state).unwrap();
        assert_eq!(log.uri, expected);
        assert_eq!(log.name, "Status");
    }

    #[test]
    fn test_construct_task_info() {
        assert!(construct_task_info(&ExecutionState::default()).is_none());

        let state = ExecutionState {
            phase: ExecutionPhase::Succeeded,
            handle: Some(RemoteJobHandle::new("123").with_uri("https://presto.example.net:443")),
            ..Default::default()
        };
        let info = construct_task_info(&state).unwrap();
        assert_eq!(info.logs[0].uri, "https://presto.example.net:443");

        let no_uri = ExecutionState {
            handle: Some(RemoteJobHandle::new("123")),
            ..Default::default()
        };
        assert!(construct_task_info(&no_uri).unwrap().logs.is_empty());
    }

    #[test]
    fn test_execution_state_survives_persistence() {
        let state = ExecutionState {
            phase: ExecutionPhase::Failed(FailureKind::Retryable),
            handle: Some(RemoteJobHandle::new("q-1")),
            creation_failure_count: 2,
            sync_failure_count: 1,
            allocation_token_request_start_time: Some(Utc::now()),
            failure_reason: Some("node lost".to_string()),
        };

        let json = serde_json::to_string(&state).unwrap();
        let restored: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.command_id(), Some("q-1"));
    }

    #[test]
    fn test_cache_item_failure_reason() {
        let mut item = CacheItem::submitted(JobKey::from("k"), None);
        assert!(item.failure_reason().is_none());

        item.phase = ExecutionPhase::Failed(FailureKind::Permanent);
        item.last_observed = Some(RemoteSnapshot {
            status: NativeStatus::new("FAILED").with_message("table not found"),
            phase: RemotePhase::Failed(FailureKind::Permanent),
            observed_at: Utc::now(),
        });
        assert_eq!(item.failure_reason().as_deref(), Some("table not found"));
    }
}
