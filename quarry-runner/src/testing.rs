//! In-memory fakes for the backend and admission seams

use async_trait::async_trait;
use quarry_core::admission::{AdmissionController, AllocationStatus};
use quarry_core::backend::RemoteBackend;
use quarry_core::domain::job::{JobKey, RemoteJobHandle};
use quarry_core::domain::query::{NativeStatus, QuerySpec, Submission};
use quarry_core::error::{AdmissionError, BackendError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend whose answers are scripted per command id
///
/// Submissions hand out the ids queued with `next_command_id`, falling back to
/// a running counter, and answer with the id's scripted status or `QUEUED`.
/// Unscripted status queries report `RUNNING`.
#[derive(Default)]
pub struct FakeBackend {
    next_ids: Mutex<Vec<String>>,
    submitted: Mutex<Vec<QuerySpec>>,
    statuses: Mutex<HashMap<String, NativeStatus>>,
    failing_status: Mutex<HashSet<String>>,
    cancelled: Mutex<Vec<String>>,
    fail_submit: Mutex<bool>,
    status_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_command_id(&self, id: &str) {
        self.next_ids.lock().unwrap().push(id.to_string());
    }

    pub fn fail_submissions(&self, fail: bool) {
        *self.fail_submit.lock().unwrap() = fail;
    }

    pub fn set_status(&self, command_id: &str, status: NativeStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(command_id.to_string(), status);
    }

    pub fn fail_status(&self, command_id: &str) {
        self.failing_status
            .lock()
            .unwrap()
            .insert(command_id.to_string());
    }

    pub fn submitted(&self) -> Vec<QuerySpec> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteBackend for FakeBackend {
    async fn submit(&self, query: &QuerySpec) -> Result<Submission, BackendError> {
        if *self.fail_submit.lock().unwrap() {
            return Err(BackendError::ApiError {
                status: 503,
                message: "coordinator unavailable".to_string(),
            });
        }

        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(query.clone());

        let mut next_ids = self.next_ids.lock().unwrap();
        let id = if next_ids.is_empty() {
            format!("q{}", submitted.len())
        } else {
            next_ids.remove(0)
        };

        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| NativeStatus::new("QUEUED"));
        let status = match status.info_uri {
            Some(_) => status,
            None => status.with_info_uri(format!("http://presto/ui/{}", id)),
        };

        Ok(Submission {
            handle: RemoteJobHandle::new(id.clone()),
            status,
        })
    }

    async fn status(&self, handle: &RemoteJobHandle) -> Result<NativeStatus, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_status.lock().unwrap().contains(&handle.command_id) {
            return Err(BackendError::RequestFailed("connection reset".to_string()));
        }

        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&handle.command_id)
            .cloned()
            .unwrap_or_else(|| NativeStatus::new("RUNNING")))
    }

    async fn cancel(&self, handle: &RemoteJobHandle) -> Result<(), BackendError> {
        self.cancelled
            .lock()
            .unwrap()
            .push(handle.command_id.clone());
        self.set_status(&handle.command_id, NativeStatus::new("CANCELED"));
        Ok(())
    }
}

/// Admission controller answering a fixed status and recording every call
pub struct FakeAdmission {
    status: Mutex<AllocationStatus>,
    fail_release: Mutex<bool>,
    allocations: AtomicUsize,
    releases: Mutex<Vec<(String, JobKey)>>,
}

impl FakeAdmission {
    pub fn new(status: AllocationStatus) -> Self {
        Self {
            status: Mutex::new(status),
            fail_release: Mutex::new(false),
            allocations: AtomicUsize::new(0),
            releases: Mutex::new(Vec::new()),
        }
    }

    pub fn set_status(&self, status: AllocationStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn fail_releases(&self, fail: bool) {
        *self.fail_release.lock().unwrap() = fail;
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> Vec<(String, JobKey)> {
        self.releases.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdmissionController for FakeAdmission {
    async fn allocate(
        &self,
        _namespace: &str,
        _token: &JobKey,
    ) -> Result<AllocationStatus, AdmissionError> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(*self.status.lock().unwrap())
    }

    async fn release(&self, namespace: &str, token: &JobKey) -> Result<(), AdmissionError> {
        if *self.fail_release.lock().unwrap() {
            return Err(AdmissionError::Internal("quota service unreachable".to_string()));
        }
        self.releases
            .lock()
            .unwrap()
            .push((namespace.to_string(), token.clone()));
        Ok(())
    }
}
