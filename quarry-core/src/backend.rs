//! Remote backend client contract
//!
//! Implemented by whatever talks to the execution service. The status cache
//! calls `status` from its workers; the state machine calls `submit` and
//! `cancel`. Implementations must be safe to share across tasks.

use async_trait::async_trait;

use crate::domain::job::RemoteJobHandle;
use crate::domain::query::{NativeStatus, QuerySpec, Submission};
use crate::error::BackendError;

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Submits a statement and returns the handle of the new remote job
    async fn submit(&self, query: &QuerySpec) -> Result<Submission, BackendError>;

    /// Fetches the current native status of a submitted job
    async fn status(&self, handle: &RemoteJobHandle) -> Result<NativeStatus, BackendError>;

    /// Asks the backend to stop a job
    async fn cancel(&self, handle: &RemoteJobHandle) -> Result<(), BackendError>;
}
