//! Admission controller contract
//!
//! Gates how many jobs may be active (queued or submitted) at once. The
//! controller owns its own counters and their synchronization.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::job::JobKey;
use crate::error::AdmissionError;

/// Outcome of an allocation request
///
/// Denials are normal control flow, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStatus {
    Granted,
    /// The global pool is full
    Exhausted,
    /// The namespace's own quota is full
    NamespaceExhausted,
}

#[async_trait]
pub trait AdmissionController: Send + Sync {
    /// Requests a token for `token` in `namespace`
    ///
    /// Asking again for a token that is already held returns `Granted`.
    async fn allocate(
        &self,
        namespace: &str,
        token: &JobKey,
    ) -> Result<AllocationStatus, AdmissionError>;

    /// Gives a token back
    ///
    /// Releasing a token that was never granted, or was already released,
    /// succeeds.
    async fn release(&self, namespace: &str, token: &JobKey) -> Result<(), AdmissionError>;
}
