//! Error types shared across Quarry crates

use thiserror::Error;

/// Errors raised while mapping backend statuses onto phases
///
/// These are systemic: a batch hitting one is aborted rather than folded into
/// a single item's failure counter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// The backend reported a status code nobody knows how to map
    #[error("Unknown backend status: {0}")]
    UnknownBackendStatus(String),
}

/// Errors returned by a remote backend client
///
/// All of these are treated as transient by the status cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Request never got a response
    #[error("Backend request failed: {0}")]
    RequestFailed(String),

    /// Backend answered with an error status
    #[error("Backend error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Backend response could not be understood
    #[error("Failed to parse backend response: {0}")]
    ParseError(String),

    /// Backend does not know the job
    #[error("Remote job not found: {0}")]
    NotFound(String),
}

/// Errors returned by an admission controller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Unknown admission namespace: {0}")]
    UnknownNamespace(String),

    #[error("Admission controller failure: {0}")]
    Internal(String),
}
