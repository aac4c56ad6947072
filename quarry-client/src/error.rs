//! Error types for the Quarry statement client

use quarry_core::BackendError;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the statement API
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Query not found
    #[error("Query not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }
}

impl From<ClientError> for BackendError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RequestFailed(e) => BackendError::RequestFailed(e.to_string()),
            ClientError::ApiError { status, message } => BackendError::ApiError { status, message },
            ClientError::ParseError(msg) => BackendError::ParseError(msg),
            ClientError::NotFound(msg) => BackendError::NotFound(msg),
            ClientError::InvalidRequest(msg) => BackendError::RequestFailed(msg),
        }
    }
}
