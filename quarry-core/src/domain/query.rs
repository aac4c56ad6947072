//! Query domain types

use serde::{Deserialize, Serialize};

use crate::domain::job::RemoteJobHandle;

/// Everything the backend needs to run one statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub statement: String,
    pub routing_group: String,
    pub catalog: String,
    pub schema: String,
    pub user: String,
    pub source: String,
}

/// Status exactly as the backend reported it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeStatus {
    pub code: String,
    pub message: Option<String>,
    pub info_uri: Option<String>,
}

impl NativeStatus {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: None,
            info_uri: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_info_uri(mut self, uri: impl Into<String>) -> Self {
        self.info_uri = Some(uri.into());
        self
    }
}

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub handle: RemoteJobHandle,
    pub status: NativeStatus,
}
