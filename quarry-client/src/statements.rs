//! Statement API endpoints

use async_trait::async_trait;
use quarry_core::BackendError;
use quarry_core::backend::RemoteBackend;
use quarry_core::domain::job::RemoteJobHandle;
use quarry_core::domain::query::{NativeStatus, QuerySpec, Submission};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::StatementClient;
use crate::error::{ClientError, Result};

/// Error types the engine reports for failures that may pass on a retry
const RETRYABLE_ERROR_TYPES: &[&str] = &["INSUFFICIENT_RESOURCES", "EXTERNAL"];

/// Response to a statement submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    pub info_uri: Option<String>,
    pub next_uri: Option<String>,
    pub stats: StatementStats,
    pub error: Option<QueryError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementStats {
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    pub message: String,
    pub error_name: Option<String>,
    pub error_type: Option<String>,
}

/// Query state as returned by the query endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInfo {
    pub query_id: String,
    pub state: String,
    #[serde(rename = "self")]
    pub self_uri: Option<String>,
    pub error_type: Option<String>,
    pub failure_info: Option<FailureInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub message: Option<String>,
}

impl QueryInfo {
    /// Converts the engine's view into a native status
    ///
    /// A failed query whose error type is known to be transient is reported as
    /// `RETRYABLE_FAILURE` so the failure class survives phase mapping.
    pub fn native_status(&self) -> NativeStatus {
        let retryable = self.state.eq_ignore_ascii_case("FAILED")
            && self
                .error_type
                .as_deref()
                .is_some_and(|t| RETRYABLE_ERROR_TYPES.contains(&t));

        let code = if retryable {
            "RETRYABLE_FAILURE".to_string()
        } else {
            self.state.clone()
        };

        NativeStatus {
            code,
            message: self.failure_info.as_ref().and_then(|f| f.message.clone()),
            info_uri: self.self_uri.clone(),
        }
    }
}

impl QueryResults {
    pub fn native_status(&self) -> NativeStatus {
        NativeStatus {
            code: self.stats.state.clone(),
            message: self.error.as_ref().map(|e| e.message.clone()),
            info_uri: self.info_uri.clone(),
        }
    }
}

impl StatementClient {
    fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
        if value.is_empty() { fallback } else { value }
    }

    /// Submit a statement for execution
    ///
    /// # Arguments
    /// * `query` - The statement and the session it runs in
    ///
    /// # Returns
    /// The first results page, carrying the query id and state
    pub async fn submit_statement(&self, query: &QuerySpec) -> Result<QueryResults> {
        if query.statement.trim().is_empty() {
            return Err(ClientError::InvalidRequest("statement is empty".to_string()));
        }

        let url = format!("{}/v1/statement", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("X-Presto-User", Self::non_empty(&query.user, &self.user))
            .header("X-Presto-Source", Self::non_empty(&query.source, &self.source))
            .body(query.statement.clone());

        if !query.catalog.is_empty() {
            request = request.header("X-Presto-Catalog", &query.catalog);
        }
        if !query.schema.is_empty() {
            request = request.header("X-Presto-Schema", &query.schema);
        }
        if !query.routing_group.is_empty() {
            request = request.header("X-Presto-Routing-Group", &query.routing_group);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Get the current state of a query
    ///
    /// # Arguments
    /// * `query_id` - The id returned on submission
    pub async fn get_query(&self, query_id: &str) -> Result<QueryInfo> {
        let url = format!("{}/v1/query/{}", self.base_url, query_id);
        let response = self
            .client
            .get(&url)
            .header("X-Presto-User", &self.user)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a query
    ///
    /// # Arguments
    /// * `query_id` - The id returned on submission
    pub async fn cancel_query(&self, query_id: &str) -> Result<()> {
        let url = format!("{}/v1/query/{}", self.base_url, query_id);
        let response = self
            .client
            .delete(&url)
            .header("X-Presto-User", &self.user)
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}

#[async_trait]
impl RemoteBackend for StatementClient {
    async fn submit(&self, query: &QuerySpec) -> std::result::Result<Submission, BackendError> {
        let results = self.submit_statement(query).await?;
        debug!("Submitted query {} ({})", results.id, results.stats.state);

        let status = results.native_status();
        let mut handle = RemoteJobHandle::new(results.id);
        handle.uri = results.info_uri;

        Ok(Submission { handle, status })
    }

    async fn status(
        &self,
        handle: &RemoteJobHandle,
    ) -> std::result::Result<NativeStatus, BackendError> {
        let info = self.get_query(&handle.command_id).await?;
        Ok(info.native_status())
    }

    async fn cancel(&self, handle: &RemoteJobHandle) -> std::result::Result<(), BackendError> {
        self.cancel_query(&handle.command_id).await?;
        Ok(())
    }
}
