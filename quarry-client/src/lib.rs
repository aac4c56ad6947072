//! Quarry HTTP Client
//!
//! A small, type-safe HTTP client for a Presto-style statement API.
//!
//! The client implements [`quarry_core::RemoteBackend`], so it can be handed
//! directly to the status cache and the execution state machine.
//!
//! # Example
//!
//! ```no_run
//! use quarry_client::StatementClient;
//! use quarry_core::domain::query::QuerySpec;
//!
//! #[tokio::main]
//! async fn main() -> quarry_client::Result<()> {
//!     let client = StatementClient::new("http://localhost:8080");
//!
//!     let results = client.submit_statement(&QuerySpec {
//!         statement: "select 1".to_string(),
//!         ..Default::default()
//!     }).await?;
//!
//!     println!("Submitted query: {}", results.id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod statements;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use statements::{QueryError, QueryInfo, QueryResults, StatementStats};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// Value sent as the user header when none is configured
pub const DEFAULT_USER: &str = "quarry";

/// Value sent as the source header when none is configured
pub const DEFAULT_SOURCE: &str = "quarry-runner";

/// HTTP client for the statement API
///
/// Covers the three calls the execution core needs:
/// - submitting a statement
/// - fetching the state of a query
/// - cancelling a query
#[derive(Debug, Clone)]
pub struct StatementClient {
    /// Base URL of the query engine (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Fallback user when a query does not name one
    user: String,
    /// Fallback source when a query does not name one
    source: String,
}

impl StatementClient {
    /// Create a new statement client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the query engine (e.g., "http://localhost:8080")
    ///
    /// # Example
    /// ```
    /// use quarry_client::StatementClient;
    ///
    /// let client = StatementClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new statement client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use quarry_client::StatementClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = StatementClient::with_client("http://localhost:8080", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            user: DEFAULT_USER.to_string(),
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    /// Sets the user sent for queries that do not name one
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Get the base URL of the query engine
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            let url = response.url().to_string();
            return Err(ClientError::NotFound(url));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = StatementClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.user(), DEFAULT_USER);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = StatementClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = StatementClient::with_client("http://localhost:8080", http_client)
            .with_user("etl-bot");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.user(), "etl-bot");
    }
}
