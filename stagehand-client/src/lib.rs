//! Stagehand HTTP Client
//!
//! A small, type-safe HTTP client for the workflow execution service that
//! runs pre/post deployment stages, and for the notification endpoint that
//! receives stage events.
//!
//! # Example
//!
//! ```no_run
//! use stagehand_client::WorkflowClient;
//! use stagehand_core::dto::workflow_request::WorkflowRequest;
//!
//! async fn dispatch(request: &WorkflowRequest) -> anyhow::Result<()> {
//!     let client = WorkflowClient::new("http://localhost:8080");
//!     let receipt = client.submit_workflow(request, None).await?;
//!     println!("Submitted workflow: {}", receipt.workflow_name);
//!     Ok(())
//! }
//! ```

pub mod error;
mod events;
mod workflows;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use stagehand_core::dto::workflow_request::DispatchReceipt;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Header carrying the orchestrator token
const TOKEN_HEADER: &str = "token";

/// HTTP client for the workflow execution service
///
/// Groups two endpoint families:
/// - Workflow submission for stage runs
/// - Stage event notifications
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    /// Base URL of the service (e.g., "http://localhost:8080")
    base_url: String,
    /// Token sent with every request, when configured
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl WorkflowClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use stagehand_client::WorkflowClient;
    ///
    /// let client = WorkflowClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Attach an authentication token; empty tokens are ignored
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

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

    /// Check the status code of a response without a body
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
