//! Workflow dispatch and notifications

use anyhow::{Context, Result};
use async_trait::async_trait;
use stagehand_client::{ClientError, WorkflowClient};
use stagehand_core::dto::event::StageEvent;
use stagehand_core::dto::workflow_request::{DispatchReceipt, WorkflowRequest};
use uuid::Uuid;

/// Hands a built request to the workflow execution service
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        request: &WorkflowRequest,
        reference_id: Option<Uuid>,
    ) -> Result<DispatchReceipt>;
}

/// Publishes stage notifications
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &StageEvent) -> Result<()>;
}

/// [`Dispatcher`] backed by the workflow service HTTP API
pub struct HttpDispatcher {
    client: WorkflowClient,
}

impl HttpDispatcher {
    pub fn new(client: WorkflowClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        request: &WorkflowRequest,
        reference_id: Option<Uuid>,
    ) -> Result<DispatchReceipt> {
        self.client
            .submit_workflow(request, reference_id)
            .await
            .map_err(|e| {
                let failure = describe_failure(&e);
                anyhow::Error::new(e)
                    .context(format!("{failure} for runner {}", request.workflow_runner_id))
            })
    }
}

/// Which side of the submission went wrong
fn describe_failure(err: &ClientError) -> &'static str {
    if err.is_not_found() {
        "workflow submission endpoint not found"
    } else if err.is_client_error() {
        "workflow service rejected the request"
    } else if err.is_server_error() {
        "workflow service failed"
    } else if matches!(err, ClientError::RequestFailed(_)) {
        "workflow service unreachable"
    } else {
        "unexpected workflow service response"
    }
}

/// [`EventPublisher`] backed by the notification HTTP API
pub struct HttpEventPublisher {
    client: WorkflowClient,
}

impl HttpEventPublisher {
    pub fn new(client: WorkflowClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, event: &StageEvent) -> Result<()> {
        self.client
            .publish_event(event)
            .await
            .context("failed to publish stage event")
    }
}
