//! Workflow submission endpoints

use crate::WorkflowClient;
use crate::error::{ClientError, Result};
use stagehand_core::dto::workflow_request::{DispatchReceipt, WorkflowRequest};
use uuid::Uuid;

/// Header correlating a submission with the trigger's audit records
const REFERENCE_HEADER: &str = "X-Reference-Id";

impl WorkflowClient {
    // =============================================================================
    // Stage Workflows
    // =============================================================================

    /// Submit a stage workflow for execution
    ///
    /// # Arguments
    /// * `request` - The fully assembled workflow request
    /// * `reference_id` - Optional id of the triggering request, forwarded as a header
    ///
    /// # Returns
    /// The name of the created workflow and, for manifest-publishing
    /// pipelines, the location of the packaged chart
    pub async fn submit_workflow(
        &self,
        request: &WorkflowRequest,
        reference_id: Option<Uuid>,
    ) -> Result<DispatchReceipt> {
        if request.workflow_runner_id <= 0 {
            return Err(ClientError::InvalidRequest(
                "workflow runner id is not assigned".to_string(),
            ));
        }

        let url = format!("{}/api/workflows/submit", self.base_url);
        let mut builder = self.authorized(self.client.post(&url)).json(request);
        if let Some(reference_id) = reference_id {
            builder = builder.header(REFERENCE_HEADER, reference_id.to_string());
        }

        tracing::debug!(
            "Submitting {} workflow {} for runner {}",
            request.stage_type,
            request.workflow_name_prefix,
            request.workflow_runner_id
        );
        let response = builder.send().await?;

        self.handle_response(response).await
    }
}
