//! Retrigger snapshots
//!
//! Re-executions reuse the exact request dispatched for the original run.
//! Only the identity of the new run is patched in; credentials, steps,
//! variables and storage targets are left untouched.

use std::sync::Arc;

use stagehand_core::domain::workflow::{StageType, WorkflowRun};
use stagehand_core::dto::trigger::SYSTEM_USER_ID;
use stagehand_core::dto::workflow_request::WorkflowRequest;

use crate::error::{LookupResultExt, Result};
use crate::repository::SnapshotRepository;

#[derive(Clone)]
pub struct SnapshotAdapter {
    snapshots: Arc<dyn SnapshotRepository>,
}

impl SnapshotAdapter {
    pub fn new(snapshots: Arc<dyn SnapshotRepository>) -> Self {
        Self { snapshots }
    }

    /// Request dispatched for `ref_runner_id`, exactly as stored
    pub async fn load(&self, ref_runner_id: i64, stage: StageType) -> Result<WorkflowRequest> {
        self.snapshots
            .find(ref_runner_id, stage)
            .await
            .found("workflow request snapshot of runner", ref_runner_id)
    }

    /// Stored request of `ref_runner_id`, re-addressed to `run`
    pub async fn load_for_retrigger(
        &self,
        ref_runner_id: i64,
        run: &WorkflowRun,
    ) -> Result<WorkflowRequest> {
        let mut request = self.load(ref_runner_id, run.stage_type).await?;
        retarget(&mut request, run);
        Ok(request)
    }

    pub async fn save(&self, runner_id: i64, request: &WorkflowRequest) -> Result<()> {
        self.snapshots
            .save(runner_id, request.stage_type, request)
            .await?;
        Ok(())
    }
}

/// Points a stored request at a new run; retriggers are attributed to the system user
pub fn retarget(request: &mut WorkflowRequest, run: &WorkflowRun) {
    request.workflow_id = run.workflow_id;
    request.workflow_runner_id = run.id;
    request.workflow_name_prefix = WorkflowRequest::name_prefix(run.id, &run.name);
    request.triggered_by = SYSTEM_USER_ID;
}
