//! Run lifecycle
//!
//! The only code path that changes a run's status. Every change is applied
//! through [`WorkflowRun::transition`] and written back before returning,
//! so a run observed in storage always reflects the last accepted state.

use std::sync::Arc;

use chrono::Utc;
use stagehand_core::domain::workflow::{NewWorkflowRun, RunStatus, WorkflowRun};
use tracing::{debug, error};

use crate::error::Result;
use crate::repository::WorkflowRepository;

#[derive(Clone)]
pub struct RunLifecycle {
    runs: Arc<dyn WorkflowRepository>,
}

impl RunLifecycle {
    pub fn new(runs: Arc<dyn WorkflowRepository>) -> Self {
        Self { runs }
    }

    /// Persists a new run in `Starting`
    pub async fn start(&self, new: NewWorkflowRun) -> Result<WorkflowRun> {
        let mut run = WorkflowRun::starting(new);
        run.id = self.runs.create_run(&run).await?;
        debug!(runner_id = run.id, workflow_id = run.workflow_id, stage = %run.stage_type, "run created");
        Ok(run)
    }

    pub async fn transition(
        &self,
        run: &mut WorkflowRun,
        to: RunStatus,
        message: impl Into<String>,
    ) -> Result<()> {
        let from = run.status();
        run.transition(to, message, Utc::now())?;
        self.runs.update_run(run).await?;
        debug!(runner_id = run.id, %from, %to, "run transitioned");
        Ok(())
    }

    /// Marks the run `Failed`, logging instead of returning a failure to do so
    ///
    /// Used on error paths where the original error is the one to surface.
    pub async fn fail(&self, run: &mut WorkflowRun, message: &str) {
        if let Err(e) = self.transition(run, RunStatus::Failed, message).await {
            error!(runner_id = run.id, "failed to mark run as failed: {}", e);
        }
    }

    /// Records the image path reservations held by the run
    pub async fn attach_reservations(&self, run: &mut WorkflowRun, ids: Vec<i64>) -> Result<()> {
        run.image_path_reservation_ids = ids;
        self.runs.update_run(run).await?;
        Ok(())
    }
}
