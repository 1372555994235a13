//! Workflow domain types
//!
//! A [`Workflow`] groups the pre, deploy and post runs triggered for one
//! artifact on one CD pipeline. Each [`WorkflowRun`] is a single execution
//! attempt of a stage and moves through
//! `Starting -> Running -> {Succeeded | Failed | Cancelled}`.
//!
//! Run status is only mutated through [`WorkflowRun::transition`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stage of a CD workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageType {
    Pre,
    Post,
    Deploy,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Pre => "PRE",
            StageType::Post => "POST",
            StageType::Deploy => "DEPLOY",
        }
    }
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRE" => Ok(StageType::Pre),
            "POST" => Ok(StageType::Post),
            "DEPLOY" => Ok(StageType::Deploy),
            other => Err(format!("unknown stage type: {other}")),
        }
    }
}

/// Status of a stage run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Starting,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Starting => "Starting",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
        }
    }

    /// Whether a run in `self` may move to `next`
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match self {
            RunStatus::Starting => next != RunStatus::Starting,
            RunStatus::Running => next.is_terminal(),
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Starting" => Ok(RunStatus::Starting),
            "Running" => Ok(RunStatus::Running),
            "Succeeded" => Ok(RunStatus::Succeeded),
            "Failed" => Ok(RunStatus::Failed),
            "Cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Backend that executes the dispatched workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutorType {
    /// Argo workflow executor
    Awf,
    /// In-cluster system executor
    System,
}

impl ExecutorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorType::Awf => "AWF",
            ExecutorType::System => "SYSTEM",
        }
    }
}

impl std::str::FromStr for ExecutorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWF" => Ok(ExecutorType::Awf),
            "SYSTEM" => Ok(ExecutorType::System),
            other => Err(format!("unknown executor type: {other}")),
        }
    }
}

/// Parent grouping of the runs triggered for one artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: i64,
    pub artifact_id: i64,
    pub pipeline_id: i64,
    pub created_on: DateTime<Utc>,
}

/// Rejected run-state change
#[derive(Debug, Error, PartialEq, Eq)]
#[error("run {run_id}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub run_id: i64,
    pub from: RunStatus,
    pub to: RunStatus,
}

/// One execution attempt of a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: i64,
    pub workflow_id: i64,
    /// Run name, the CD pipeline name
    pub name: String,
    pub stage_type: StageType,
    status: RunStatus,
    message: String,
    pub pod_status: String,
    pub started_on: DateTime<Utc>,
    finished_on: Option<DateTime<Utc>>,
    pub triggered_by: i32,
    pub namespace: String,
    pub executor_type: ExecutorType,
    pub blob_storage_enabled: bool,
    pub log_location: String,
    /// Correlates the run with audit records of the triggering request
    pub reference_id: Option<Uuid>,
    /// Run this one re-executes
    pub ref_runner_id: Option<i64>,
    #[serde(default)]
    pub image_path_reservation_ids: Vec<i64>,
}

/// Attributes of a run about to be created
#[derive(Debug, Clone)]
pub struct NewWorkflowRun {
    pub workflow_id: i64,
    pub name: String,
    pub stage_type: StageType,
    pub started_on: DateTime<Utc>,
    pub triggered_by: i32,
    pub namespace: String,
    pub executor_type: ExecutorType,
    pub blob_storage_enabled: bool,
    pub log_location: String,
    pub reference_id: Option<Uuid>,
    pub ref_runner_id: Option<i64>,
}

impl WorkflowRun {
    /// Pod status recorded for a run that has not been scheduled yet
    pub const POD_PENDING: &'static str = "Pending";

    /// Creates a run in the `Starting` state; `id` is assigned on persist
    pub fn starting(new: NewWorkflowRun) -> Self {
        Self {
            id: 0,
            workflow_id: new.workflow_id,
            name: new.name,
            stage_type: new.stage_type,
            status: RunStatus::Starting,
            message: String::new(),
            pod_status: Self::POD_PENDING.to_string(),
            started_on: new.started_on,
            finished_on: None,
            triggered_by: new.triggered_by,
            namespace: new.namespace,
            executor_type: new.executor_type,
            blob_storage_enabled: new.blob_storage_enabled,
            log_location: new.log_location,
            reference_id: new.reference_id,
            ref_runner_id: new.ref_runner_id,
            image_path_reservation_ids: Vec::new(),
        }
    }

    /// Restores persisted state; used by repositories when loading a run
    pub fn with_persisted_state(
        mut self,
        status: RunStatus,
        message: String,
        finished_on: Option<DateTime<Utc>>,
    ) -> Self {
        self.status = status;
        self.message = message;
        self.finished_on = finished_on;
        self
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn finished_on(&self) -> Option<DateTime<Utc>> {
        self.finished_on
    }

    /// Moves the run to `to`, recording `message` and, for terminal states,
    /// the finish time.
    pub fn transition(
        &mut self,
        to: RunStatus,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                run_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.message = message.into();
        if to.is_terminal() {
            self.finished_on = Some(at);
        }
        Ok(())
    }
}
