//! Trigger DTOs
//!
//! Requests accepted by the trigger orchestrator and the template it hands
//! back to the manifest publishing step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::artifact::PipelineArtifact;
use crate::domain::pipeline::CdPipeline;
use crate::domain::workflow::Workflow;

/// Actor recorded for automatic triggers and retriggers
pub const SYSTEM_USER_ID: i32 = 1;

/// Request to trigger a stage of a CD pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub pipeline: CdPipeline,
    pub artifact: PipelineArtifact,
    /// Existing workflow, absent when this trigger starts a new chain
    pub workflow: Option<Workflow>,
    pub triggered_by: i32,
    /// Re-run the stage from the snapshot of `ref_runner_id`
    #[serde(default)]
    pub is_retrigger: bool,
    pub ref_runner_id: Option<i64>,
    #[serde(default)]
    pub context: TriggerContext,
}

/// Request-scoped trigger metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    /// Correlates audit records created for this trigger
    pub reference_id: Option<Uuid>,
}

/// Everything the manifest publishing step needs after a pre stage is dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPushTemplate {
    pub workflow_runner_id: i64,
    pub workflow_id: i64,
    pub app_id: i64,
    pub app_name: String,
    pub environment_id: i64,
    pub environment_name: String,
    pub artifact_id: i64,
    pub image: String,
    pub helm_package_path: Option<String>,
    pub repo_url: Option<String>,
    pub target_revision: Option<String>,
    pub triggered_by: i32,
    pub triggered_at: DateTime<Utc>,
}
