//! Trigger policies: feasibility filters, vulnerability gate, digest
//! pinning and deployment configuration

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagehand_core::domain::deployment::DeploymentConfig;
use stagehand_core::domain::environment::Environment;
use stagehand_core::domain::pipeline::CdPipeline;
use stagehand_core::domain::workflow::StageType;
use stagehand_core::dto::trigger::TriggerRequest;

/// Outcome of the filter evaluation for one trigger, recorded against the run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterEvaluationAudit {
    pub id: i64,
    pub artifact_id: i64,
    pub pipeline_id: i64,
}

/// Verdict of the feasibility evaluation
#[derive(Debug, Clone)]
pub enum Feasibility {
    Allowed { audit: Option<FilterEvaluationAudit> },
    Blocked { reason: String },
}

/// Filter and deployment-window checks performed before a run is created
#[async_trait]
pub trait FeasibilityService: Send + Sync {
    async fn evaluate(
        &self,
        request: &TriggerRequest,
        env: &Environment,
        stage: StageType,
    ) -> Result<Feasibility>;

    /// Links the filter evaluation audit to the created run
    async fn link_filter_audit(&self, audit: &FilterEvaluationAudit, runner_id: i64) -> Result<()>;

    /// Records that a deployment window was bypassed by this trigger
    async fn record_deployment_window_bypass(
        &self,
        request: &TriggerRequest,
        runner_id: i64,
    ) -> Result<()>;
}

#[async_trait]
pub trait ImageScanService: Send + Sync {
    /// Whether the image with `image_digest` violates the pipeline's scan policy
    async fn is_vulnerable(&self, pipeline: &CdPipeline, image_digest: &str) -> Result<bool>;
}

#[async_trait]
pub trait DigestPolicyService: Send + Sync {
    /// Whether triggers of the pipeline must reference images by digest
    async fn use_digest_for_trigger(&self, pipeline_id: i64) -> Result<bool>;
}

#[async_trait]
pub trait DeploymentConfigService: Send + Sync {
    /// Deployment configuration of (app, env), migrated from legacy storage if absent
    async fn get_or_migrate(&self, app_id: i64, environment_id: i64) -> Result<DeploymentConfig>;

    /// Problem with a user-supplied GitOps repository, if any
    async fn validate_custom_repo(&self, config: &DeploymentConfig) -> Result<Option<String>>;
}
