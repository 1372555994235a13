//! Platform settings, users, history and deployment hand-off

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagehand_core::domain::pipeline::CdPipeline;
use stagehand_core::domain::workflow::StageType;
use stagehand_core::dto::trigger::TriggerRequest;

#[async_trait]
pub trait AttributeService: Send + Sync {
    /// Public URL of the platform, used for callback links
    async fn host_url(&self) -> Result<Option<String>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn active_email(&self, user_id: i32) -> Result<Option<String>>;
}

#[async_trait]
pub trait HistoryService: Send + Sync {
    /// Records the stage script that was triggered
    async fn record_stage_script(
        &self,
        pipeline: &CdPipeline,
        stage: StageType,
        triggered_by: i32,
        triggered_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Starts the deploy stage of a CD pipeline
#[async_trait]
pub trait DeploymentTrigger: Send + Sync {
    async fn trigger_automatic_deployment(&self, request: TriggerRequest) -> Result<()>;
}
