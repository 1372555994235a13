//! Pipeline, app and environment lookups

use anyhow::Result;
use async_trait::async_trait;
use stagehand_core::domain::environment::{App, AppLabel, Environment};
use stagehand_core::domain::pipeline::{CdPipeline, CiPipeline};

/// Read access to CD and CI pipeline definitions
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn find_cd_pipeline(&self, id: i64) -> Result<Option<CdPipeline>>;

    async fn find_ci_pipeline(&self, id: i64) -> Result<Option<CiPipeline>>;

    /// CD pipelines directly downstream of `pipeline_id` in the app workflow
    async fn find_child_cd_pipelines(&self, pipeline_id: i64) -> Result<Vec<CdPipeline>>;

    /// Current release counter of the pipeline's deployments, if it ever deployed
    async fn find_release_counter(&self, pipeline_id: i64) -> Result<Option<i64>>;
}

/// Read access to apps, their labels and environments
#[async_trait]
pub trait AppRepository: Send + Sync {
    async fn find_app(&self, id: i64) -> Result<Option<App>>;

    async fn find_app_labels(&self, app_id: i64) -> Result<Vec<AppLabel>>;

    async fn find_environment(&self, id: i64) -> Result<Option<Environment>>;
}
