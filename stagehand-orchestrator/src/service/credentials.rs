//! Credential Resolver
//!
//! Derives the registry credentials a stage needs to pull the artifact's
//! image by walking the artifact's provenance. First match wins:
//!
//! 1. an explicit credential source on the artifact (plugin-copied images)
//! 2. a polling/job source pipeline: always its overridden configuration
//! 3. a linked source pipeline: the parent pipeline's effective configuration
//! 4. any other source pipeline: its own effective configuration
//! 5. no source pipeline (external CI): the app's base build configuration

use std::sync::Arc;

use stagehand_core::domain::artifact::PipelineArtifact;
use stagehand_core::domain::pipeline::{CiPipeline, CiPipelineType};
use stagehand_core::domain::registry::RegistryConfig;
use tracing::debug;

use crate::error::{LookupResultExt, Result};
use crate::repository::{PipelineRepository, RegistryRepository};

pub struct CredentialResolver {
    pipelines: Arc<dyn PipelineRepository>,
    registries: Arc<dyn RegistryRepository>,
}

impl CredentialResolver {
    pub fn new(
        pipelines: Arc<dyn PipelineRepository>,
        registries: Arc<dyn RegistryRepository>,
    ) -> Self {
        Self {
            pipelines,
            registries,
        }
    }

    /// Registry configuration for pulling `artifact`
    pub async fn resolve(
        &self,
        source: Option<&CiPipeline>,
        artifact: &PipelineArtifact,
        app_id: i64,
    ) -> Result<RegistryConfig> {
        if let Some(registry_id) = artifact.mapped_registry_id() {
            debug!(artifact_id = artifact.id, registry_id, "using artifact credential source");
            return self
                .registries
                .find_registry(registry_id)
                .await
                .found("registry", registry_id);
        }

        let Some(source) = source else {
            return self
                .registries
                .find_base_config(app_id)
                .await
                .found("build configuration of app", app_id);
        };

        if source.is_job() {
            return self.applied_config(source, true).await;
        }

        if source.is_linked() {
            let parent_id = source.parent_ci_pipeline.unwrap_or_default();
            let parent = self
                .pipelines
                .find_ci_pipeline(parent_id)
                .await
                .found("ci pipeline", parent_id)?;
            return self
                .applied_config(&parent, parent.is_docker_config_overridden)
                .await;
        }

        self.applied_config(source, source.is_docker_config_overridden)
            .await
    }

    /// CI pipeline that actually built the images of `ci_pipeline`
    ///
    /// Pipelines syncing images from another CD pipeline are resolved to the
    /// CI pipeline feeding that CD pipeline.
    pub async fn source_ci_pipeline(&self, ci_pipeline: CiPipeline) -> Result<CiPipeline> {
        if ci_pipeline.pipeline_type != CiPipelineType::LinkedCd {
            return Ok(ci_pipeline);
        }

        let cd_pipeline_id = ci_pipeline.parent_ci_pipeline.unwrap_or_default();
        let cd_pipeline = self
            .pipelines
            .find_cd_pipeline(cd_pipeline_id)
            .await
            .found("cd pipeline", cd_pipeline_id)?;
        let ci_pipeline_id = cd_pipeline.ci_pipeline_id.unwrap_or_default();
        self.pipelines
            .find_ci_pipeline(ci_pipeline_id)
            .await
            .found("ci pipeline", ci_pipeline_id)
    }

    async fn applied_config(&self, pipeline: &CiPipeline, overridden: bool) -> Result<RegistryConfig> {
        self.registries
            .find_applied_config(pipeline.id, pipeline.app_id, overridden)
            .await
            .found("build configuration of ci pipeline", pipeline.id)
    }
}
