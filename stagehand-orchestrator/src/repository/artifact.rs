//! Artifact, git material and CI workflow lookups

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagehand_core::domain::artifact::{PipelineArtifact, WebhookData};
use stagehand_core::domain::pipeline::{GitMaterial, SourceType};

/// Content-addressed image records
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn find_artifact(&self, id: i64) -> Result<Option<PipelineArtifact>>;

    /// Rewrites the deprecated external data source of an artifact
    async fn migrate_to_webhook_data_source(&self, artifact_id: i64) -> Result<()>;

    /// Images among `image_paths` already recorded as artifacts
    async fn find_existing_images(&self, image_paths: &[String]) -> Result<Vec<String>>;
}

/// Commit a CI build was triggered with, for one pipeline material
#[derive(Debug, Clone)]
pub struct GitCommit {
    pub commit: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub message: String,
    pub source_type: SourceType,
    pub source_value: String,
    pub git_repo_url: String,
    pub webhook_data: Option<WebhookData>,
}

/// Build run of a CI pipeline
#[derive(Debug, Clone)]
pub struct CiWorkflow {
    pub id: i64,
    pub ci_pipeline_id: i64,
    /// Commits keyed by CI pipeline material id
    pub git_triggers: BTreeMap<i64, GitCommit>,
}

/// Git materials and the CI builds that used them
#[async_trait]
pub trait GitMaterialRepository: Send + Sync {
    async fn find_git_material(&self, id: i64) -> Result<Option<GitMaterial>>;

    /// Most recent CI workflow that produced `artifact_id`
    async fn find_last_ci_workflow_for_artifact(&self, artifact_id: i64)
    -> Result<Option<CiWorkflow>>;
}
