//! Pipeline domain types
//!
//! CD pipelines own the pre/post deployment stages; CI pipelines are the
//! upstream origin of the artifacts those stages run against.

use serde::{Deserialize, Serialize};

/// How a CD pipeline is started once its upstream stage succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerType {
    Automatic,
    Manual,
}

/// CD pipeline definition
///
/// Structure shared between the trigger orchestrator (reads) and the
/// pipeline repository collaborator (persists).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdPipeline {
    pub id: i64,
    pub name: String,
    pub app_id: i64,
    pub environment_id: i64,
    /// Upstream CI pipeline, absent for external-CI pipelines
    pub ci_pipeline_id: Option<i64>,
    pub trigger_type: TriggerType,
    pub run_pre_stage_in_env: bool,
    pub run_post_stage_in_env: bool,
    /// Legacy single-YAML pre stage script
    #[serde(default)]
    pub pre_stage_config: String,
    /// Legacy single-YAML post stage script
    #[serde(default)]
    pub post_stage_config: String,
}

/// Kind of CI pipeline an artifact was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CiPipelineType {
    /// Regular build pipeline
    Ci,
    /// Reuses the build output of a parent CI pipeline
    LinkedCi,
    /// Polling / job pipeline, never builds from source
    CiJob,
    /// Picks up images from a CD pipeline of another app
    LinkedCd,
    /// Images pushed by an external CI system
    External,
}

/// CI pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiPipeline {
    pub id: i64,
    pub app_id: i64,
    pub app_name: String,
    pub pipeline_type: CiPipelineType,
    /// Parent build pipeline for linked pipelines
    pub parent_ci_pipeline: Option<i64>,
    pub is_docker_config_overridden: bool,
    pub materials: Vec<CiPipelineMaterial>,
}

impl CiPipeline {
    pub fn is_linked(&self) -> bool {
        self.pipeline_type == CiPipelineType::LinkedCi && self.parent_ci_pipeline.is_some()
    }

    pub fn is_job(&self) -> bool {
        self.pipeline_type == CiPipelineType::CiJob
    }
}

/// How a CI pipeline material selects the commit to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    SourceTypeBranchFixed,
    SourceTypeBranchRegex,
    SourceTypeTagAny,
    Webhook,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::SourceTypeBranchFixed => "SOURCE_TYPE_BRANCH_FIXED",
            SourceType::SourceTypeBranchRegex => "SOURCE_TYPE_BRANCH_REGEX",
            SourceType::SourceTypeTagAny => "SOURCE_TYPE_TAG_ANY",
            SourceType::Webhook => "WEBHOOK",
        }
    }
}

/// Binding of a git material to a CI pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiPipelineMaterial {
    pub id: i64,
    pub git_material_id: i64,
    pub source_type: SourceType,
    pub source_value: String,
    /// Repository URL of the bound git material
    pub git_url: String,
    /// Whether the bound git material is still active
    pub active: bool,
}

/// Authentication mode for a git provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMode {
    Anonymous,
    UsernamePassword,
    SshKey,
    AccessToken,
}

/// Git provider credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitProvider {
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssh_private_key: String,
    #[serde(default)]
    pub access_token: String,
}

/// A git repository checked out by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitMaterial {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub checkout_path: String,
    pub fetch_submodules: bool,
    pub provider: GitProvider,
}
