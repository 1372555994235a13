//! Workflow request DTOs
//!
//! A [`WorkflowRequest`] is the self-contained instruction set sent to the
//! remote workflow runner for one stage run. It is built once per trigger
//! (or restored from an audit snapshot for retriggers) and never mutated
//! after dispatch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::artifact::{ArtifactDataSource, PipelineArtifact, WebhookData};
use crate::domain::environment::Environment;
use crate::domain::pipeline::{AuthMode, CdPipeline, CiPipelineType, SourceType};
use crate::domain::registry::RegistryConfig;
use crate::domain::step::{RefPluginObject, StepDefinition};
use crate::domain::workflow::{ExecutorType, StageType};

/// Pipeline type reported for pre/post CD workflows
pub const CD_WORKFLOW_PIPELINE_TYPE: &str = "CD";

/// Fully assembled request for one stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    // Identity
    pub workflow_id: i64,
    pub workflow_runner_id: i64,
    pub workflow_name_prefix: String,
    pub workflow_prefix_for_log: String,
    pub app_id: i64,
    pub environment_id: i64,
    pub cd_pipeline_id: i64,
    pub stage_type: StageType,
    pub pipeline_type: String,
    pub triggered_by: i32,

    // Execution
    pub cd_image: String,
    pub namespace: String,
    pub active_deadline_seconds: u64,
    pub workflow_executor: ExecutorType,
    pub orchestrator_host: String,
    pub orchestrator_token: String,
    pub host_url: String,
    pub default_address_pool_base_cidr: String,
    pub default_address_pool_size: u32,

    // Sources
    pub ci_project_details: Vec<CiProjectDetails>,
    pub artifact: ArtifactDto,
    pub ci_pipeline_type: Option<CiPipelineType>,
    pub registry: Option<RegistryConfig>,

    // Steps
    /// Legacy stage script, set only when no step graph is configured
    pub stage_yaml: String,
    pub pre_post_deploy_steps: Vec<StepDefinition>,
    pub ref_plugins: Vec<RefPluginObject>,
    pub scope: Scope,
    pub system_environment_variables: BTreeMap<String, String>,

    // Deploy-stage provenance (post stages)
    pub deployment_trigger_time: Option<DateTime<Utc>>,
    pub deployment_triggered_by: String,
    pub deployment_release_counter: Option<i64>,

    // Image copy plugin
    pub registry_destination_image_map: BTreeMap<String, Vec<String>>,
    pub registry_credential_map: BTreeMap<String, RegistryConfig>,
    pub docker_image_tag: String,
    pub plugin_artifact_stage: Option<ArtifactDataSource>,

    // Blob storage
    pub cloud_provider: String,
    pub blob_storage_configured: bool,
    pub cd_cache_region: String,
    pub cd_cache_location: String,
    pub artifact_location: String,
    pub ci_artifact_bucket: String,
    pub ci_artifact_file_name: String,
    pub blob_storage_s3_config: Option<S3BlobConfig>,
    pub gcp_blob_config: Option<GcpBlobConfig>,
    pub azure_blob_config: Option<AzureBlobConfig>,

    pub pipeline: Option<CdPipeline>,
    pub env: Option<Environment>,
}

impl WorkflowRequest {
    /// Name prefix of the workflow spawned for a run
    pub fn name_prefix(runner_id: i64, runner_name: &str) -> String {
        format!("{runner_id}-{runner_name}")
    }

    /// Registry the source artifact was resolved from
    pub fn registry_id(&self) -> Option<&str> {
        self.registry.as_ref().map(|r| r.registry_id.as_str())
    }
}

/// Artifact as seen by the remote runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDto {
    pub id: i64,
    pub pipeline_id: Option<i64>,
    /// Outbound image reference, pinned to the digest when policy requires it
    pub image: String,
    pub image_digest: String,
    pub material_info: String,
    pub data_source: ArtifactDataSource,
    pub workflow_id: Option<i64>,
}

impl ArtifactDto {
    pub fn from_artifact(artifact: &PipelineArtifact, image: String) -> Self {
        Self {
            id: artifact.id,
            pipeline_id: artifact.pipeline_id,
            image,
            image_digest: artifact.image_digest.clone(),
            material_info: artifact.material_info.clone(),
            data_source: artifact.data_source,
            workflow_id: artifact.workflow_id,
        }
    }
}

/// Git checkout instructions for one material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiProjectDetails {
    pub git_repository: String,
    pub material_name: String,
    pub checkout_path: String,
    pub fetch_submodules: bool,
    pub commit_hash: String,
    pub git_tag: String,
    pub commit_time: String,
    pub source_type: SourceType,
    pub source_value: String,
    pub author: String,
    pub message: String,
    pub git_options: GitOptions,
    pub webhook_data: Option<WebhookData>,
}

/// Git authentication forwarded to the runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOptions {
    pub user_name: String,
    pub password: String,
    pub ssh_private_key: String,
    pub access_token: String,
    pub auth_mode: AuthMode,
}

/// Context used to resolve scoped variables and plugin values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub app_id: i64,
    pub env_id: i64,
    pub cluster_id: i64,
    pub system_metadata: SystemMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    pub environment_name: String,
    pub cluster_name: String,
    pub namespace: String,
    pub image: String,
    pub image_tag: String,
}

/// S3 (or S3-compatible gateway) storage targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3BlobConfig {
    pub access_key: String,
    pub passkey: String,
    pub endpoint_url: String,
    pub is_insecure: bool,
    pub ci_cache_bucket_name: String,
    pub ci_cache_region: String,
    pub ci_cache_bucket_versioning: bool,
    pub ci_artifact_bucket_name: String,
    pub ci_artifact_region: String,
    pub ci_artifact_bucket_versioning: bool,
    pub ci_log_bucket_name: String,
    pub ci_log_region: String,
    pub ci_log_bucket_versioning: bool,
}

/// Google Cloud Storage targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpBlobConfig {
    pub credential_file_json_data: String,
    pub artifact_bucket_name: String,
    pub log_bucket_name: String,
}

/// Azure blob storage targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureBlobConfig {
    pub enabled: bool,
    pub account_name: String,
    pub account_key: String,
    pub blob_container_ci_cache: String,
    pub blob_container_ci_log: String,
    pub blob_container_artifact: String,
}

/// Reply of the workflow execution service to a submitted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReceipt {
    /// Name of the workflow created by the execution service
    pub workflow_name: String,
    /// Location of the packaged chart, for manifest-publishing pipelines
    pub helm_package_path: Option<String>,
}
