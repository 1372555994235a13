//! Workflow Request Builder
//!
//! Assembles the [`WorkflowRequest`] for a freshly created pre/post run:
//! git checkout details, steps, runtime variables, registry credentials,
//! storage targets and, for image-copy plugins, reserved destination paths.
//! The result is immutable once returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use stagehand_core::domain::artifact::{
    CiMaterialInfo, format_commit_time, image_tag, replace_tag_with_digest, zero_commit_time,
};
use stagehand_core::domain::environment::Environment;
use stagehand_core::domain::pipeline::{CdPipeline, CiPipeline, SourceType};
use stagehand_core::domain::workflow::{StageType, Workflow, WorkflowRun};
use stagehand_core::dto::workflow_request::{
    ArtifactDto, AzureBlobConfig, CD_WORKFLOW_PIPELINE_TYPE, CiProjectDetails, GcpBlobConfig,
    GitOptions, S3BlobConfig, Scope, SystemMetadata, WorkflowRequest,
};
use tracing::{debug, warn};

use crate::config::{CloudProvider, OrchestratorConfig};
use crate::error::{CollaboratorResultExt, LookupResultExt, Result, TriggerError};
use crate::integration::{AttributeService, DigestPolicyService, UserDirectory};
use crate::repository::{
    AppRepository, ArtifactRepository, GitMaterialRepository, PipelineRepository,
    WorkflowRepository,
};
use crate::service::Collaborators;
use crate::service::credentials::CredentialResolver;
use crate::service::side_effects::SideEffects;
use crate::service::steps::{StageSteps, StepMaterializer};
use crate::service::variables::{VariableAssembler, VariableSources, inject_into_steps};

/// The run a request is built for
pub struct BuildInput<'a> {
    pub run: &'a WorkflowRun,
    pub workflow: &'a Workflow,
    pub pipeline: &'a CdPipeline,
    pub env: &'a Environment,
    pub triggered_by: i32,
}

/// A built request and the image path reservations taken for it
#[derive(Debug)]
pub struct BuiltRequest {
    pub request: WorkflowRequest,
    pub reservation_ids: Vec<i64>,
}

/// Who deployed the pipeline last, surfaced to post stages
#[derive(Debug, Default)]
struct DeployProvenance {
    triggered_at: Option<DateTime<Utc>>,
    triggered_by_email: String,
    release_counter: Option<i64>,
}

pub struct RequestBuilder {
    config: Arc<OrchestratorConfig>,
    pipelines: Arc<dyn PipelineRepository>,
    apps: Arc<dyn AppRepository>,
    artifacts: Arc<dyn ArtifactRepository>,
    git_materials: Arc<dyn GitMaterialRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    users: Arc<dyn UserDirectory>,
    digest_policy: Arc<dyn DigestPolicyService>,
    attributes: Arc<dyn AttributeService>,
    credentials: CredentialResolver,
    variables: VariableAssembler,
    steps: StepMaterializer,
}

impl RequestBuilder {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        collaborators: &Collaborators,
        side_effects: SideEffects,
    ) -> Self {
        let c = collaborators;
        Self {
            config,
            pipelines: c.pipelines.clone(),
            apps: c.apps.clone(),
            artifacts: c.artifacts.clone(),
            git_materials: c.git_materials.clone(),
            workflows: c.workflows.clone(),
            users: c.users.clone(),
            digest_policy: c.digest_policy.clone(),
            attributes: c.attributes.clone(),
            credentials: CredentialResolver::new(c.pipelines.clone(), c.registries.clone()),
            variables: VariableAssembler::new(c.pipelines.clone(), c.apps.clone()),
            steps: StepMaterializer::new(
                c.step_graph.clone(),
                c.custom_tags.clone(),
                c.artifacts.clone(),
                c.registries.clone(),
                c.reservations.clone(),
                side_effects,
            ),
        }
    }

    pub async fn build(&self, input: BuildInput<'_>) -> Result<BuiltRequest> {
        let BuildInput {
            run,
            workflow,
            pipeline,
            env,
            triggered_by,
        } = input;
        let stage = run.stage_type;

        let app = self
            .apps
            .find_app(pipeline.app_id)
            .await
            .found("app", pipeline.app_id)?;

        let artifact = self
            .artifacts
            .find_artifact(workflow.artifact_id)
            .await
            .found("artifact", workflow.artifact_id)?;
        if artifact.is_migration_required() {
            if let Err(e) = self
                .artifacts
                .migrate_to_webhook_data_source(artifact.id)
                .await
            {
                warn!(artifact_id = artifact.id, "unable to migrate deprecated data source: {:#}", e);
            }
        }

        let material_info = artifact.parse_material_info().map_err(|e| {
            TriggerError::InvalidData(format!("material info of artifact {}: {e}", artifact.id))
        })?;

        let ci_pipeline = match pipeline.ci_pipeline_id {
            Some(id) => Some(
                self.pipelines
                    .find_ci_pipeline(id)
                    .await
                    .found("ci pipeline", id)?,
            ),
            None => None,
        };
        let ci_project_details = match &ci_pipeline {
            Some(ci) => self.project_details(ci, &material_info).await?,
            None => Vec::new(),
        };

        let scope = Scope {
            app_id: app.id,
            env_id: env.id,
            cluster_id: env.cluster_id,
            system_metadata: SystemMetadata {
                environment_name: env.name.clone(),
                cluster_name: env.cluster_name.clone().unwrap_or_default(),
                namespace: env.namespace.clone(),
                image: artifact.image.clone(),
                image_tag: image_tag(&artifact.image),
            },
        };

        let steps = self
            .steps
            .materialize(pipeline, stage, &scope, run.id, triggered_by)
            .await?;
        let provenance = match stage {
            StageType::Post => self.deploy_provenance(pipeline.id).await?,
            _ => DeployProvenance::default(),
        };

        let use_digest = self
            .digest_policy
            .use_digest_for_trigger(pipeline.id)
            .await
            .collaborator("failed to load digest policy")?;
        let image = if use_digest {
            replace_tag_with_digest(&artifact.image, &artifact.image_digest)
        } else {
            artifact.image.clone()
        };

        let host_url = self
            .attributes
            .host_url()
            .await
            .collaborator("failed to load host url")?
            .ok_or_else(|| TriggerError::Configuration("host url is not configured".to_string()))?;

        let (stage_yaml, mut step_definitions, ref_plugins) = match steps {
            StageSteps::Graph(data) => (String::new(), data.steps, data.ref_plugins),
            StageSteps::Legacy { stage_yaml } => (stage_yaml, Vec::new(), Vec::new()),
        };

        let mut request = WorkflowRequest {
            workflow_id: workflow.id,
            workflow_runner_id: run.id,
            workflow_name_prefix: WorkflowRequest::name_prefix(run.id, &run.name),
            workflow_prefix_for_log: format!("{}{}-{}", workflow.id, stage, run.name),
            app_id: pipeline.app_id,
            environment_id: pipeline.environment_id,
            cd_pipeline_id: workflow.pipeline_id,
            stage_type: stage,
            pipeline_type: CD_WORKFLOW_PIPELINE_TYPE.to_string(),
            triggered_by,
            cd_image: self.config.default_image.clone(),
            namespace: run.namespace.clone(),
            active_deadline_seconds: self.config.default_timeout_secs,
            workflow_executor: run.executor_type,
            orchestrator_host: self.config.orchestrator_host.clone(),
            orchestrator_token: self.config.orchestrator_token.clone(),
            host_url,
            default_address_pool_base_cidr: self.config.default_address_pool_base_cidr.clone(),
            default_address_pool_size: self.config.default_address_pool_size,
            ci_project_details,
            artifact: ArtifactDto::from_artifact(&artifact, image),
            ci_pipeline_type: None,
            registry: None,
            stage_yaml,
            pre_post_deploy_steps: Vec::new(),
            ref_plugins,
            scope,
            system_environment_variables: Default::default(),
            deployment_trigger_time: provenance.triggered_at,
            deployment_triggered_by: provenance.triggered_by_email,
            deployment_release_counter: provenance.release_counter,
            registry_destination_image_map: Default::default(),
            registry_credential_map: Default::default(),
            docker_image_tag: String::new(),
            plugin_artifact_stage: None,
            cloud_provider: self.config.blob_storage_provider.as_str().to_string(),
            blob_storage_configured: run.blob_storage_enabled,
            cd_cache_region: String::new(),
            cd_cache_location: String::new(),
            artifact_location: String::new(),
            ci_artifact_bucket: String::new(),
            ci_artifact_file_name: String::new(),
            blob_storage_s3_config: None,
            gcp_blob_config: None,
            azure_blob_config: None,
            pipeline: Some(pipeline.clone()),
            env: Some(env.clone()),
        };

        let ci_workflow = self
            .git_materials
            .find_last_ci_workflow_for_artifact(artifact.id)
            .await
            .collaborator("failed to load ci workflow")?;

        let (app_name, external_ci) = match ci_pipeline {
            Some(ci) => {
                if ci_workflow.is_none() {
                    return Err(TriggerError::not_found("ci workflow of artifact", artifact.id));
                }
                let app_name = ci.app_name.clone();
                let source = self.credentials.source_ci_pipeline(ci).await?;
                request.ci_pipeline_type = Some(source.pipeline_type);
                request.registry = Some(
                    self.credentials
                        .resolve(Some(&source), &artifact, pipeline.app_id)
                        .await?,
                );
                (app_name, false)
            }
            None => {
                request.registry = Some(
                    self.credentials
                        .resolve(None, &artifact, pipeline.app_id)
                        .await?,
                );
                (app.name.clone(), true)
            }
        };

        let variables = self
            .variables
            .assemble(VariableSources {
                pipeline,
                env,
                app_name: &app_name,
                ci_workflow: ci_workflow.as_ref(),
                external_ci,
            })
            .await?;
        inject_into_steps(&mut step_definitions, &variables);
        request.pre_post_deploy_steps = step_definitions;
        request.system_environment_variables = variables.system;

        self.apply_blob_storage(&mut request)?;

        let reservation_ids = self
            .steps
            .apply_image_copy(&mut request, pipeline.id, stage, &artifact)
            .await?;

        debug!(
            runner_id = run.id,
            workflow_id = workflow.id,
            %stage,
            "workflow request built"
        );
        Ok(BuiltRequest {
            request,
            reservation_ids,
        })
    }

    /// Checkout instructions for the active materials of `ci`
    async fn project_details(
        &self,
        ci: &CiPipeline,
        material_info: &[CiMaterialInfo],
    ) -> Result<Vec<CiProjectDetails>> {
        let mut details = Vec::new();

        for material in ci.materials.iter().filter(|m| m.active) {
            let current = material_info
                .iter()
                .find(|info| info.material.git_configuration.url == material.git_url);
            let git_material = self
                .git_materials
                .find_git_material(material.git_material_id)
                .await
                .found("git material", material.git_material_id)?;
            let provider = &git_material.provider;

            let mut detail = CiProjectDetails {
                git_repository: material.git_url.clone(),
                material_name: git_material.name.clone(),
                checkout_path: git_material.checkout_path.clone(),
                fetch_submodules: git_material.fetch_submodules,
                commit_hash: String::new(),
                git_tag: String::new(),
                commit_time: String::new(),
                source_type: material.source_type,
                source_value: material.source_value.clone(),
                author: String::new(),
                message: String::new(),
                git_options: GitOptions {
                    user_name: provider.user_name.clone(),
                    password: provider.password.clone(),
                    ssh_private_key: provider.ssh_private_key.clone(),
                    access_token: provider.access_token.clone(),
                    auth_mode: provider.auth_mode,
                },
                webhook_data: None,
            };

            match current.and_then(|info| info.modifications.first()) {
                Some(modification) => {
                    let commit_time = modification.commit_time().map_err(|e| {
                        TriggerError::InvalidData(format!(
                            "commit time {:?} of {}: {e}",
                            modification.modified_time, material.git_url
                        ))
                    })?;
                    detail.commit_hash = modification.revision.clone();
                    detail.author = modification.author.clone();
                    detail.git_tag = modification.tag.clone();
                    detail.message = modification.message.clone();
                    detail.commit_time = format_commit_time(commit_time);
                    if material.source_type == SourceType::Webhook {
                        detail.webhook_data = modification.webhook_data.clone();
                    }
                }
                None if ci.is_job() => detail.commit_time = zero_commit_time(),
                None => return Err(TriggerError::ModificationsNotFound { pipeline_id: ci.id }),
            }

            details.push(detail);
        }

        Ok(details)
    }

    async fn deploy_provenance(&self, pipeline_id: i64) -> Result<DeployProvenance> {
        let Some(deploy_run) = self
            .workflows
            .find_latest_run_by_pipeline_and_stage(pipeline_id, StageType::Deploy)
            .await?
        else {
            debug!(pipeline_id, "pipeline has not been deployed yet");
            return Ok(DeployProvenance::default());
        };

        let triggered_by_email = self
            .users
            .active_email(deploy_run.triggered_by)
            .await
            .collaborator("failed to load deploying user")?
            .unwrap_or_default();
        let release_counter = self
            .pipelines
            .find_release_counter(pipeline_id)
            .await
            .collaborator("failed to load release counter")?
            .filter(|counter| *counter > 0);

        Ok(DeployProvenance {
            triggered_at: Some(deploy_run.started_on),
            triggered_by_email,
            release_counter,
        })
    }

    fn apply_blob_storage(&self, request: &mut WorkflowRequest) -> Result<()> {
        let config = &self.config;
        let location =
            config.artifact_location(request.workflow_id, request.workflow_runner_id);

        match &config.blob_storage_provider {
            CloudProvider::S3 => {
                let bucket = config.build_logs_bucket.clone();
                let region = config.cd_logs_bucket_region.clone();
                let versioned = config.s3.bucket_versioned;
                request.cd_cache_region = region.clone();
                // stage runs upload no cache
                request.cd_cache_location = String::new();
                request.artifact_location = format!("s3://{bucket}/{location}");
                request.ci_artifact_bucket = bucket.clone();
                request.ci_artifact_file_name = location;
                request.blob_storage_s3_config = Some(S3BlobConfig {
                    access_key: config.s3.access_key.clone(),
                    passkey: config.s3.secret_key.clone(),
                    endpoint_url: config.s3.endpoint.clone(),
                    is_insecure: config.s3.endpoint_insecure,
                    ci_cache_bucket_name: String::new(),
                    ci_cache_region: region.clone(),
                    ci_cache_bucket_versioning: versioned,
                    ci_artifact_bucket_name: bucket.clone(),
                    ci_artifact_region: region.clone(),
                    ci_artifact_bucket_versioning: versioned,
                    ci_log_bucket_name: bucket,
                    ci_log_region: region,
                    ci_log_bucket_versioning: versioned,
                });
            }
            CloudProvider::Gcp => {
                request.gcp_blob_config = Some(GcpBlobConfig {
                    credential_file_json_data: config.gcp_credentials_json.clone(),
                    artifact_bucket_name: config.build_logs_bucket.clone(),
                    log_bucket_name: config.build_logs_bucket.clone(),
                });
                request.artifact_location = location.clone();
                request.ci_artifact_file_name = location;
            }
            CloudProvider::Azure => {
                let azure = &config.azure;
                request.azure_blob_config = Some(AzureBlobConfig {
                    enabled: true,
                    account_name: azure.account_name.clone(),
                    account_key: azure.account_key.clone(),
                    blob_container_ci_cache: azure.container_ci_cache.clone(),
                    blob_container_ci_log: azure.container_ci_log.clone(),
                    blob_container_artifact: azure.container_ci_log.clone(),
                });
                // logs are shipped through the S3-compatible gateway
                request.blob_storage_s3_config = Some(S3BlobConfig {
                    access_key: azure.account_name.clone(),
                    endpoint_url: azure.gateway_url.clone(),
                    is_insecure: azure.gateway_insecure,
                    ci_log_bucket_name: azure.container_ci_log.clone(),
                    ..S3BlobConfig::default()
                });
                request.artifact_location = location.clone();
                request.ci_artifact_file_name = location;
            }
            CloudProvider::Other(name) => {
                if config.blob_storage_enabled {
                    return Err(TriggerError::Configuration(format!(
                        "blob storage {name} not supported"
                    )));
                }
            }
        }

        Ok(())
    }
}
