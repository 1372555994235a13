//! Trigger Orchestrator
//!
//! Drives a pre or post stage from trigger to dispatch:
//!
//! ```text
//! resolve namespace -> feasibility -> create run (Starting)
//!   -> filter audit -> deployment config -> GitOps repo check
//!   -> vulnerability gate (pre only) -> build or restore request
//!   -> dispatch -> snapshot, notification, history (best effort)
//! ```
//!
//! Once the run exists, every failure marks it `Failed` with the error
//! message and releases any image paths it reserved before the error is
//! returned. From run creation on, the stage runs as its own task: a caller
//! that stops waiting does not stop it short of dispatch or failure. Status
//! changes go through [`RunLifecycle`] only.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use stagehand_core::domain::deployment::{DeploymentConfig, ReleaseMode};
use stagehand_core::domain::environment::Environment;
use stagehand_core::domain::pipeline::{CdPipeline, TriggerType};
use stagehand_core::domain::workflow::{NewWorkflowRun, RunStatus, StageType, Workflow, WorkflowRun};
use stagehand_core::dto::event::{EventType, StageEvent};
use stagehand_core::dto::trigger::{
    ManifestPushTemplate, SYSTEM_USER_ID, TriggerContext, TriggerRequest,
};
use stagehand_core::dto::workflow_request::{DispatchReceipt, WorkflowRequest};
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{CollaboratorResultExt, LookupResultExt, Result, TriggerError};
use crate::integration::{Feasibility, FilterEvaluationAudit};
use crate::service::Collaborators;
use crate::service::lifecycle::RunLifecycle;
use crate::service::request_builder::{BuildInput, RequestBuilder};
use crate::service::side_effects::SideEffects;
use crate::service::snapshot::SnapshotAdapter;

/// What a dispatched stage leaves behind for the caller
struct DispatchedStage {
    workflow: Workflow,
    run: WorkflowRun,
    env: Environment,
    receipt: DispatchReceipt,
    deployment_config: DeploymentConfig,
    triggered_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TriggerOrchestrator {
    config: Arc<OrchestratorConfig>,
    c: Collaborators,
    lifecycle: RunLifecycle,
    builder: Arc<RequestBuilder>,
    snapshots: SnapshotAdapter,
    side_effects: SideEffects,
}

impl TriggerOrchestrator {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        collaborators: Collaborators,
        side_effects: SideEffects,
    ) -> Self {
        Self {
            lifecycle: RunLifecycle::new(collaborators.workflows.clone()),
            builder: Arc::new(RequestBuilder::new(
                config.clone(),
                &collaborators,
                side_effects.clone(),
            )),
            snapshots: SnapshotAdapter::new(collaborators.snapshots.clone()),
            config,
            c: collaborators,
            side_effects,
        }
    }

    /// Background tasks spawned by triggers; flush before shutdown
    pub fn side_effects(&self) -> &SideEffects {
        &self.side_effects
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Triggers the pre-deployment stage
    ///
    /// Returns the manifest push template when the deployment configuration
    /// publishes manifests instead of deploying them.
    pub async fn trigger_pre_stage(
        &self,
        request: TriggerRequest,
    ) -> Result<Option<ManifestPushTemplate>> {
        let stage = self.trigger_stage(&request, StageType::Pre).await?;

        let template = match stage.deployment_config.release_mode {
            ReleaseMode::Publish => Some(self.manifest_push_template(&request, &stage).await?),
            ReleaseMode::Create => None,
        };
        Ok(template)
    }

    /// Triggers the post-deployment stage
    pub async fn trigger_post_stage(&self, request: TriggerRequest) -> Result<()> {
        self.trigger_stage(&request, StageType::Post).await?;
        Ok(())
    }

    /// Starts the deploy stage once the pre stage of `workflow_id` succeeded
    ///
    /// Only automatic pipelines cascade. A workflow that already has a
    /// deploy run is left alone, so repeated calls trigger at most once.
    pub async fn trigger_auto_cd_on_pre_stage_success(
        &self,
        context: TriggerContext,
        pipeline_id: i64,
        artifact_id: i64,
        workflow_id: i64,
    ) -> Result<()> {
        let pipeline = self
            .c
            .pipelines
            .find_cd_pipeline(pipeline_id)
            .await
            .found("cd pipeline", pipeline_id)?;
        if pipeline.trigger_type != TriggerType::Automatic {
            debug!(pipeline_id, "manual pipeline, not cascading to deploy");
            return Ok(());
        }

        let artifact = self
            .c
            .artifacts
            .find_artifact(artifact_id)
            .await
            .found("artifact", artifact_id)?;
        let workflow = self
            .c
            .workflows
            .find_workflow(workflow_id)
            .await
            .found("workflow", workflow_id)?;

        if self.deployment_triggered_already(workflow.id).await {
            warn!(
                pipeline_id,
                artifact_id, workflow_id, "deployment already triggered, ignoring"
            );
            return Ok(());
        }

        info!(pipeline_id, artifact_id, workflow_id, "triggering automatic deployment");
        self.c
            .deployments
            .trigger_automatic_deployment(TriggerRequest {
                pipeline,
                artifact,
                workflow: Some(workflow),
                triggered_by: SYSTEM_USER_ID,
                is_retrigger: false,
                ref_runner_id: None,
                context,
            })
            .await
            .collaborator("failed to trigger automatic deployment")
    }

    pub async fn get_run(&self, runner_id: i64) -> Result<WorkflowRun> {
        self.c
            .workflows
            .find_run(runner_id)
            .await
            .found("workflow run", runner_id)
    }

    /// Applies a status reported by the workflow execution service
    ///
    /// Runs ending in `Failed` or `Cancelled` give up their image path
    /// reservations; terminal states are announced in the background.
    pub async fn update_run_status(
        &self,
        runner_id: i64,
        status: RunStatus,
        message: &str,
    ) -> Result<WorkflowRun> {
        let mut run = self.get_run(runner_id).await?;
        self.lifecycle.transition(&mut run, status, message).await?;

        if matches!(status, RunStatus::Failed | RunStatus::Cancelled) {
            self.release_reservations(&run).await;
        }

        let event_type = match status {
            RunStatus::Succeeded => Some(EventType::Success),
            RunStatus::Failed => Some(EventType::Fail),
            _ => None,
        };
        if let Some(event_type) = event_type {
            match self.pipeline_of(&run).await {
                Ok(pipeline) => self.notify(event_type, &pipeline, &run),
                Err(e) => warn!(runner_id, "skipping stage notification: {}", e),
            }
        }

        Ok(run)
    }

    // =========================================================================
    // Stage lifecycle
    // =========================================================================

    async fn trigger_stage(
        &self,
        request: &TriggerRequest,
        stage: StageType,
    ) -> Result<DispatchedStage> {
        let triggered_at = Utc::now();
        let pipeline = &request.pipeline;

        let (env, namespace) = self.resolve_namespace(pipeline, stage).await?;

        let audit = match self
            .c
            .feasibility
            .evaluate(request, &env, stage)
            .await
            .collaborator("feasibility evaluation failed")?
        {
            Feasibility::Allowed { audit } => audit,
            Feasibility::Blocked { reason } => {
                info!(pipeline_id = pipeline.id, %stage, %reason, "trigger blocked");
                return Err(TriggerError::Blocked(reason));
            }
        };

        let workflow = self.ensure_workflow(request, triggered_at).await?;
        let mut run = self
            .lifecycle
            .start(NewWorkflowRun {
                workflow_id: workflow.id,
                name: pipeline.name.clone(),
                stage_type: stage,
                started_on: triggered_at,
                triggered_by: request.triggered_by,
                namespace,
                executor_type: self.config.executor_type,
                blob_storage_enabled: self.config.blob_storage_enabled,
                log_location: format!(
                    "{}/{}{}-{}/main.log",
                    self.config.build_logs_key_prefix, workflow.id, stage, pipeline.name
                ),
                reference_id: request.context.reference_id,
                ref_runner_id: request.ref_runner_id,
            })
            .await?;

        // Detached from the caller from here on
        let this = self.clone();
        let task_request = request.clone();
        let task_env = env.clone();
        let task_workflow = workflow.clone();
        let stage_task = tokio::spawn(async move {
            let result = this
                .run_stage(&task_request, &task_env, &task_workflow, &mut run, audit)
                .await;
            match &result {
                Ok(_) => this.record_trigger(&task_request.pipeline, &run, triggered_at),
                Err(e) => {
                    error!(
                        runner_id = run.id,
                        pipeline_id = task_request.pipeline.id,
                        %stage,
                        "stage trigger failed: {}",
                        e
                    );
                    this.abort(&mut run, e).await;
                }
            }
            (run, result)
        });

        let (run, result) = match stage_task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                return Err(TriggerError::Dispatch(format!("stage task cancelled: {e}")));
            }
        };
        let (receipt, deployment_config) = result?;
        Ok(DispatchedStage {
            workflow,
            run,
            env,
            receipt,
            deployment_config,
            triggered_at,
        })
    }

    /// Everything between run creation and dispatch
    async fn run_stage(
        &self,
        request: &TriggerRequest,
        env: &Environment,
        workflow: &Workflow,
        run: &mut WorkflowRun,
        audit: Option<FilterEvaluationAudit>,
    ) -> Result<(DispatchReceipt, DeploymentConfig)> {
        let pipeline = &request.pipeline;
        let stage = run.stage_type;

        let feasibility = self.c.feasibility.clone();
        let bypass_request = request.clone();
        let runner_id = run.id;
        self.side_effects
            .spawn("deployment-window-audit", async move {
                feasibility
                    .record_deployment_window_bypass(&bypass_request, runner_id)
                    .await
            });

        if let Some(audit) = audit {
            self.c
                .feasibility
                .link_filter_audit(&audit, run.id)
                .await
                .collaborator("failed to link filter evaluation audit")?;
        }

        let deployment_config = self
            .c
            .deployment_configs
            .get_or_migrate(pipeline.app_id, pipeline.environment_id)
            .await
            .collaborator("failed to load deployment config")?;

        if deployment_config.requires_custom_repo_validation() {
            let problem = self
                .c
                .deployment_configs
                .validate_custom_repo(&deployment_config)
                .await
                .collaborator("failed to validate GitOps repository")?;
            if let Some(problem) = problem {
                return Err(TriggerError::Blocked(problem));
            }
        }

        if stage == StageType::Pre {
            self.check_vulnerability(pipeline, &request.artifact.image_digest)
                .await?;
        }

        let workflow_request = self.prepare_request(request, env, workflow, run).await?;

        let receipt = self
            .c
            .dispatcher
            .dispatch(&workflow_request, request.context.reference_id)
            .await
            .map_err(|e| TriggerError::Dispatch(format!("{e:#}")))?;
        info!(
            runner_id = run.id,
            workflow_name = %receipt.workflow_name,
            %stage,
            "stage workflow dispatched"
        );

        let snapshots = self.snapshots.clone();
        self.side_effects.spawn("request-snapshot", async move {
            snapshots
                .save(runner_id, &workflow_request)
                .await
                .map_err(anyhow::Error::from)
        });

        Ok((receipt, deployment_config))
    }

    /// Builds a new request, or restores the referenced run's request on retrigger
    async fn prepare_request(
        &self,
        request: &TriggerRequest,
        env: &Environment,
        workflow: &Workflow,
        run: &mut WorkflowRun,
    ) -> Result<WorkflowRequest> {
        if request.is_retrigger {
            let ref_runner_id = request.ref_runner_id.ok_or_else(|| {
                TriggerError::InvalidData("retrigger without a reference run".to_string())
            })?;
            debug!(runner_id = run.id, ref_runner_id, "restoring request snapshot");
            return self.snapshots.load_for_retrigger(ref_runner_id, run).await;
        }

        let built = self
            .builder
            .build(BuildInput {
                run,
                workflow,
                pipeline: &request.pipeline,
                env,
                triggered_by: request.triggered_by,
            })
            .await?;
        if !built.reservation_ids.is_empty() {
            self.lifecycle
                .attach_reservations(run, built.reservation_ids)
                .await?;
        }
        Ok(built.request)
    }

    async fn check_vulnerability(&self, pipeline: &CdPipeline, digest: &str) -> Result<()> {
        let vulnerable = self
            .c
            .image_scan
            .is_vulnerable(pipeline, digest)
            .await
            .collaborator("failed to get artifact vulnerability status")?;
        if vulnerable {
            return Err(TriggerError::Vulnerable {
                digest: digest.to_string(),
            });
        }
        Ok(())
    }

    /// Fails the run and frees its reservations after an error
    async fn abort(&self, run: &mut WorkflowRun, err: &TriggerError) {
        if !run.status().is_terminal() {
            self.lifecycle.fail(run, &err.run_message()).await;
        }
        self.release_reservations(run).await;
    }

    async fn release_reservations(&self, run: &WorkflowRun) {
        if run.image_path_reservation_ids.is_empty() {
            return;
        }
        if let Err(e) = self
            .c
            .reservations
            .release(&run.image_path_reservation_ids)
            .await
        {
            error!(runner_id = run.id, "failed to release image path reservations: {}", e);
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Target environment and the namespace the stage runs in
    async fn resolve_namespace(
        &self,
        pipeline: &CdPipeline,
        stage: StageType,
    ) -> Result<(Environment, String)> {
        let env = self
            .c
            .apps
            .find_environment(pipeline.environment_id)
            .await
            .found("environment", pipeline.environment_id)?;

        let run_in_env = match stage {
            StageType::Pre => pipeline.run_pre_stage_in_env,
            StageType::Post => pipeline.run_post_stage_in_env,
            StageType::Deploy => false,
        };
        let namespace = if run_in_env {
            env.namespace.clone()
        } else {
            self.config.default_namespace.clone()
        };
        Ok((env, namespace))
    }

    async fn ensure_workflow(
        &self,
        request: &TriggerRequest,
        triggered_at: DateTime<Utc>,
    ) -> Result<Workflow> {
        if let Some(workflow) = &request.workflow {
            return Ok(workflow.clone());
        }
        let workflow = self
            .c
            .workflows
            .create_workflow(request.artifact.id, request.pipeline.id, triggered_at)
            .await?;
        debug!(workflow_id = workflow.id, pipeline_id = request.pipeline.id, "workflow created");
        Ok(workflow)
    }

    async fn deployment_triggered_already(&self, workflow_id: i64) -> bool {
        match self
            .c
            .workflows
            .find_run_by_workflow_and_stage(workflow_id, StageType::Deploy)
            .await
        {
            Ok(run) => run.is_some_and(|run| run.workflow_id == workflow_id),
            Err(e) => {
                error!(workflow_id, "failed to look up deploy run: {}", e);
                false
            }
        }
    }

    async fn pipeline_of(&self, run: &WorkflowRun) -> Result<CdPipeline> {
        let workflow = self
            .c
            .workflows
            .find_workflow(run.workflow_id)
            .await
            .found("workflow", run.workflow_id)?;
        self.c
            .pipelines
            .find_cd_pipeline(workflow.pipeline_id)
            .await
            .found("cd pipeline", workflow.pipeline_id)
    }

    async fn manifest_push_template(
        &self,
        request: &TriggerRequest,
        stage: &DispatchedStage,
    ) -> Result<ManifestPushTemplate> {
        let pipeline = &request.pipeline;
        let app = self
            .c
            .apps
            .find_app(pipeline.app_id)
            .await
            .found("app", pipeline.app_id)?;

        Ok(ManifestPushTemplate {
            workflow_runner_id: stage.run.id,
            workflow_id: stage.workflow.id,
            app_id: app.id,
            app_name: app.name,
            environment_id: stage.env.id,
            environment_name: stage.env.name.clone(),
            artifact_id: request.artifact.id,
            image: request.artifact.image.clone(),
            helm_package_path: stage.receipt.helm_package_path.clone(),
            repo_url: stage.deployment_config.repo_url.clone(),
            target_revision: stage.deployment_config.target_revision.clone(),
            triggered_by: request.triggered_by,
            triggered_at: stage.triggered_at,
        })
    }

    /// Trigger notification and stage script history, both best effort
    fn record_trigger(
        &self,
        pipeline: &CdPipeline,
        run: &WorkflowRun,
        triggered_at: DateTime<Utc>,
    ) {
        self.notify(EventType::Trigger, pipeline, run);

        let history = self.c.history.clone();
        let pipeline = pipeline.clone();
        let stage_type = run.stage_type;
        let triggered_by = run.triggered_by;
        self.side_effects.spawn("stage-script-history", async move {
            history
                .record_stage_script(&pipeline, stage_type, triggered_by, triggered_at)
                .await
        });
    }

    fn notify(&self, event_type: EventType, pipeline: &CdPipeline, run: &WorkflowRun) {
        let event = StageEvent {
            event_type,
            pipeline_id: pipeline.id,
            app_id: pipeline.app_id,
            environment_id: pipeline.environment_id,
            workflow_id: run.workflow_id,
            workflow_runner_id: run.id,
            stage: run.stage_type,
            triggered_by: run.triggered_by,
            created_at: Utc::now(),
        };
        let events = self.c.events.clone();
        self.side_effects
            .spawn("stage-notification", async move { events.publish(&event).await });
    }
}
