//! In-memory collaborators, fixtures and a wired-up harness for unit tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagehand_core::domain::artifact::PipelineArtifact;
use stagehand_core::domain::custom_tag::{CustomTag, CustomTagEntity};
use stagehand_core::domain::deployment::{DeploymentAppType, DeploymentConfig, ReleaseMode};
use stagehand_core::domain::environment::{App, AppLabel, Environment};
use stagehand_core::domain::pipeline::{CdPipeline, CiPipeline, GitMaterial};
use stagehand_core::domain::registry::RegistryConfig;
use stagehand_core::domain::workflow::{StageType, Workflow, WorkflowRun};
use stagehand_core::dto::event::StageEvent;
use stagehand_core::dto::trigger::TriggerRequest;
use stagehand_core::dto::workflow_request::{DispatchReceipt, Scope, WorkflowRequest};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::integration::{
    AttributeService, CustomTagService, DeploymentConfigService, DeploymentTrigger,
    DigestPolicyService, Dispatcher, EventPublisher, Feasibility, FeasibilityService,
    FilterEvaluationAudit, HistoryService, ImageScanService, StageStepData, StepGraphService,
    UserDirectory,
};
use crate::repository::{
    AppRepository, ArtifactRepository, CiWorkflow, GitMaterialRepository,
    InMemoryReservationRepository, PipelineRepository, RegistryRepository, SnapshotRepository,
    WorkflowRepository,
};
use crate::service::{Collaborators, RunLifecycle, SideEffects, TriggerOrchestrator};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Upstream entities
// =============================================================================

#[derive(Default)]
struct StoreState {
    cd_pipelines: HashMap<i64, CdPipeline>,
    ci_pipelines: HashMap<i64, CiPipeline>,
    children: HashMap<i64, Vec<CdPipeline>>,
    release_counters: HashMap<i64, i64>,
    apps: HashMap<i64, App>,
    labels: HashMap<i64, Vec<AppLabel>>,
    environments: HashMap<i64, Environment>,
    artifacts: HashMap<i64, PipelineArtifact>,
    migrated: Vec<i64>,
    fail_migrations: bool,
    existing_images: HashSet<String>,
    git_materials: HashMap<i64, GitMaterial>,
    ci_workflows: HashMap<i64, CiWorkflow>,
    registries: HashMap<String, RegistryConfig>,
    applied_configs: HashMap<(i64, bool), RegistryConfig>,
    base_configs: HashMap<i64, RegistryConfig>,
}

/// Pipelines, apps, artifacts, git materials and registries in one store
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn add_cd_pipeline(&self, pipeline: CdPipeline) {
        lock(&self.state).cd_pipelines.insert(pipeline.id, pipeline);
    }

    pub fn add_ci_pipeline(&self, pipeline: CiPipeline) {
        lock(&self.state).ci_pipelines.insert(pipeline.id, pipeline);
    }

    pub fn add_child_cd_pipeline(&self, parent_id: i64, child: CdPipeline) {
        lock(&self.state)
            .children
            .entry(parent_id)
            .or_default()
            .push(child);
    }

    pub fn set_release_counter(&self, pipeline_id: i64, counter: i64) {
        lock(&self.state)
            .release_counters
            .insert(pipeline_id, counter);
    }

    pub fn add_app(&self, app: App) {
        lock(&self.state).apps.insert(app.id, app);
    }

    pub fn add_app_label(&self, app_id: i64, label: AppLabel) {
        lock(&self.state).labels.entry(app_id).or_default().push(label);
    }

    pub fn add_environment(&self, env: Environment) {
        lock(&self.state).environments.insert(env.id, env);
    }

    pub fn add_artifact(&self, artifact: PipelineArtifact) {
        lock(&self.state).artifacts.insert(artifact.id, artifact);
    }

    /// Artifacts whose legacy data source was migrated
    pub fn migrated_artifacts(&self) -> Vec<i64> {
        lock(&self.state).migrated.clone()
    }

    /// Data source migrations are attempted but rejected
    pub fn fail_migrations(&self) {
        lock(&self.state).fail_migrations = true;
    }

    pub fn add_existing_image(&self, image_path: &str) {
        lock(&self.state)
            .existing_images
            .insert(image_path.to_string());
    }

    pub fn add_git_material(&self, material: GitMaterial) {
        lock(&self.state).git_materials.insert(material.id, material);
    }

    pub fn set_ci_workflow(&self, artifact_id: i64, ci_workflow: CiWorkflow) {
        lock(&self.state).ci_workflows.insert(artifact_id, ci_workflow);
    }

    pub fn clear_ci_workflows(&self) {
        lock(&self.state).ci_workflows.clear();
    }

    pub fn add_registry(&self, registry: RegistryConfig) {
        lock(&self.state)
            .registries
            .insert(registry.registry_id.clone(), registry);
    }

    pub fn add_applied_config(&self, ci_pipeline_id: i64, overridden: bool, registry: RegistryConfig) {
        lock(&self.state)
            .applied_configs
            .insert((ci_pipeline_id, overridden), registry);
    }

    pub fn add_base_config(&self, app_id: i64, registry: RegistryConfig) {
        lock(&self.state).base_configs.insert(app_id, registry);
    }
}

#[async_trait]
impl PipelineRepository for FakeStore {
    async fn find_cd_pipeline(&self, id: i64) -> Result<Option<CdPipeline>> {
        Ok(lock(&self.state).cd_pipelines.get(&id).cloned())
    }

    async fn find_ci_pipeline(&self, id: i64) -> Result<Option<CiPipeline>> {
        Ok(lock(&self.state).ci_pipelines.get(&id).cloned())
    }

    async fn find_child_cd_pipelines(&self, pipeline_id: i64) -> Result<Vec<CdPipeline>> {
        Ok(lock(&self.state)
            .children
            .get(&pipeline_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_release_counter(&self, pipeline_id: i64) -> Result<Option<i64>> {
        Ok(lock(&self.state).release_counters.get(&pipeline_id).copied())
    }
}

#[async_trait]
impl AppRepository for FakeStore {
    async fn find_app(&self, id: i64) -> Result<Option<App>> {
        Ok(lock(&self.state).apps.get(&id).cloned())
    }

    async fn find_app_labels(&self, app_id: i64) -> Result<Vec<AppLabel>> {
        Ok(lock(&self.state)
            .labels
            .get(&app_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_environment(&self, id: i64) -> Result<Option<Environment>> {
        Ok(lock(&self.state).environments.get(&id).cloned())
    }
}

#[async_trait]
impl ArtifactRepository for FakeStore {
    async fn find_artifact(&self, id: i64) -> Result<Option<PipelineArtifact>> {
        Ok(lock(&self.state).artifacts.get(&id).cloned())
    }

    async fn migrate_to_webhook_data_source(&self, artifact_id: i64) -> Result<()> {
        let mut state = lock(&self.state);
        state.migrated.push(artifact_id);
        if state.fail_migrations {
            bail!("artifact {artifact_id} is locked");
        }
        Ok(())
    }

    async fn find_existing_images(&self, image_paths: &[String]) -> Result<Vec<String>> {
        let state = lock(&self.state);
        Ok(image_paths
            .iter()
            .filter(|path| state.existing_images.contains(*path))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl GitMaterialRepository for FakeStore {
    async fn find_git_material(&self, id: i64) -> Result<Option<GitMaterial>> {
        Ok(lock(&self.state).git_materials.get(&id).cloned())
    }

    async fn find_last_ci_workflow_for_artifact(
        &self,
        artifact_id: i64,
    ) -> Result<Option<CiWorkflow>> {
        Ok(lock(&self.state).ci_workflows.get(&artifact_id).cloned())
    }
}

#[async_trait]
impl RegistryRepository for FakeStore {
    async fn find_registry(&self, registry_id: &str) -> Result<Option<RegistryConfig>> {
        Ok(lock(&self.state).registries.get(registry_id).cloned())
    }

    async fn find_applied_config(
        &self,
        ci_pipeline_id: i64,
        _app_id: i64,
        overridden: bool,
    ) -> Result<Option<RegistryConfig>> {
        Ok(lock(&self.state)
            .applied_configs
            .get(&(ci_pipeline_id, overridden))
            .cloned())
    }

    async fn find_base_config(&self, app_id: i64) -> Result<Option<RegistryConfig>> {
        Ok(lock(&self.state).base_configs.get(&app_id).cloned())
    }
}

// =============================================================================
// Owned records
// =============================================================================

#[derive(Default)]
struct WorkflowState {
    next_workflow_id: i64,
    next_run_id: i64,
    workflows: BTreeMap<i64, Workflow>,
    runs: BTreeMap<i64, WorkflowRun>,
}

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    state: Mutex<WorkflowState>,
    failing_stage_lookups: AtomicBool,
}

impl InMemoryWorkflowRepository {
    /// Makes run lookups by workflow and stage return a database error
    pub fn fail_stage_lookups(&self) {
        self.failing_stage_lookups.store(true, Ordering::SeqCst);
    }

    pub fn runs(&self) -> Vec<WorkflowRun> {
        lock(&self.state).runs.values().cloned().collect()
    }

    pub fn workflows(&self) -> Vec<Workflow> {
        lock(&self.state).workflows.values().cloned().collect()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create_workflow(
        &self,
        artifact_id: i64,
        pipeline_id: i64,
        created_on: DateTime<Utc>,
    ) -> Result<Workflow, sqlx::Error> {
        let mut state = lock(&self.state);
        state.next_workflow_id += 1;
        let workflow = Workflow {
            id: state.next_workflow_id,
            artifact_id,
            pipeline_id,
            created_on,
        };
        state.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn find_workflow(&self, id: i64) -> Result<Option<Workflow>, sqlx::Error> {
        Ok(lock(&self.state).workflows.get(&id).cloned())
    }

    async fn create_run(&self, run: &WorkflowRun) -> Result<i64, sqlx::Error> {
        let mut state = lock(&self.state);
        state.next_run_id += 1;
        let id = state.next_run_id;
        let mut stored = run.clone();
        stored.id = id;
        state.runs.insert(id, stored);
        Ok(id)
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<(), sqlx::Error> {
        let mut state = lock(&self.state);
        match state.runs.get_mut(&run.id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(sqlx::Error::RowNotFound),
        }
    }

    async fn find_run(&self, id: i64) -> Result<Option<WorkflowRun>, sqlx::Error> {
        Ok(lock(&self.state).runs.get(&id).cloned())
    }

    async fn find_run_by_workflow_and_stage(
        &self,
        workflow_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        if self.failing_stage_lookups.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(lock(&self.state)
            .runs
            .values()
            .rev()
            .find(|run| run.workflow_id == workflow_id && run.stage_type == stage)
            .cloned())
    }

    async fn find_latest_run_by_pipeline_and_stage(
        &self,
        pipeline_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let state = lock(&self.state);
        Ok(state
            .runs
            .values()
            .rev()
            .find(|run| {
                run.stage_type == stage
                    && state
                        .workflows
                        .get(&run.workflow_id)
                        .is_some_and(|wf| wf.pipeline_id == pipeline_id)
            })
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemorySnapshotRepository {
    snapshots: Mutex<HashMap<(i64, StageType), WorkflowRequest>>,
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn save(
        &self,
        runner_id: i64,
        stage: StageType,
        request: &WorkflowRequest,
    ) -> Result<(), sqlx::Error> {
        lock(&self.snapshots).insert((runner_id, stage), request.clone());
        Ok(())
    }

    async fn find(
        &self,
        runner_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRequest>, sqlx::Error> {
        Ok(lock(&self.snapshots).get(&(runner_id, stage)).cloned())
    }
}

// =============================================================================
// Step graphs and custom tags
// =============================================================================

#[derive(Default)]
struct StepGraphState {
    plugin_versions: HashMap<String, HashMap<i64, String>>,
    stages: HashMap<(i64, StageType), StageStepData>,
    snapshots: Vec<(i64, BTreeMap<String, String>)>,
}

#[derive(Default)]
pub struct FakeStepGraph {
    state: Mutex<StepGraphState>,
}

impl FakeStepGraph {
    pub fn add_plugin_version(&self, plugin_name: &str, plugin_id: i64, version: &str) {
        lock(&self.state)
            .plugin_versions
            .entry(plugin_name.to_string())
            .or_default()
            .insert(plugin_id, version.to_string());
    }

    pub fn configure_stage(&self, pipeline_id: i64, stage: StageType, data: StageStepData) {
        lock(&self.state).stages.insert((pipeline_id, stage), data);
    }

    pub fn saved_snapshots(&self) -> Vec<(i64, BTreeMap<String, String>)> {
        lock(&self.state).snapshots.clone()
    }
}

#[async_trait]
impl StepGraphService for FakeStepGraph {
    async fn has_stage_config(&self, pipeline_id: i64, stage: StageType) -> Result<bool> {
        Ok(lock(&self.state).stages.contains_key(&(pipeline_id, stage)))
    }

    async fn build_stage_steps(
        &self,
        pipeline_id: i64,
        stage: StageType,
        _scope: &Scope,
    ) -> Result<StageStepData> {
        lock(&self.state)
            .stages
            .get(&(pipeline_id, stage))
            .cloned()
            .ok_or_else(|| anyhow!("no step graph for pipeline {pipeline_id} {stage}"))
    }

    async fn find_plugin_versions(&self, plugin_name: &str) -> Result<HashMap<i64, String>> {
        Ok(lock(&self.state)
            .plugin_versions
            .get(plugin_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_variable_snapshot(
        &self,
        runner_id: i64,
        snapshot: &BTreeMap<String, String>,
        _triggered_by: i32,
    ) -> Result<()> {
        lock(&self.state)
            .snapshots
            .push((runner_id, snapshot.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCustomTags {
    tags: Mutex<HashMap<(CustomTagEntity, i64), (CustomTag, String)>>,
}

impl FakeCustomTags {
    /// Configures the custom tag of a pipeline and the tag it generates next
    pub fn configure(
        &self,
        entity: CustomTagEntity,
        pipeline_id: i64,
        tag: CustomTag,
        generated: &str,
    ) {
        lock(&self.tags).insert((entity, pipeline_id), (tag, generated.to_string()));
    }
}

#[async_trait]
impl CustomTagService for FakeCustomTags {
    async fn find_active(
        &self,
        entity: CustomTagEntity,
        pipeline_id: i64,
    ) -> Result<Option<CustomTag>> {
        Ok(lock(&self.tags)
            .get(&(entity, pipeline_id))
            .map(|(tag, _)| tag.clone()))
    }

    async fn generate_tag(&self, entity: CustomTagEntity, pipeline_id: i64) -> Result<String> {
        lock(&self.tags)
            .get(&(entity, pipeline_id))
            .map(|(_, generated)| generated.clone())
            .ok_or_else(|| anyhow!("no custom tag for pipeline {pipeline_id}"))
    }
}

// =============================================================================
// Policies
// =============================================================================

#[derive(Default)]
struct FeasibilityState {
    blocked: Option<String>,
    audit: Option<FilterEvaluationAudit>,
    fail_link: bool,
    linked: Vec<(i64, i64)>,
    bypasses: Vec<i64>,
}

#[derive(Default)]
pub struct FakeFeasibility {
    state: Mutex<FeasibilityState>,
}

impl FakeFeasibility {
    pub fn block(&self, reason: &str) {
        lock(&self.state).blocked = Some(reason.to_string());
    }

    pub fn with_audit(&self, audit: FilterEvaluationAudit) {
        lock(&self.state).audit = Some(audit);
    }

    pub fn fail_audit_link(&self) {
        lock(&self.state).fail_link = true;
    }

    /// (audit id, runner id) pairs linked so far
    pub fn linked_audits(&self) -> Vec<(i64, i64)> {
        lock(&self.state).linked.clone()
    }

    pub fn window_bypasses(&self) -> Vec<i64> {
        lock(&self.state).bypasses.clone()
    }
}

#[async_trait]
impl FeasibilityService for FakeFeasibility {
    async fn evaluate(
        &self,
        _request: &TriggerRequest,
        _env: &Environment,
        _stage: StageType,
    ) -> Result<Feasibility> {
        let state = lock(&self.state);
        Ok(match &state.blocked {
            Some(reason) => Feasibility::Blocked {
                reason: reason.clone(),
            },
            None => Feasibility::Allowed {
                audit: state.audit.clone(),
            },
        })
    }

    async fn link_filter_audit(&self, audit: &FilterEvaluationAudit, runner_id: i64) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_link {
            bail!("audit store unavailable");
        }
        state.linked.push((audit.id, runner_id));
        Ok(())
    }

    async fn record_deployment_window_bypass(
        &self,
        _request: &TriggerRequest,
        runner_id: i64,
    ) -> Result<()> {
        lock(&self.state).bypasses.push(runner_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeImageScan {
    vulnerable: Mutex<HashSet<String>>,
}

impl FakeImageScan {
    pub fn mark_vulnerable(&self, digest: &str) {
        lock(&self.vulnerable).insert(digest.to_string());
    }
}

#[async_trait]
impl ImageScanService for FakeImageScan {
    async fn is_vulnerable(&self, _pipeline: &CdPipeline, image_digest: &str) -> Result<bool> {
        Ok(lock(&self.vulnerable).contains(image_digest))
    }
}

#[derive(Default)]
pub struct FakeDigestPolicy {
    pinned: Mutex<HashSet<i64>>,
}

impl FakeDigestPolicy {
    pub fn enable(&self, pipeline_id: i64) {
        lock(&self.pinned).insert(pipeline_id);
    }
}

#[async_trait]
impl DigestPolicyService for FakeDigestPolicy {
    async fn use_digest_for_trigger(&self, pipeline_id: i64) -> Result<bool> {
        Ok(lock(&self.pinned).contains(&pipeline_id))
    }
}

struct DeploymentConfigState {
    app_type: DeploymentAppType,
    release_mode: ReleaseMode,
    repo_url: Option<String>,
    custom_repo: bool,
    repo_problem: Option<String>,
}

pub struct FakeDeploymentConfigs {
    state: Mutex<DeploymentConfigState>,
}

impl Default for FakeDeploymentConfigs {
    fn default() -> Self {
        Self {
            state: Mutex::new(DeploymentConfigState {
                app_type: DeploymentAppType::Helm,
                release_mode: ReleaseMode::Create,
                repo_url: None,
                custom_repo: false,
                repo_problem: None,
            }),
        }
    }
}

impl FakeDeploymentConfigs {
    /// Switches every pair to GitOps publishing into `repo_url`
    pub fn publish_to(&self, repo_url: &str) {
        let mut state = lock(&self.state);
        state.app_type = DeploymentAppType::ArgoCd;
        state.release_mode = ReleaseMode::Publish;
        state.repo_url = Some(repo_url.to_string());
    }

    /// Marks the repository user-supplied and reports `problem` when validated
    pub fn reject_custom_repo(&self, problem: &str) {
        let mut state = lock(&self.state);
        state.app_type = DeploymentAppType::ArgoCd;
        state.custom_repo = true;
        state.repo_problem = Some(problem.to_string());
    }
}

#[async_trait]
impl DeploymentConfigService for FakeDeploymentConfigs {
    async fn get_or_migrate(&self, app_id: i64, environment_id: i64) -> Result<DeploymentConfig> {
        let state = lock(&self.state);
        Ok(DeploymentConfig {
            app_id,
            environment_id,
            deployment_app_type: state.app_type,
            release_mode: state.release_mode,
            repo_url: state.repo_url.clone(),
            target_revision: state.repo_url.as_ref().map(|_| "main".to_string()),
            custom_repo: state.custom_repo,
        })
    }

    async fn validate_custom_repo(&self, _config: &DeploymentConfig) -> Result<Option<String>> {
        Ok(lock(&self.state).repo_problem.clone())
    }
}

// =============================================================================
// Dispatch, notifications and platform
// =============================================================================

#[derive(Default)]
pub struct FakeDispatcher {
    dispatched: Mutex<Vec<WorkflowRequest>>,
    failure: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeDispatcher {
    /// Dispatches wait until the returned gate is notified
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.gate) = Some(gate.clone());
        gate
    }

    pub fn fail_with(&self, message: &str) {
        *lock(&self.failure) = Some(message.to_string());
    }

    pub fn dispatched(&self) -> Vec<WorkflowRequest> {
        lock(&self.dispatched).clone()
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn dispatch(
        &self,
        request: &WorkflowRequest,
        _reference_id: Option<Uuid>,
    ) -> Result<DispatchReceipt> {
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(message) = lock(&self.failure).clone() {
            bail!(message);
        }
        lock(&self.dispatched).push(request.clone());
        Ok(DispatchReceipt {
            workflow_name: format!("{}-{}", request.workflow_name_prefix, request.stage_type),
            helm_package_path: Some(format!("charts/{}.tgz", request.workflow_runner_id)),
        })
    }
}

#[derive(Default)]
pub struct FakeEventPublisher {
    events: Mutex<Vec<StageEvent>>,
}

impl FakeEventPublisher {
    pub fn events(&self) -> Vec<StageEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl EventPublisher for FakeEventPublisher {
    async fn publish(&self, event: &StageEvent) -> Result<()> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

pub struct FakeAttributes {
    host_url: Mutex<Option<String>>,
}

impl Default for FakeAttributes {
    fn default() -> Self {
        Self {
            host_url: Mutex::new(Some("https://stagehand.example.com".to_string())),
        }
    }
}

impl FakeAttributes {
    pub fn clear_host_url(&self) {
        *lock(&self.host_url) = None;
    }
}

#[async_trait]
impl AttributeService for FakeAttributes {
    async fn host_url(&self) -> Result<Option<String>> {
        Ok(lock(&self.host_url).clone())
    }
}

#[derive(Default)]
pub struct FakeUsers {
    emails: Mutex<HashMap<i32, String>>,
}

impl FakeUsers {
    pub fn add(&self, user_id: i32, email: &str) {
        lock(&self.emails).insert(user_id, email.to_string());
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn active_email(&self, user_id: i32) -> Result<Option<String>> {
        Ok(lock(&self.emails).get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeHistory {
    entries: Mutex<Vec<(i64, StageType, i32)>>,
    failing: AtomicBool,
}

impl FakeHistory {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// (pipeline id, stage, triggered by) of every recorded script
    pub fn entries(&self) -> Vec<(i64, StageType, i32)> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl HistoryService for FakeHistory {
    async fn record_stage_script(
        &self,
        pipeline: &CdPipeline,
        stage: StageType,
        triggered_by: i32,
        _triggered_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("history store unavailable");
        }
        lock(&self.entries).push((pipeline.id, stage, triggered_by));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDeploymentTrigger {
    requests: Mutex<Vec<TriggerRequest>>,
}

impl FakeDeploymentTrigger {
    pub fn requests(&self) -> Vec<TriggerRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl DeploymentTrigger for FakeDeploymentTrigger {
    async fn trigger_automatic_deployment(&self, request: TriggerRequest) -> Result<()> {
        lock(&self.requests).push(request);
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub mod fixtures {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use stagehand_core::domain::artifact::{ArtifactDataSource, PipelineArtifact};
    use stagehand_core::domain::custom_tag::{CustomTag, CustomTagEntity};
    use stagehand_core::domain::environment::{App, Environment};
    use stagehand_core::domain::pipeline::{
        AuthMode, CdPipeline, CiPipeline, CiPipelineMaterial, CiPipelineType, GitMaterial,
        GitProvider, SourceType, TriggerType,
    };
    use stagehand_core::domain::registry::{RegistryConfig, RegistryConnection, RegistryType};
    use stagehand_core::domain::step::{StepDefinition, StepKind, VariableObject, VariableType};
    use stagehand_core::domain::workflow::{ExecutorType, NewWorkflowRun, StageType};
    use stagehand_core::dto::trigger::{TriggerContext, TriggerRequest};
    use stagehand_core::dto::workflow_request::{
        ArtifactDto, CD_WORKFLOW_PIPELINE_TYPE, Scope, WorkflowRequest,
    };

    use crate::repository::{CiWorkflow, GitCommit};
    use crate::service::steps::DESTINATION_INFO;

    pub const GIT_URL: &str = "https://github.com/org/app.git";

    pub const MATERIAL_INFO: &str = r#"[{"material":{"gitConfiguration":{"URL":"https://github.com/org/app.git"},"type":"git"},"changed":true,"modifications":[{"revision":"abc123","modifiedTime":"2024-03-01T10:00:00Z","author":"dev","message":"fix","branch":"main","tag":""}]}]"#;

    pub fn registry(id: &str) -> RegistryConfig {
        RegistryConfig {
            registry_id: id.to_string(),
            registry_url: format!("https://{id}.registry.local"),
            registry_type: RegistryType::Other,
            username: "ci".to_string(),
            password: "secret".to_string(),
            aws_region: String::new(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            connection: RegistryConnection::default(),
            docker_repository: String::new(),
        }
    }

    pub fn artifact() -> PipelineArtifact {
        PipelineArtifact {
            id: 1,
            pipeline_id: Some(100),
            image: "repo/app:v1".to_string(),
            image_digest: "sha256:abc".to_string(),
            material_info: MATERIAL_INFO.to_string(),
            data_source: ArtifactDataSource::CiRunner,
            workflow_id: Some(50),
            credential_source: None,
        }
    }

    pub fn ci_pipeline(id: i64) -> CiPipeline {
        CiPipeline {
            id,
            app_id: 10,
            app_name: "payments".to_string(),
            pipeline_type: CiPipelineType::Ci,
            parent_ci_pipeline: None,
            is_docker_config_overridden: false,
            materials: vec![CiPipelineMaterial {
                id: 1,
                git_material_id: 1,
                source_type: SourceType::SourceTypeBranchFixed,
                source_value: "main".to_string(),
                git_url: GIT_URL.to_string(),
                active: true,
            }],
        }
    }

    pub fn cd_pipeline(id: i64) -> CdPipeline {
        CdPipeline {
            id,
            name: "cd-prod".to_string(),
            app_id: 10,
            environment_id: 5,
            ci_pipeline_id: Some(100),
            trigger_type: TriggerType::Manual,
            run_pre_stage_in_env: false,
            run_post_stage_in_env: false,
            pre_stage_config: "echo pre".to_string(),
            post_stage_config: "echo post".to_string(),
        }
    }

    pub fn environment(id: i64) -> Environment {
        Environment {
            id,
            name: "prod".to_string(),
            namespace: "payments-prod".to_string(),
            cluster_id: 1,
            cluster_name: Some("default_cluster".to_string()),
        }
    }

    pub fn app() -> App {
        App {
            id: 10,
            name: "payments".to_string(),
        }
    }

    pub fn git_material() -> GitMaterial {
        GitMaterial {
            id: 1,
            name: "app".to_string(),
            url: GIT_URL.to_string(),
            checkout_path: "./".to_string(),
            fetch_submodules: false,
            provider: GitProvider {
                auth_mode: AuthMode::Anonymous,
                user_name: String::new(),
                password: String::new(),
                ssh_private_key: String::new(),
                access_token: String::new(),
            },
        }
    }

    pub fn ci_workflow(id: i64) -> CiWorkflow {
        CiWorkflow {
            id,
            ci_pipeline_id: 100,
            git_triggers: BTreeMap::new(),
        }
    }

    pub fn git_commit() -> GitCommit {
        GitCommit {
            commit: "abc123".to_string(),
            author: "dev".to_string(),
            date: None,
            message: "fix".to_string(),
            source_type: SourceType::SourceTypeBranchFixed,
            source_value: "main".to_string(),
            git_repo_url: GIT_URL.to_string(),
            webhook_data: None,
        }
    }

    pub fn new_run(workflow_id: i64, stage: StageType) -> NewWorkflowRun {
        NewWorkflowRun {
            workflow_id,
            name: "cd-prod".to_string(),
            stage_type: stage,
            started_on: Utc::now(),
            triggered_by: 2,
            namespace: "devtron-cd".to_string(),
            executor_type: ExecutorType::Awf,
            blob_storage_enabled: false,
            log_location: String::new(),
            reference_id: None,
            ref_runner_id: None,
        }
    }

    pub fn custom_tag(id: i64, enabled: bool) -> CustomTag {
        CustomTag {
            id,
            entity: CustomTagEntity::PreCd,
            entity_value: "1".to_string(),
            tag_pattern: "release-{x}".to_string(),
            auto_increasing_number: 12,
            enabled,
        }
    }

    pub fn copy_image_step(ref_plugin_id: i64, destination_info: &str) -> StepDefinition {
        StepDefinition {
            name: "copy image".to_string(),
            index: 1,
            kind: StepKind::RefPlugin { ref_plugin_id },
            input_vars: vec![VariableObject {
                name: DESTINATION_INFO.to_string(),
                format: "STRING".to_string(),
                value: destination_info.to_string(),
                variable_type: VariableType::Value,
                reference_variable_name: String::new(),
            }],
            output_vars: vec![],
        }
    }

    pub fn workflow_request() -> WorkflowRequest {
        let artifact = artifact();
        WorkflowRequest {
            workflow_id: 1,
            workflow_runner_id: 1,
            workflow_name_prefix: "1-cd-prod".to_string(),
            workflow_prefix_for_log: "1PRE-cd-prod".to_string(),
            app_id: 10,
            environment_id: 5,
            cd_pipeline_id: 1,
            stage_type: StageType::Pre,
            pipeline_type: CD_WORKFLOW_PIPELINE_TYPE.to_string(),
            triggered_by: 2,
            cd_image: "stagehand/runner:latest".to_string(),
            namespace: "devtron-cd".to_string(),
            active_deadline_seconds: 3600,
            workflow_executor: ExecutorType::Awf,
            orchestrator_host: String::new(),
            orchestrator_token: String::new(),
            host_url: "https://stagehand.example.com".to_string(),
            default_address_pool_base_cidr: String::new(),
            default_address_pool_size: 0,
            ci_project_details: vec![],
            artifact: ArtifactDto::from_artifact(&artifact, artifact.image.clone()),
            ci_pipeline_type: Some(CiPipelineType::Ci),
            registry: None,
            stage_yaml: "echo pre".to_string(),
            pre_post_deploy_steps: vec![],
            ref_plugins: vec![],
            scope: Scope::default(),
            system_environment_variables: BTreeMap::new(),
            deployment_trigger_time: None,
            deployment_triggered_by: String::new(),
            deployment_release_counter: None,
            registry_destination_image_map: BTreeMap::new(),
            registry_credential_map: BTreeMap::new(),
            docker_image_tag: String::new(),
            plugin_artifact_stage: None,
            cloud_provider: "S3".to_string(),
            blob_storage_configured: false,
            cd_cache_region: String::new(),
            cd_cache_location: String::new(),
            artifact_location: String::new(),
            ci_artifact_bucket: String::new(),
            ci_artifact_file_name: String::new(),
            blob_storage_s3_config: None,
            gcp_blob_config: None,
            azure_blob_config: None,
            pipeline: Some(cd_pipeline(1)),
            env: Some(environment(5)),
        }
    }

    pub fn trigger_request() -> TriggerRequest {
        TriggerRequest {
            pipeline: cd_pipeline(1),
            artifact: artifact(),
            workflow: None,
            triggered_by: 2,
            is_retrigger: false,
            ref_runner_id: None,
            context: TriggerContext::default(),
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Every collaborator as a fake, seeded with pipeline 1 of app "payments"
/// deploying to env 5, fed by CI pipeline 100 which built artifact 1
pub struct Harness {
    pub config: Arc<OrchestratorConfig>,
    pub store: Arc<FakeStore>,
    pub workflows: Arc<InMemoryWorkflowRepository>,
    pub reservations: InMemoryReservationRepository,
    pub snapshots: Arc<InMemorySnapshotRepository>,
    pub feasibility: Arc<FakeFeasibility>,
    pub image_scan: Arc<FakeImageScan>,
    pub digest_policy: Arc<FakeDigestPolicy>,
    pub deployment_configs: Arc<FakeDeploymentConfigs>,
    pub step_graph: Arc<FakeStepGraph>,
    pub custom_tags: Arc<FakeCustomTags>,
    pub dispatcher: Arc<FakeDispatcher>,
    pub events: Arc<FakeEventPublisher>,
    pub attributes: Arc<FakeAttributes>,
    pub users: Arc<FakeUsers>,
    pub history: Arc<FakeHistory>,
    pub deployments: Arc<FakeDeploymentTrigger>,
    pub side_effects: SideEffects,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        init_tracing();

        let store = Arc::new(FakeStore::default());
        store.add_cd_pipeline(fixtures::cd_pipeline(1));
        store.add_app(fixtures::app());
        store.add_environment(fixtures::environment(5));
        store.add_artifact(fixtures::artifact());
        store.add_ci_pipeline(fixtures::ci_pipeline(100));
        store.add_git_material(fixtures::git_material());
        store.add_registry(fixtures::registry("docker-hub"));
        store.add_applied_config(100, false, fixtures::registry("docker-hub"));
        let mut ci_workflow = fixtures::ci_workflow(50);
        ci_workflow.git_triggers.insert(1, fixtures::git_commit());
        store.set_ci_workflow(1, ci_workflow);

        Self {
            config: Arc::new(config),
            store,
            workflows: Arc::new(InMemoryWorkflowRepository::default()),
            reservations: InMemoryReservationRepository::new(),
            snapshots: Arc::new(InMemorySnapshotRepository::default()),
            feasibility: Arc::new(FakeFeasibility::default()),
            image_scan: Arc::new(FakeImageScan::default()),
            digest_policy: Arc::new(FakeDigestPolicy::default()),
            deployment_configs: Arc::new(FakeDeploymentConfigs::default()),
            step_graph: Arc::new(FakeStepGraph::default()),
            custom_tags: Arc::new(FakeCustomTags::default()),
            dispatcher: Arc::new(FakeDispatcher::default()),
            events: Arc::new(FakeEventPublisher::default()),
            attributes: Arc::new(FakeAttributes::default()),
            users: Arc::new(FakeUsers::default()),
            history: Arc::new(FakeHistory::default()),
            deployments: Arc::new(FakeDeploymentTrigger::default()),
            side_effects: SideEffects::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            pipelines: self.store.clone(),
            apps: self.store.clone(),
            artifacts: self.store.clone(),
            git_materials: self.store.clone(),
            registries: self.store.clone(),
            workflows: self.workflows.clone(),
            reservations: Arc::new(self.reservations.clone()),
            snapshots: self.snapshots.clone(),
            feasibility: self.feasibility.clone(),
            image_scan: self.image_scan.clone(),
            digest_policy: self.digest_policy.clone(),
            deployment_configs: self.deployment_configs.clone(),
            step_graph: self.step_graph.clone(),
            custom_tags: self.custom_tags.clone(),
            dispatcher: self.dispatcher.clone(),
            events: self.events.clone(),
            attributes: self.attributes.clone(),
            users: self.users.clone(),
            history: self.history.clone(),
            deployments: self.deployments.clone(),
        }
    }

    pub fn lifecycle(&self) -> RunLifecycle {
        RunLifecycle::new(self.workflows.clone())
    }

    pub fn orchestrator(&self) -> TriggerOrchestrator {
        TriggerOrchestrator::new(
            self.config.clone(),
            self.collaborators(),
            self.side_effects.clone(),
        )
    }
}
