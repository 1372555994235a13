//! Runtime Variable Assembler
//!
//! Builds the flat map of system variables exposed to stage steps: target
//! environment and cluster, the commits the artifact was built from, the CD
//! pipelines downstream of this one and, for external-CI apps, the app
//! labels. Keys are namespaced by prefix and indexed from 1.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use stagehand_core::domain::environment::Environment;
use stagehand_core::domain::pipeline::CdPipeline;
use stagehand_core::domain::step::{StepDefinition, VariableObject};

use crate::error::{CollaboratorResultExt, LookupResultExt, Result, TriggerError};
use crate::repository::{AppRepository, CiWorkflow, PipelineRepository};

pub const CD_PIPELINE_ENV_NAME: &str = "CD_PIPELINE_ENV_NAME";
pub const CD_PIPELINE_CLUSTER_NAME: &str = "CD_PIPELINE_CLUSTER_NAME";
pub const GIT_COMMIT_HASH_PREFIX: &str = "GIT_COMMIT_HASH";
pub const GIT_SOURCE_TYPE_PREFIX: &str = "GIT_SOURCE_TYPE";
pub const GIT_SOURCE_VALUE_PREFIX: &str = "GIT_SOURCE_VALUE";
pub const GIT_SOURCE_COUNT: &str = "GIT_SOURCE_COUNT";
pub const CHILD_CD_ENV_NAME_PREFIX: &str = "CHILD_CD_ENV_NAME";
pub const CHILD_CD_CLUSTER_NAME_PREFIX: &str = "CHILD_CD_CLUSTER_NAME";
pub const CHILD_CD_COUNT: &str = "CHILD_CD_COUNT";
pub const CHILD_CD_METADATA: &str = "CHILD_CD_METADATA";
pub const APP_NAME: &str = "APP_NAME";
pub const APP_LABEL_KEY_PREFIX: &str = "APP_LABEL_KEY";
pub const APP_LABEL_VALUE_PREFIX: &str = "APP_LABEL_VALUE";
pub const APP_LABEL_COUNT: &str = "APP_LABEL_COUNT";
pub const APP_LABEL_METADATA: &str = "APP_LABEL_METADATA";

/// Names injected into inline steps when they contain one of these markers
const DYNAMIC_VARIABLE_MARKERS: [&str; 10] = [
    GIT_COMMIT_HASH_PREFIX,
    GIT_SOURCE_TYPE_PREFIX,
    GIT_SOURCE_VALUE_PREFIX,
    GIT_SOURCE_COUNT,
    APP_LABEL_KEY_PREFIX,
    APP_LABEL_VALUE_PREFIX,
    APP_LABEL_COUNT,
    CHILD_CD_ENV_NAME_PREFIX,
    CHILD_CD_CLUSTER_NAME_PREFIX,
    CHILD_CD_COUNT,
];

/// Assembled system variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeVariables {
    pub system: BTreeMap<String, String>,
    /// The triggering build came from a webhook event
    pub has_webhook_data: bool,
}

impl RuntimeVariables {
    fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.system.insert(key.into(), value.into());
    }

    fn set_indexed(&mut self, prefix: &str, index: usize, value: impl Into<String>) {
        self.set(format!("{prefix}_{index}"), value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.system.get(key).map(String::as_str)
    }
}

/// Inputs of [`VariableAssembler::assemble`]
pub struct VariableSources<'a> {
    pub pipeline: &'a CdPipeline,
    pub env: &'a Environment,
    pub app_name: &'a str,
    /// CI build the artifact came from, absent for external-CI artifacts
    pub ci_workflow: Option<&'a CiWorkflow>,
    /// The app is fed by an external CI; its labels are exposed
    pub external_ci: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChildCdMetadata<'a> {
    child_cd_env_name: &'a str,
    child_cd_cluster_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppLabelMetadata<'a> {
    app_label_key: &'a str,
    app_label_value: &'a str,
}

pub struct VariableAssembler {
    pipelines: Arc<dyn PipelineRepository>,
    apps: Arc<dyn AppRepository>,
}

impl VariableAssembler {
    pub fn new(pipelines: Arc<dyn PipelineRepository>, apps: Arc<dyn AppRepository>) -> Self {
        Self { pipelines, apps }
    }

    pub async fn assemble(&self, sources: VariableSources<'_>) -> Result<RuntimeVariables> {
        let mut vars = RuntimeVariables::default();

        vars.set(CD_PIPELINE_ENV_NAME, sources.env.name.as_str());
        if let Some(cluster_name) = &sources.env.cluster_name {
            vars.set(CD_PIPELINE_CLUSTER_NAME, cluster_name.as_str());
        }
        vars.set(APP_NAME, sources.app_name);

        if let Some(ci_workflow) = sources.ci_workflow {
            add_git_trigger_variables(&mut vars, ci_workflow);
        }

        self.add_child_cd_variables(&mut vars, sources.pipeline.id)
            .await?;

        if sources.external_ci {
            self.add_app_label_variables(&mut vars, sources.pipeline.app_id)
                .await?;
        }

        Ok(vars)
    }

    async fn add_child_cd_variables(&self, vars: &mut RuntimeVariables, pipeline_id: i64) -> Result<()> {
        let children = self
            .pipelines
            .find_child_cd_pipelines(pipeline_id)
            .await
            .collaborator("failed to load child cd pipelines")?;
        if children.is_empty() {
            return Ok(());
        }

        let mut environments = Vec::with_capacity(children.len());
        for child in &children {
            let env = self
                .apps
                .find_environment(child.environment_id)
                .await
                .found("environment", child.environment_id)?;
            environments.push(env);
        }

        let mut metadata = Vec::with_capacity(environments.len());
        for (i, env) in environments.iter().enumerate() {
            let cluster_name = env.cluster_name.as_deref().unwrap_or_default();
            vars.set_indexed(CHILD_CD_ENV_NAME_PREFIX, i + 1, env.name.as_str());
            vars.set_indexed(CHILD_CD_CLUSTER_NAME_PREFIX, i + 1, cluster_name);
            metadata.push(ChildCdMetadata {
                child_cd_env_name: &env.name,
                child_cd_cluster_name: cluster_name,
            });
        }
        vars.set(CHILD_CD_METADATA, to_json(&metadata)?);
        vars.set(CHILD_CD_COUNT, environments.len().to_string());
        Ok(())
    }

    async fn add_app_label_variables(&self, vars: &mut RuntimeVariables, app_id: i64) -> Result<()> {
        let labels = self
            .apps
            .find_app_labels(app_id)
            .await
            .collaborator("failed to load app labels")?;
        if labels.is_empty() {
            return Ok(());
        }

        for (i, label) in labels.iter().enumerate() {
            vars.set_indexed(APP_LABEL_KEY_PREFIX, i + 1, label.key.as_str());
            vars.set_indexed(APP_LABEL_VALUE_PREFIX, i + 1, label.value.as_str());
        }
        let metadata: Vec<AppLabelMetadata> = labels
            .iter()
            .map(|label| AppLabelMetadata {
                app_label_key: &label.key,
                app_label_value: &label.value,
            })
            .collect();
        vars.set(APP_LABEL_COUNT, labels.len().to_string());
        vars.set(APP_LABEL_METADATA, to_json(&metadata)?);
        Ok(())
    }
}

/// Commit variables, ordered by CI pipeline material id
fn add_git_trigger_variables(vars: &mut RuntimeVariables, ci_workflow: &CiWorkflow) {
    for (i, commit) in ci_workflow.git_triggers.values().enumerate() {
        vars.set_indexed(GIT_COMMIT_HASH_PREFIX, i + 1, commit.commit.as_str());
        vars.set_indexed(GIT_SOURCE_TYPE_PREFIX, i + 1, commit.source_type.as_str());
        vars.set_indexed(GIT_SOURCE_VALUE_PREFIX, i + 1, commit.source_value.as_str());
        if commit.webhook_data.is_some() {
            vars.has_webhook_data = true;
        }
    }
    vars.set(GIT_SOURCE_COUNT, ci_workflow.git_triggers.len().to_string());
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| TriggerError::InvalidData(e.to_string()))
}

fn is_dynamic_variable(name: &str) -> bool {
    DYNAMIC_VARIABLE_MARKERS
        .iter()
        .any(|marker| name.contains(marker))
}

/// Adds dynamic system variables as input variables of inline steps
///
/// Plugin-backed steps are left untouched. When the build came from a
/// webhook event every system variable is injected.
pub fn inject_into_steps(steps: &mut [StepDefinition], vars: &RuntimeVariables) {
    for step in steps.iter_mut().filter(|step| step.is_inline()) {
        for (name, value) in &vars.system {
            if vars.has_webhook_data || is_dynamic_variable(name) {
                step.input_vars.push(VariableObject::global_ref(name, value));
            }
        }
    }
}
