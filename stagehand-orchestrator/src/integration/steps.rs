//! Plugin step graphs and custom tags

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use stagehand_core::domain::custom_tag::{CustomTag, CustomTagEntity};
use stagehand_core::domain::step::{RefPluginObject, StepDefinition};
use stagehand_core::domain::workflow::StageType;
use stagehand_core::dto::workflow_request::Scope;

/// Steps of a stage resolved for a scope
#[derive(Debug, Clone, Default)]
pub struct StageStepData {
    pub steps: Vec<StepDefinition>,
    pub ref_plugins: Vec<RefPluginObject>,
    /// Scoped variable values used during resolution
    pub variable_snapshot: BTreeMap<String, String>,
}

#[async_trait]
pub trait StepGraphService: Send + Sync {
    /// Whether the pipeline stage is configured as a step graph
    async fn has_stage_config(&self, pipeline_id: i64, stage: StageType) -> Result<bool>;

    async fn build_stage_steps(
        &self,
        pipeline_id: i64,
        stage: StageType,
        scope: &Scope,
    ) -> Result<StageStepData>;

    /// Ids and versions of the plugins registered under `plugin_name`
    async fn find_plugin_versions(&self, plugin_name: &str) -> Result<HashMap<i64, String>>;

    /// Stores the scoped variable snapshot of a run for history
    async fn save_variable_snapshot(
        &self,
        runner_id: i64,
        snapshot: &BTreeMap<String, String>,
        triggered_by: i32,
    ) -> Result<()>;
}

#[async_trait]
pub trait CustomTagService: Send + Sync {
    async fn find_active(
        &self,
        entity: CustomTagEntity,
        pipeline_id: i64,
    ) -> Result<Option<CustomTag>>;

    /// Generates the next tag from the configured template
    async fn generate_tag(&self, entity: CustomTagEntity, pipeline_id: i64) -> Result<String>;
}
