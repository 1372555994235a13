//! Plugin Step Materializer
//!
//! Expands the step graph configured for a pipeline stage into concrete
//! steps, falling back to the legacy single-script stage when no graph is
//! configured. Requests containing the image-copy plugin additionally get
//! their destination images resolved and reserved here: every destination
//! path is claimed up front so two runs can never push the same image.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use stagehand_core::domain::artifact::{ArtifactDataSource, PipelineArtifact};
use stagehand_core::domain::custom_tag::{CustomTagEntity, UNCONFIGURED_CUSTOM_TAG_ID};
use stagehand_core::domain::pipeline::CdPipeline;
use stagehand_core::domain::registry::RegistryConfig;
use stagehand_core::domain::step::StepDefinition;
use stagehand_core::domain::workflow::StageType;
use stagehand_core::dto::workflow_request::{Scope, WorkflowRequest};
use tracing::{debug, info, warn};

use crate::error::{CollaboratorResultExt, Result, TriggerError};
use crate::integration::{CustomTagService, StageStepData, StepGraphService};
use crate::repository::{ArtifactRepository, ImagePathReservationRepository, RegistryRepository};
use crate::service::side_effects::SideEffects;

pub const COPY_CONTAINER_IMAGE_PLUGIN: &str = "Copy container image";
/// Plugin version that reads the destination map from the request itself
pub const COPY_CONTAINER_IMAGE_VERSION_V1: &str = "1.0.0";
pub const DESTINATION_INFO: &str = "DESTINATION_INFO";
pub const SOURCE_REGISTRY_CREDENTIALS: &str = "SOURCE_REGISTRY_CREDENTIALS";

/// Steps resolved for a stage
#[derive(Debug, Clone)]
pub enum StageSteps {
    Graph(StageStepData),
    /// No step graph configured; the stage runs a single script
    Legacy { stage_yaml: String },
}

/// Destination images and credentials parsed from one image-copy step
#[derive(Debug, Default)]
struct CopyTargets {
    destinations: BTreeMap<String, Vec<String>>,
    credentials: BTreeMap<String, RegistryConfig>,
}

pub struct StepMaterializer {
    step_graph: Arc<dyn StepGraphService>,
    custom_tags: Arc<dyn CustomTagService>,
    artifacts: Arc<dyn ArtifactRepository>,
    registries: Arc<dyn RegistryRepository>,
    reservations: Arc<dyn ImagePathReservationRepository>,
    side_effects: SideEffects,
}

impl StepMaterializer {
    pub fn new(
        step_graph: Arc<dyn StepGraphService>,
        custom_tags: Arc<dyn CustomTagService>,
        artifacts: Arc<dyn ArtifactRepository>,
        registries: Arc<dyn RegistryRepository>,
        reservations: Arc<dyn ImagePathReservationRepository>,
        side_effects: SideEffects,
    ) -> Self {
        Self {
            step_graph,
            custom_tags,
            artifacts,
            registries,
            reservations,
            side_effects,
        }
    }

    /// Resolves the steps of `stage` for `scope`
    ///
    /// The scoped variable snapshot is stored in the background against
    /// `runner_id`.
    pub async fn materialize(
        &self,
        pipeline: &CdPipeline,
        stage: StageType,
        scope: &Scope,
        runner_id: i64,
        triggered_by: i32,
    ) -> Result<StageSteps> {
        let has_graph = self
            .step_graph
            .has_stage_config(pipeline.id, stage)
            .await
            .collaborator("failed to check stage configuration")?;

        if !has_graph {
            let stage_yaml = match stage {
                StageType::Post => pipeline.post_stage_config.clone(),
                _ => pipeline.pre_stage_config.clone(),
            };
            debug!(pipeline_id = pipeline.id, %stage, "no step graph, using stage script");
            return Ok(StageSteps::Legacy { stage_yaml });
        }

        let data = self
            .step_graph
            .build_stage_steps(pipeline.id, stage, scope)
            .await
            .collaborator("failed to build stage steps")?;

        if !data.variable_snapshot.is_empty() {
            let step_graph = self.step_graph.clone();
            let snapshot = data.variable_snapshot.clone();
            self.side_effects.spawn("variable-snapshot", async move {
                step_graph
                    .save_variable_snapshot(runner_id, &snapshot, triggered_by)
                    .await
            });
        }

        Ok(StageSteps::Graph(data))
    }

    /// Resolves image-copy plugin destinations and reserves them
    ///
    /// Returns the ids of the reservations taken. Nothing is reserved when a
    /// destination already exists as an artifact or is claimed by another run.
    pub async fn apply_image_copy(
        &self,
        request: &mut WorkflowRequest,
        pipeline_id: i64,
        stage: StageType,
        artifact: &PipelineArtifact,
    ) -> Result<Vec<i64>> {
        let plugin_versions = self
            .step_graph
            .find_plugin_versions(COPY_CONTAINER_IMAGE_PLUGIN)
            .await
            .collaborator("failed to load image copy plugin versions")?;

        let copy_steps: Vec<(StepDefinition, String)> = request
            .pre_post_deploy_steps
            .iter()
            .filter_map(|step| {
                let version = plugin_versions.get(&step.ref_plugin_id()?)?;
                Some((step.clone(), version.clone()))
            })
            .collect();
        if copy_steps.is_empty() {
            return Ok(Vec::new());
        }

        let (docker_image_tag, custom_tag_id) = self
            .destination_tag(stage, pipeline_id, artifact)
            .await?;

        let source_registry_id = if artifact.data_source.is_plugin_produced() {
            artifact.mapped_registry_id().map(str::to_string)
        } else {
            request.registry_id().map(str::to_string)
        };

        let mut all_images = Vec::new();
        let mut credentials = BTreeMap::new();
        for (step, version) in &copy_steps {
            let targets = self
                .parse_copy_targets(
                    step,
                    &docker_image_tag,
                    &request.artifact.image,
                    source_registry_id.as_deref(),
                )
                .await?;
            all_images.extend(targets.destinations.values().flatten().cloned());
            credentials.extend(targets.credentials);
            if version == COPY_CONTAINER_IMAGE_VERSION_V1 {
                request.registry_destination_image_map = targets.destinations;
            }
        }

        request.registry_credential_map = credentials;
        request.docker_image_tag = docker_image_tag;
        request.plugin_artifact_stage = Some(match stage {
            StageType::Post => ArtifactDataSource::PostCd,
            _ => ArtifactDataSource::PreCd,
        });

        if all_images.is_empty() {
            return Ok(Vec::new());
        }

        let existing = self
            .artifacts
            .find_existing_images(&all_images)
            .await
            .collaborator("failed to look up existing images")?;
        if let Some(image_path) = existing.into_iter().next() {
            return Err(TriggerError::ImagePathInUse { image_path });
        }

        let reservations = self
            .reservations
            .reserve_all(&all_images, custom_tag_id)
            .await?;
        info!(
            pipeline_id,
            %stage,
            count = reservations.len(),
            "reserved plugin destination images"
        );
        Ok(reservations.into_iter().map(|r| r.id).collect())
    }

    /// Tag pushed by the image-copy plugin and the custom tag it came from
    async fn destination_tag(
        &self,
        stage: StageType,
        pipeline_id: i64,
        artifact: &PipelineArtifact,
    ) -> Result<(String, i64)> {
        let entity = CustomTagEntity::for_stage(stage).ok_or_else(|| {
            TriggerError::InvalidData(format!("stage {stage} has no plugin artifacts"))
        })?;

        let custom_tag = self
            .custom_tags
            .find_active(entity, pipeline_id)
            .await
            .collaborator("failed to load custom tag")?;

        match custom_tag {
            Some(custom_tag) if custom_tag.enabled => {
                let tag = self
                    .custom_tags
                    .generate_tag(entity, pipeline_id)
                    .await
                    .collaborator("failed to generate custom tag")?;
                let id = if custom_tag.id > 0 {
                    custom_tag.id
                } else {
                    UNCONFIGURED_CUSTOM_TAG_ID
                };
                Ok((tag, id))
            }
            _ => {
                let tag = match artifact.repo_and_tag() {
                    Ok((_, tag)) => tag,
                    Err(e) => {
                        warn!(artifact_id = artifact.id, "cannot extract image tag: {}", e);
                        String::new()
                    }
                };
                Ok((tag, UNCONFIGURED_CUSTOM_TAG_ID))
            }
        }
    }

    async fn parse_copy_targets(
        &self,
        step: &StepDefinition,
        tag: &str,
        source_image: &str,
        source_registry_id: Option<&str>,
    ) -> Result<CopyTargets> {
        if source_image.is_empty() {
            return Err(TriggerError::InvalidData(
                "image copy requires a trigger image".to_string(),
            ));
        }
        let destination_info = step
            .input_value(DESTINATION_INFO)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                TriggerError::InvalidData(format!("step {}: {DESTINATION_INFO} is empty", step.name))
            })?;

        let mut registries: HashMap<String, RegistryConfig> = HashMap::new();
        let mut targets = CopyTargets::default();

        for line in destination_info.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (registry_id, repositories) = line.split_once('|').ok_or_else(|| {
                TriggerError::InvalidData(format!("malformed {DESTINATION_INFO} line: {line}"))
            })?;
            let registry_id = registry_id.trim();
            if registry_id.is_empty() {
                return Err(TriggerError::InvalidData(format!(
                    "malformed {DESTINATION_INFO} line: {line}"
                )));
            }

            let registry = self.registry(&mut registries, registry_id).await?;
            let images = targets.destinations.entry(registry_id.to_string()).or_default();
            for repository in repositories.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                images.push(format!("{}/{repository}:{tag}", registry.host()));
            }
            targets.credentials.insert(registry_id.to_string(), registry);
        }

        if let Some(source_registry_id) = source_registry_id {
            let source = self.registry(&mut registries, source_registry_id).await?;
            targets
                .credentials
                .insert(SOURCE_REGISTRY_CREDENTIALS.to_string(), source);
        }

        Ok(targets)
    }

    async fn registry(
        &self,
        cache: &mut HashMap<String, RegistryConfig>,
        registry_id: &str,
    ) -> Result<RegistryConfig> {
        if let Some(registry) = cache.get(registry_id) {
            return Ok(registry.clone());
        }
        let registry = self
            .registries
            .find_registry(registry_id)
            .await
            .collaborator("failed to load registry")?
            .ok_or_else(|| TriggerError::InvalidData(format!("unknown registry {registry_id}")))?;
        cache.insert(registry_id.to_string(), registry.clone());
        Ok(registry)
    }
}
