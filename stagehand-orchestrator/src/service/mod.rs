//! Service Layer
//!
//! Business logic of the trigger orchestrator. [`TriggerOrchestrator`] is
//! the entry point; the other services are the stages it runs a trigger
//! through:
//!
//! - [`credentials`]: which registry credentials a request carries
//! - [`steps`]: step graph expansion and image-copy destinations
//! - [`variables`]: runtime system variables
//! - [`request_builder`]: the complete workflow request
//! - [`snapshot`]: stored requests for retriggers
//! - [`lifecycle`]: run status changes
//! - [`side_effects`]: best-effort background tasks

use std::sync::Arc;

use crate::integration::{
    AttributeService, CustomTagService, DeploymentConfigService, DeploymentTrigger,
    DigestPolicyService, Dispatcher, EventPublisher, FeasibilityService, HistoryService,
    ImageScanService, StepGraphService, UserDirectory,
};
use crate::repository::{
    AppRepository, ArtifactRepository, GitMaterialRepository, ImagePathReservationRepository,
    PipelineRepository, RegistryRepository, SnapshotRepository, WorkflowRepository,
};

pub mod credentials;
pub mod lifecycle;
pub mod request_builder;
pub mod side_effects;
pub mod snapshot;
pub mod steps;
pub mod trigger;
pub mod variables;

// Re-export for convenience
pub use lifecycle::RunLifecycle;
pub use request_builder::{BuildInput, BuiltRequest, RequestBuilder};
pub use side_effects::SideEffects;
pub use snapshot::SnapshotAdapter;
pub use trigger::TriggerOrchestrator;

/// Everything the orchestrator reads from or hands work to
#[derive(Clone)]
pub struct Collaborators {
    pub pipelines: Arc<dyn PipelineRepository>,
    pub apps: Arc<dyn AppRepository>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub git_materials: Arc<dyn GitMaterialRepository>,
    pub registries: Arc<dyn RegistryRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub reservations: Arc<dyn ImagePathReservationRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub feasibility: Arc<dyn FeasibilityService>,
    pub image_scan: Arc<dyn ImageScanService>,
    pub digest_policy: Arc<dyn DigestPolicyService>,
    pub deployment_configs: Arc<dyn DeploymentConfigService>,
    pub step_graph: Arc<dyn StepGraphService>,
    pub custom_tags: Arc<dyn CustomTagService>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub events: Arc<dyn EventPublisher>,
    pub attributes: Arc<dyn AttributeService>,
    pub users: Arc<dyn UserDirectory>,
    pub history: Arc<dyn HistoryService>,
    pub deployments: Arc<dyn DeploymentTrigger>,
}
