//! Integration Module
//!
//! Traits for the services the orchestrator calls but does not own: image
//! scanning, trigger policies, plugin step graphs, custom tags, workflow
//! dispatch, notifications and platform settings. HTTP-backed
//! implementations live next to the trait they implement where this crate
//! provides one.

pub mod dispatch;
pub mod platform;
pub mod policy;
pub mod steps;

// Re-export for convenience
pub use dispatch::{Dispatcher, EventPublisher, HttpDispatcher, HttpEventPublisher};
pub use platform::{AttributeService, DeploymentTrigger, HistoryService, UserDirectory};
pub use policy::{
    DeploymentConfigService, DigestPolicyService, Feasibility, FeasibilityService,
    FilterEvaluationAudit, ImageScanService,
};
pub use steps::{CustomTagService, StageStepData, StepGraphService};
