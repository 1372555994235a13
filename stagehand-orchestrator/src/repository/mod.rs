//! Repository Module
//!
//! Data access layer for the orchestrator.
//!
//! Upstream entities (pipelines, apps, environments, artifacts, git
//! materials, registries) are owned by other services and reached through
//! the read traits in [`pipeline`], [`artifact`] and [`registry`]. Workflow
//! runs, image path reservations and request snapshots are owned here and
//! stored in Postgres.

pub mod artifact;
pub mod pipeline;
pub mod registry;
pub mod reservation;
pub mod snapshot;
pub mod workflow;

// Re-export for convenience
pub use artifact::{ArtifactRepository, CiWorkflow, GitCommit, GitMaterialRepository};
pub use pipeline::{AppRepository, PipelineRepository};
pub use registry::RegistryRepository;
pub use reservation::{
    ImagePathReservationRepository, InMemoryReservationRepository, PgReservationRepository,
    ReservationError,
};
pub use snapshot::{PgSnapshotRepository, SnapshotRepository};
pub use workflow::{PgWorkflowRepository, WorkflowRepository};
