//! Stagehand Orchestrator
//!
//! Triggers the pre- and post-deployment stages of CD pipelines: resolves
//! registry credentials, expands plugin steps, assembles runtime variables,
//! builds the workflow request for the remote runner and drives the run
//! record from `Starting` to dispatch.
//!
//! The orchestrator is embedded by the service that owns pipelines and
//! artifacts. It provides [`service::TriggerOrchestrator`] and the Postgres
//! storage for the records it owns; everything upstream is reached through
//! the traits in [`repository`] and [`integration`], bundled in
//! [`service::Collaborators`].

pub mod config;
pub mod db;
pub mod error;
pub mod integration;
pub mod repository;
pub mod service;

#[cfg(test)]
mod testing;

// Re-export for convenience
pub use config::OrchestratorConfig;
pub use error::{ErrorKind, Result, TriggerError};
pub use service::{Collaborators, TriggerOrchestrator};
