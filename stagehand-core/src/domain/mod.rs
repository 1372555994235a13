//! Core domain types
//!
//! This module contains the core domain structures used across Stagehand.
//! These types represent the entities the trigger orchestrator reads from
//! its collaborators (pipelines, environments, artifacts, registries) and
//! the records it owns (workflows, runs, image path reservations).

pub mod artifact;
pub mod custom_tag;
pub mod deployment;
pub mod environment;
pub mod pipeline;
pub mod registry;
pub mod step;
pub mod workflow;
