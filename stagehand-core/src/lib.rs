//! Stagehand Core
//!
//! Core types for the Stagehand deployment-stage orchestrator.
//!
//! This crate contains:
//! - Domain types: pipelines, artifacts, workflows and runs, steps, registries
//! - DTOs: the workflow request sent to the remote runner, trigger requests
//!   and notification events

pub mod domain;
pub mod dto;
