//! Data Transfer Objects
//!
//! DTOs exchanged between the trigger orchestrator, its callers and the
//! remote services it dispatches to.

pub mod event;
pub mod trigger;
pub mod workflow_request;
