//! Notification event DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::workflow::StageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Trigger,
    Success,
    Fail,
}

/// Event published when a stage run changes phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEvent {
    pub event_type: EventType,
    pub pipeline_id: i64,
    pub app_id: i64,
    pub environment_id: i64,
    pub workflow_id: i64,
    pub workflow_runner_id: i64,
    pub stage: StageType,
    pub triggered_by: i32,
    pub created_at: DateTime<Utc>,
}
