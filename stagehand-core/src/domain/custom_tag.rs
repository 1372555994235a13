//! Custom tag and image path reservation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::workflow::StageType;

/// Custom tag id stored on reservations made without a configured custom tag
pub const UNCONFIGURED_CUSTOM_TAG_ID: i64 = -1;

/// Entity a custom tag template is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomTagEntity {
    PreCd,
    PostCd,
}

impl CustomTagEntity {
    /// Entity for a pre/post stage; deploy stages have no custom tags
    pub fn for_stage(stage: StageType) -> Option<Self> {
        match stage {
            StageType::Pre => Some(CustomTagEntity::PreCd),
            StageType::Post => Some(CustomTagEntity::PostCd),
            StageType::Deploy => None,
        }
    }
}

/// Tag template configured for a (stage, pipeline) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTag {
    pub id: i64,
    pub entity: CustomTagEntity,
    /// Pipeline id the template applies to
    pub entity_value: String,
    /// Pattern such as `v1.{x}`
    pub tag_pattern: String,
    pub auto_increasing_number: i64,
    pub enabled: bool,
}

/// Exclusive claim on a destination image path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePathReservation {
    pub id: i64,
    pub image_path: String,
    pub custom_tag_id: i64,
    pub created_on: DateTime<Utc>,
}
