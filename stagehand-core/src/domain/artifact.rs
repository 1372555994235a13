//! Artifact domain types
//!
//! A pipeline artifact is an immutable record of a built or imported
//! container image together with the material (commit) information that
//! produced it and where its registry credentials come from.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provenance of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactDataSource {
    #[serde(rename = "CI-RUNNER")]
    CiRunner,
    #[serde(rename = "post_ci")]
    PostCi,
    #[serde(rename = "pre_cd")]
    PreCd,
    #[serde(rename = "post_cd")]
    PostCd,
    #[serde(rename = "EXTERNAL")]
    Webhook,
    #[serde(rename = "registry_sync")]
    RegistrySync,
    /// Deprecated encoding of `Webhook`, migrated on first use
    #[serde(rename = "ext")]
    LegacyExternal,
}

impl ArtifactDataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactDataSource::CiRunner => "CI-RUNNER",
            ArtifactDataSource::PostCi => "post_ci",
            ArtifactDataSource::PreCd => "pre_cd",
            ArtifactDataSource::PostCd => "post_cd",
            ArtifactDataSource::Webhook => "EXTERNAL",
            ArtifactDataSource::RegistrySync => "registry_sync",
            ArtifactDataSource::LegacyExternal => "ext",
        }
    }

    /// Artifacts produced by a plugin inside a pipeline stage rather than a build
    pub fn is_plugin_produced(&self) -> bool {
        matches!(
            self,
            ArtifactDataSource::PreCd | ArtifactDataSource::PostCd | ArtifactDataSource::PostCi
        )
    }
}

/// Explicit pointer to the registry an artifact was pushed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSource {
    /// Id of a global container registry record
    pub registry_id: String,
}

/// Content-addressed image record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineArtifact {
    pub id: i64,
    /// CI pipeline that produced the artifact, if any
    pub pipeline_id: Option<i64>,
    pub image: String,
    pub image_digest: String,
    /// JSON-encoded list of [`CiMaterialInfo`]
    pub material_info: String,
    pub data_source: ArtifactDataSource,
    /// CI workflow that produced the artifact, if any
    pub workflow_id: Option<i64>,
    pub credential_source: Option<CredentialSource>,
}

impl PipelineArtifact {
    /// Whether the artifact still carries the deprecated data source encoding
    pub fn is_migration_required(&self) -> bool {
        self.data_source == ArtifactDataSource::LegacyExternal
    }

    /// Registry id the artifact's credentials must be resolved from, if mapped
    pub fn mapped_registry_id(&self) -> Option<&str> {
        self.credential_source
            .as_ref()
            .map(|source| source.registry_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Parses the stored material info according to the data source
    ///
    /// Registry-synced images carry no source material; every other source
    /// stores a JSON list.
    pub fn parse_material_info(&self) -> Result<Vec<CiMaterialInfo>, serde_json::Error> {
        if self.data_source == ArtifactDataSource::RegistrySync
            || self.material_info.trim().is_empty()
        {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.material_info)
    }

    pub fn repo_and_tag(&self) -> Result<(String, String), ImageReferenceError> {
        split_repo_and_tag(&self.image)
    }
}

/// Errors raised while interpreting an image reference
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageReferenceError {
    #[error("image path is empty")]
    Empty,

    #[error("invalid image path {0}: no tag")]
    MissingTag(String),
}

/// Splits `registry[:port]/repo:tag` into repository and tag
pub fn split_repo_and_tag(image: &str) -> Result<(String, String), ImageReferenceError> {
    if image.is_empty() {
        return Err(ImageReferenceError::Empty);
    }
    let without_digest = image.split('@').next().unwrap_or(image);
    let last_segment_start = without_digest.rfind('/').map(|i| i + 1).unwrap_or(0);
    match without_digest[last_segment_start..].rfind(':') {
        Some(offset) => {
            let colon = last_segment_start + offset;
            Ok((
                without_digest[..colon].to_string(),
                without_digest[colon + 1..].to_string(),
            ))
        }
        None => Err(ImageReferenceError::MissingTag(image.to_string())),
    }
}

/// Tag portion of an image reference, empty when the image is untagged
pub fn image_tag(image: &str) -> String {
    split_repo_and_tag(image)
        .map(|(_, tag)| tag)
        .unwrap_or_default()
}

/// Pins an image to a digest: `repo/app:v1` becomes `repo/app@sha256:...`
pub fn replace_tag_with_digest(image: &str, digest: &str) -> String {
    let repository = match split_repo_and_tag(image) {
        Ok((repository, _)) => repository,
        Err(_) => image.split('@').next().unwrap_or(image).to_string(),
    };
    format!("{repository}@{digest}")
}

// =============================================================================
// Material info
// =============================================================================

/// Commit metadata recorded for one git material of a build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiMaterialInfo {
    pub material: Material,
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub modifications: Vec<Modification>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub git_configuration: GitConfiguration,
    #[serde(rename = "type", default)]
    pub material_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitConfiguration {
    #[serde(rename = "URL", default)]
    pub url: String,
}

/// A single commit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modification {
    pub revision: String,
    /// RFC 3339 commit time
    pub modified_time: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub webhook_data: Option<WebhookData>,
}

impl Modification {
    pub fn commit_time(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(&self.modified_time).map(|t| t.with_timezone(&Utc))
    }
}

/// Payload of the webhook event that triggered a build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub event_action_type: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

/// Formats a timestamp the way the remote runner expects commit times
pub fn format_commit_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Commit time sent when a material has no commit (polling pipelines)
pub fn zero_commit_time() -> String {
    "0001-01-01T00:00:00Z".to_string()
}
