//! Deployment configuration domain types

use serde::{Deserialize, Serialize};

/// How the deployment manifests reach the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAppType {
    Helm,
    ArgoCd,
    FluxCd,
}

impl DeploymentAppType {
    pub fn is_gitops(&self) -> bool {
        matches!(self, DeploymentAppType::ArgoCd | DeploymentAppType::FluxCd)
    }
}

/// Whether the platform deploys the release or only publishes its manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    Create,
    Publish,
}

/// Deployment configuration of an (app, environment) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub app_id: i64,
    pub environment_id: i64,
    pub deployment_app_type: DeploymentAppType,
    pub release_mode: ReleaseMode,
    /// GitOps repository, when one is configured
    pub repo_url: Option<String>,
    pub target_revision: Option<String>,
    /// Repository was supplied by the user rather than created by the platform
    #[serde(default)]
    pub custom_repo: bool,
}

impl DeploymentConfig {
    pub fn requires_custom_repo_validation(&self) -> bool {
        self.deployment_app_type.is_gitops() && self.custom_repo
    }
}
