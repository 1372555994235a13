//! Container registry domain types

use serde::{Deserialize, Serialize};

/// Registry vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryType {
    Ecr,
    DockerHub,
    Gcr,
    Acr,
    ArtifactRegistry,
    Quay,
    Other,
}

/// TLS settings for talking to a registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConnection {
    /// `secure`, `insecure` or `secure-with-cert`
    pub connection: String,
    #[serde(default)]
    pub cert: String,
}

/// Effective registry configuration and credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    pub registry_id: String,
    pub registry_url: String,
    pub registry_type: RegistryType,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub aws_region: String,
    #[serde(default)]
    pub aws_access_key_id: String,
    #[serde(default)]
    pub aws_secret_access_key: String,
    #[serde(default)]
    pub connection: RegistryConnection,
    /// Repository the pipeline pushes to, when known
    #[serde(default)]
    pub docker_repository: String,
}

impl RegistryConfig {
    /// Registry host without the http(s) scheme
    pub fn host(&self) -> &str {
        self.registry_url
            .strip_prefix("https://")
            .or_else(|| self.registry_url.strip_prefix("http://"))
            .unwrap_or(&self.registry_url)
            .trim_end_matches('/')
    }
}
