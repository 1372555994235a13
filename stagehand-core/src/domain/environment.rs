//! Environment and application domain types

use serde::{Deserialize, Serialize};

/// Deployment target: a namespace on a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: i64,
    pub name: String,
    pub namespace: String,
    pub cluster_id: i64,
    /// Cluster name, absent when the cluster record was not joined
    pub cluster_name: Option<String>,
}

/// Application owning CI and CD pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: i64,
    pub name: String,
}

/// Key/value label attached to an app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppLabel {
    pub key: String,
    pub value: String,
}
