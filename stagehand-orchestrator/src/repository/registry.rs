//! Container registry lookups

use anyhow::Result;
use async_trait::async_trait;
use stagehand_core::domain::registry::RegistryConfig;

#[async_trait]
pub trait RegistryRepository: Send + Sync {
    /// Global registry record by id
    async fn find_registry(&self, registry_id: &str) -> Result<Option<RegistryConfig>>;

    /// Registry a CI pipeline builds into
    ///
    /// With `overridden` set the pipeline-level override is returned,
    /// otherwise the app-level build configuration.
    async fn find_applied_config(
        &self,
        ci_pipeline_id: i64,
        app_id: i64,
        overridden: bool,
    ) -> Result<Option<RegistryConfig>>;

    /// App-level build configuration
    async fn find_base_config(&self, app_id: i64) -> Result<Option<RegistryConfig>>;
}
