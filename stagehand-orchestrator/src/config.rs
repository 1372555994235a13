//! Orchestrator configuration
//!
//! Defines the platform defaults used when building stage workflow requests:
//! namespaces, images, timeouts, log and artifact locations, orchestrator
//! callbacks and the blob storage backend.
//!
//! The configuration is built once at startup and shared read-only.

use std::str::FromStr;

use stagehand_core::domain::workflow::ExecutorType;

/// Placeholder for the workflow id in [`OrchestratorConfig::artifact_location_format`]
pub const WORKFLOW_ID_PLACEHOLDER: &str = "{workflow_id}";
/// Placeholder for the runner id in [`OrchestratorConfig::artifact_location_format`]
pub const RUNNER_ID_PLACEHOLDER: &str = "{runner_id}";

/// Blob storage backend for logs and artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudProvider {
    S3,
    Gcp,
    Azure,
    /// Anything else; only usable while blob storage is disabled
    Other(String),
}

impl CloudProvider {
    pub fn as_str(&self) -> &str {
        match self {
            CloudProvider::S3 => "S3",
            CloudProvider::Gcp => "GCP",
            CloudProvider::Azure => "AZURE",
            CloudProvider::Other(name) => name,
        }
    }
}

impl FromStr for CloudProvider {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "S3" => CloudProvider::S3,
            "GCP" => CloudProvider::Gcp,
            "AZURE" => CloudProvider::Azure,
            _ => CloudProvider::Other(s.to_string()),
        })
    }
}

/// S3 (or S3-compatible) credentials and bucket options
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: String,
    pub endpoint_insecure: bool,
    pub bucket_versioned: bool,
}

/// Azure storage account and the S3 gateway in front of it
#[derive(Debug, Clone, Default)]
pub struct AzureSettings {
    pub account_name: String,
    pub account_key: String,
    pub container_ci_log: String,
    pub container_ci_cache: String,
    pub gateway_url: String,
    pub gateway_insecure: bool,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Namespace stage runs use unless the pipeline runs them in its environment
    pub default_namespace: String,

    pub executor_type: ExecutorType,

    /// Runner image for pre/post stage workflows
    pub default_image: String,

    /// Active deadline of a stage workflow, in seconds
    pub default_timeout_secs: u64,

    pub build_logs_key_prefix: String,
    pub build_logs_bucket: String,
    pub cd_logs_bucket_region: String,

    /// Artifact path containing `{workflow_id}` and `{runner_id}`
    pub artifact_location_format: String,

    /// Callback host and token handed to the remote runner
    pub orchestrator_host: String,
    pub orchestrator_token: String,

    pub blob_storage_provider: CloudProvider,
    pub blob_storage_enabled: bool,
    pub s3: S3Settings,
    pub gcp_credentials_json: String,
    pub azure: AzureSettings,

    pub default_address_pool_base_cidr: String,
    pub default_address_pool_size: u32,

    /// Base URL of the workflow execution service
    pub workflow_service_url: String,

    /// Postgres connection string for run and reservation records
    pub database_url: Option<String>,
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            default_namespace: "devtron-cd".to_string(),
            executor_type: ExecutorType::Awf,
            default_image: String::new(),
            default_timeout_secs: 3600,
            build_logs_key_prefix: "arsenal-v1".to_string(),
            build_logs_bucket: "devtron-pro-ci-logs".to_string(),
            cd_logs_bucket_region: "us-east-2".to_string(),
            artifact_location_format: format!(
                "{WORKFLOW_ID_PLACEHOLDER}/{RUNNER_ID_PLACEHOLDER}.zip"
            ),
            orchestrator_host: String::new(),
            orchestrator_token: String::new(),
            blob_storage_provider: CloudProvider::S3,
            blob_storage_enabled: false,
            s3: S3Settings {
                bucket_versioned: true,
                ..S3Settings::default()
            },
            gcp_credentials_json: String::new(),
            azure: AzureSettings::default(),
            default_address_pool_base_cidr: String::new(),
            default_address_pool_size: 0,
            workflow_service_url: "http://localhost:8080".to_string(),
            database_url: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional; unset or unparsable values keep the
    /// defaults of [`OrchestratorConfig::new`].
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let executor_type = match std::env::var("CD_WORKFLOW_EXECUTOR_TYPE") {
            Ok(value) => value
                .parse::<ExecutorType>()
                .map_err(|e| anyhow::anyhow!("CD_WORKFLOW_EXECUTOR_TYPE: {}", e))?,
            Err(_) => defaults.executor_type,
        };

        let blob_storage_provider = std::env::var("BLOB_STORAGE_PROVIDER")
            .ok()
            .and_then(|s| s.parse::<CloudProvider>().ok())
            .unwrap_or(defaults.blob_storage_provider);

        Ok(Self {
            default_namespace: env_string("CD_DEFAULT_NAMESPACE", defaults.default_namespace),
            executor_type,
            default_image: env_string("CD_DEFAULT_IMAGE", defaults.default_image),
            default_timeout_secs: env_parsed("CD_DEFAULT_TIMEOUT", defaults.default_timeout_secs),
            build_logs_key_prefix: env_string(
                "CD_DEFAULT_BUILD_LOGS_KEY_PREFIX",
                defaults.build_logs_key_prefix,
            ),
            build_logs_bucket: env_string("CD_DEFAULT_BUILD_LOGS_BUCKET", defaults.build_logs_bucket),
            cd_logs_bucket_region: env_string(
                "CD_DEFAULT_CD_LOGS_BUCKET_REGION",
                defaults.cd_logs_bucket_region,
            ),
            artifact_location_format: env_string(
                "CD_ARTIFACT_LOCATION_FORMAT",
                defaults.artifact_location_format,
            ),
            orchestrator_host: env_string("ORCH_HOST", defaults.orchestrator_host),
            orchestrator_token: env_string("ORCH_TOKEN", defaults.orchestrator_token),
            blob_storage_provider,
            blob_storage_enabled: env_parsed("BLOB_STORAGE_ENABLED", defaults.blob_storage_enabled),
            s3: S3Settings {
                access_key: env_string("BLOB_STORAGE_S3_ACCESS_KEY", defaults.s3.access_key),
                secret_key: env_string("BLOB_STORAGE_S3_SECRET_KEY", defaults.s3.secret_key),
                endpoint: env_string("BLOB_STORAGE_S3_ENDPOINT", defaults.s3.endpoint),
                endpoint_insecure: env_parsed(
                    "BLOB_STORAGE_S3_ENDPOINT_INSECURE",
                    defaults.s3.endpoint_insecure,
                ),
                bucket_versioned: env_parsed(
                    "BLOB_STORAGE_S3_BUCKET_VERSIONED",
                    defaults.s3.bucket_versioned,
                ),
            },
            gcp_credentials_json: env_string(
                "BLOB_STORAGE_GCP_CREDENTIALS_JSON",
                defaults.gcp_credentials_json,
            ),
            azure: AzureSettings {
                account_name: env_string("AZURE_ACCOUNT_NAME", defaults.azure.account_name),
                account_key: env_string("AZURE_ACCOUNT_KEY", defaults.azure.account_key),
                container_ci_log: env_string(
                    "AZURE_BLOB_CONTAINER_CI_LOG",
                    defaults.azure.container_ci_log,
                ),
                container_ci_cache: env_string(
                    "AZURE_BLOB_CONTAINER_CI_CACHE",
                    defaults.azure.container_ci_cache,
                ),
                gateway_url: env_string("AZURE_GATEWAY_URL", defaults.azure.gateway_url),
                gateway_insecure: env_parsed(
                    "AZURE_GATEWAY_CONNECTION_INSECURE",
                    defaults.azure.gateway_insecure,
                ),
            },
            default_address_pool_base_cidr: env_string(
                "CD_DEFAULT_ADDRESS_POOL_BASE_CIDR",
                defaults.default_address_pool_base_cidr,
            ),
            default_address_pool_size: env_parsed(
                "CD_DEFAULT_ADDRESS_POOL_SIZE",
                defaults.default_address_pool_size,
            ),
            workflow_service_url: env_string("WORKFLOW_SERVICE_URL", defaults.workflow_service_url),
            database_url: std::env::var("DATABASE_URL").ok().or(defaults.database_url),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_namespace.is_empty() {
            anyhow::bail!("default_namespace cannot be empty");
        }

        if self.default_timeout_secs == 0 {
            anyhow::bail!("default_timeout_secs must be greater than 0");
        }

        if !self.workflow_service_url.starts_with("http://")
            && !self.workflow_service_url.starts_with("https://")
        {
            anyhow::bail!("workflow_service_url must start with http:// or https://");
        }

        if !self.artifact_location_format.contains(WORKFLOW_ID_PLACEHOLDER)
            || !self.artifact_location_format.contains(RUNNER_ID_PLACEHOLDER)
        {
            anyhow::bail!(
                "artifact_location_format must contain {} and {}",
                WORKFLOW_ID_PLACEHOLDER,
                RUNNER_ID_PLACEHOLDER
            );
        }

        Ok(())
    }

    /// Artifact path of a run, relative to the artifact bucket
    pub fn artifact_location(&self, workflow_id: i64, runner_id: i64) -> String {
        self.artifact_location_format
            .replace(WORKFLOW_ID_PLACEHOLDER, &workflow_id.to_string())
            .replace(RUNNER_ID_PLACEHOLDER, &runner_id.to_string())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
