use crate::variant_deriver::VariantDescriptor;
use anyhow::{bail, ensure};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// SigV4 presigned URLs are valid for at most one week
const MAX_PRESIGNED_URL_EXPIRY_SECS: u64 = 7 * 24 * 3600;

/// Main configuration for the asset service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object store configuration
    pub s3: S3Config,
    /// Variant and listing configuration
    #[serde(default)]
    pub assets: AssetsConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Which object store implementation backs the service
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    S3,
    Memory,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Store implementation
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// S3 bucket name for asset storage
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Upper bound for any single store call
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

/// Variant descriptors and group behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    /// Ordered variant descriptors; labels become key prefixes
    #[serde(default = "default_variants")]
    pub variants: Vec<VariantDescriptor>,
    /// Label whose prefix is scanned to enumerate assets
    #[serde(default = "default_list_label")]
    pub list_label: String,
    /// Label handed out by the signed original URL operation
    #[serde(default = "default_original_label")]
    pub original_label: String,
    /// Max in-flight signing calls while listing
    #[serde(default = "default_sign_concurrency")]
    pub sign_concurrency: usize,
    /// Delete the whole group when any variant write fails
    #[serde(default)]
    pub rollback_on_partial_failure: bool,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Largest accepted request body (base64 images are big)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "asset-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_backend() -> StoreBackend {
    StoreBackend::S3
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    900 // 15 minutes
}

fn default_operation_timeout_secs() -> u64 {
    30
}

pub fn default_variants() -> Vec<VariantDescriptor> {
    vec![
        VariantDescriptor::new(1.0, "original_size"),
        VariantDescriptor::new(0.5, "50%_resize"),
        VariantDescriptor::new(0.25, "25%_resize"),
        VariantDescriptor::new(0.1, "10%_resize"),
    ]
}

fn default_list_label() -> String {
    "25%_resize".to_string()
}

fn default_original_label() -> String {
    "original_size".to_string()
}

fn default_sign_concurrency() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024 // 25MB
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "asset-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/assets").required(false))
            .add_source(config::File::with_name("/etc/assets/assets").required(false))
            // Override with environment variables
            // ASSETS__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("ASSETS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break key naming or group membership
    pub fn validate(&self) -> anyhow::Result<()> {
        self.assets.validate()?;
        ensure!(!self.s3.bucket.is_empty(), "s3.bucket must not be empty");
        ensure!(
            (1..=MAX_PRESIGNED_URL_EXPIRY_SECS).contains(&self.s3.presigned_url_expiry_secs),
            "s3.presigned_url_expiry_secs must be between 1 and {}",
            MAX_PRESIGNED_URL_EXPIRY_SECS
        );
        ensure!(
            self.s3.operation_timeout_secs > 0,
            "s3.operation_timeout_secs must be positive"
        );
        Ok(())
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.presigned_url_expiry_secs)
    }

    /// Get per-call store timeout as Duration
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.s3.operation_timeout_secs)
    }
}

impl AssetsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.variants.is_empty(), "assets.variants must not be empty");

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if variant.label.is_empty() || variant.label.contains('/') {
                bail!("invalid variant label {:?}", variant.label);
            }
            if !(variant.ratio > 0.0 && variant.ratio <= 1.0) {
                bail!(
                    "variant {:?} has ratio {} outside (0, 1]",
                    variant.label,
                    variant.ratio
                );
            }
            if !seen.insert(variant.label.as_str()) {
                bail!("duplicate variant label {:?}", variant.label);
            }
        }

        for (field, label) in [
            ("assets.list_label", &self.list_label),
            ("assets.original_label", &self.original_label),
        ] {
            ensure!(
                seen.contains(label.as_str()),
                "{} {:?} is not a configured variant",
                field,
                label
            );
        }

        ensure!(
            self.sign_concurrency > 0,
            "assets.sign_concurrency must be positive"
        );
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            list_label: default_list_label(),
            original_label: default_original_label(),
            sign_concurrency: default_sign_concurrency(),
            rollback_on_partial_failure: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
