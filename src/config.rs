//! Configuration loading and types for the `azsdk` tool.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection supplies the endpoint and credential
//! material for one service family; every section may be omitted.

use serde::Deserialize;
use std::path::Path;

use crate::pipeline::RetryOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry and timeout settings shared by every client.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Storage account settings (files, blobs, Data Lake, change feed).
    #[serde(default)]
    pub storage: StorageConfig,

    /// Schema Registry settings.
    #[serde(default)]
    pub schema_registry: SchemaRegistryConfig,

    /// Language service settings (text analytics, conversations).
    #[serde(default)]
    pub language: CognitiveConfig,

    /// Form Recognizer settings.
    #[serde(default)]
    pub form_recognizer: CognitiveConfig,

    /// Service Bus settings.
    #[serde(default)]
    pub service_bus: ServiceBusConfig,

    /// Resource Manager settings (Application Insights).
    #[serde(default)]
    pub management: ManagementConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Retry configuration, converted into [`RetryOptions`] for each pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryConfig {
    pub fn to_options(&self) -> RetryOptions {
        RetryOptions {
            max_retries: self.max_retries,
            initial_backoff: std::time::Duration::from_millis(self.initial_backoff_ms),
            max_backoff: std::time::Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Storage account configuration.
///
/// Either `connection_string`, or `account` plus one of `account_key` /
/// `sas_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub account: String,

    /// Base64 account key.
    #[serde(default)]
    pub account_key: String,

    #[serde(default)]
    pub sas_token: String,

    /// Full storage connection string; overrides the fields above.
    #[serde(default)]
    pub connection_string: String,

    #[serde(default = "default_endpoint_suffix")]
    pub endpoint_suffix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            account_key: String::new(),
            sas_token: String::new(),
            connection_string: String::new(),
            endpoint_suffix: default_endpoint_suffix(),
        }
    }
}

/// Schema Registry configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaRegistryConfig {
    /// Fully qualified namespace, e.g. `myns.servicebus.windows.net`.
    #[serde(default)]
    pub namespace: String,

    /// Pre-acquired bearer token.
    #[serde(default)]
    pub token: String,
}

/// Endpoint and subscription key of a Cognitive Services resource.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CognitiveConfig {
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub key: String,
}

/// Service Bus configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceBusConfig {
    #[serde(default)]
    pub connection_string: String,
}

/// Resource Manager configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagementConfig {
    #[serde(default)]
    pub subscription_id: String,

    /// Pre-acquired bearer token.
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_management_endpoint")]
    pub endpoint: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            token: String::new(),
            endpoint: default_management_endpoint(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    800
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_endpoint_suffix() -> String {
    "core.windows.net".to_string()
}

fn default_management_endpoint() -> String {
    crate::mgmt::ARM_ENDPOINT.to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.storage.endpoint_suffix, "core.windows.net");
        assert!(config.service_bus.connection_string.is_empty());
        assert_eq!(config.management.endpoint, "https://management.azure.com");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "logging:\n  format: json\nretry:\n  max_retries: 5\n  initial_backoff_ms: 10\nstorage:\n  account: acct\n  account_key: dGVzdA==\nlanguage:\n  endpoint: https://lang.example.com\n  key: k"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.storage.account, "acct");
        assert_eq!(config.language.endpoint, "https://lang.example.com");

        let retry = config.retry.to_options();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_backoff, std::time::Duration::from_millis(10));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config("/nonexistent/azsdk.yaml").is_err());
    }
}
