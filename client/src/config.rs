//! Client configuration
//!
//! YAML-backed configuration with serde defaults for every field, so an
//! empty document (or a missing default file) yields a usable config. The
//! API tunables feed the provider retry loop and are validated up front:
//! a retry budget of zero attempts or a zero timeout is a configuration
//! error, not something the pipeline discovers per call.

use std::path::Path;
use std::time::Duration;

use polaris_core::{ClientError, Result};
use serde::{Deserialize, Serialize};

/// Environment variable pointing at the default config file
pub const CONFIG_PATH_ENV: &str = "POLARIS_CONFIG";

/// Fallback default config file path
pub const DEFAULT_CONFIG_FILE: &str = "./polaris.yaml";

/// Root configuration for an embedded client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Process-wide settings
    pub global: GlobalConfig,
    /// Consumer-side plugin selection
    pub consumer: ConsumerConfig,
}

/// Process-wide settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalConfig {
    /// Provider API tunables
    pub api: ApiConfig,
    /// Control-plane connector settings
    pub server_connector: ServerConnectorConfig,
}

/// Provider API tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    /// Default per-call budget in milliseconds when the request omits one
    pub timeout: u64,
    /// Attempts per provider call; must be >= 1
    pub max_retry_times: u32,
    /// Cap on the inter-attempt sleep in milliseconds
    pub retry_interval: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout: 1000,
            max_retry_times: 3,
            retry_interval: 100,
        }
    }
}

impl ApiConfig {
    /// Default per-call budget
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Cap on the inter-attempt sleep
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval)
    }
}

/// Control-plane connector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConnectorConfig {
    /// Control-plane addresses, `host:port`
    pub addresses: Vec<String>,
    /// Connector plugin name
    pub plugin: String,
}

impl Default for ServerConnectorConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["127.0.0.1:8090".to_string()],
            plugin: crate::plugin::DEFAULT_SERVER_CONNECTOR.to_string(),
        }
    }
}

/// Consumer-side plugin selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsumerConfig {
    /// Local registry plugin name
    pub local_registry: String,
    /// Router chain, applied in order
    pub service_router: ChainConfig,
    /// Load balancer selection
    pub load_balancer: LoadBalancerConfig,
    /// Circuit breaker chain
    pub circuit_breaker: ChainConfig,
    /// Outlier detection settings
    pub outlier_detection: OutlierDetectionConfig,
    /// Weight adjuster plugin name
    pub weight_adjuster: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            local_registry: crate::plugin::DEFAULT_LOCAL_REGISTRY.to_string(),
            service_router: ChainConfig {
                chain: vec![crate::plugin::HEALTH_ROUTER.to_string()],
            },
            load_balancer: LoadBalancerConfig::default(),
            circuit_breaker: ChainConfig {
                chain: vec![crate::plugin::ERROR_COUNT_CIRCUIT_BREAKER.to_string()],
            },
            outlier_detection: OutlierDetectionConfig::default(),
            weight_adjuster: crate::plugin::DEFAULT_WEIGHT_ADJUSTER.to_string(),
        }
    }
}

/// An ordered list of plugin names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainConfig {
    /// Plugin names, applied in order
    pub chain: Vec<String>,
}

/// Load balancer selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalancerConfig {
    /// Load balancer plugin name
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            kind: crate::plugin::WEIGHTED_RANDOM_LOAD_BALANCER.to_string(),
        }
    }
}

/// Outlier detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutlierDetectionConfig {
    /// Whether active probing runs at all
    pub enable: bool,
    /// Detector chain, applied in order per instance
    pub chain: Vec<String>,
}

impl Default for OutlierDetectionConfig {
    fn default() -> Self {
        Self {
            enable: false,
            chain: vec![crate::plugin::TCP_OUTLIER_DETECTOR.to_string()],
        }
    }
}

impl ClientConfig {
    /// Parse a config from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(content)
            .map_err(|e| ClientError::InvalidConfig(format!("parse yaml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::InvalidConfig(format!("read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Load the default config file, falling back to built-in defaults
    ///
    /// Reads `$POLARIS_CONFIG` when set, else [`DEFAULT_CONFIG_FILE`]. A
    /// missing file is not an error; a present-but-invalid file is.
    pub fn with_default_file() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            tracing::info!(path = %path, "no config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Check the invariants the rest of the client relies on
    pub fn validate(&self) -> Result<()> {
        if self.global.api.max_retry_times == 0 {
            return Err(ClientError::InvalidConfig(
                "api.maxRetryTimes must be >= 1".to_string(),
            ));
        }
        if self.global.api.timeout == 0 {
            return Err(ClientError::InvalidConfig(
                "api.timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.global.api.timeout(), Duration::from_millis(1000));
        assert_eq!(config.global.api.max_retry_times, 3);
        assert_eq!(
            config.global.api.retry_interval(),
            Duration::from_millis(100)
        );
        assert!(!config.consumer.outlier_detection.enable);
    }

    #[test]
    fn parses_camel_case_keys() {
        let yaml = r#"
global:
  api:
    timeout: 500
    maxRetryTimes: 5
    retryInterval: 50
  serverConnector:
    addresses: ["10.0.0.1:8090", "10.0.0.2:8090"]
consumer:
  loadBalancer:
    type: ringHash
  outlierDetection:
    enable: true
    chain: [tcp, http]
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.global.api.timeout, 500);
        assert_eq!(config.global.api.max_retry_times, 5);
        assert_eq!(config.global.api.retry_interval, 50);
        assert_eq!(config.global.server_connector.addresses.len(), 2);
        assert_eq!(config.consumer.load_balancer.kind, "ringHash");
        assert!(config.consumer.outlier_detection.enable);
        assert_eq!(config.consumer.outlier_detection.chain, vec!["tcp", "http"]);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = ClientConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn zero_retry_times_is_rejected() {
        let yaml = "global:\n  api:\n    maxRetryTimes: 0\n";
        let err = ClientConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));
        assert!(err.to_string().contains("maxRetryTimes"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let yaml = "global:\n  api:\n    timeout: 0\n";
        let err = ClientConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let err = ClientConfig::from_yaml("global: [not a map").unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));
    }
}
