//! Provider request value objects
//!
//! The three provider operations share the same addressing scheme: a service
//! identity (`namespace`, `name`, `token`) plus either a `host:port` endpoint
//! or, for deregister/heartbeat, the control-plane assigned instance id. The
//! provider pipeline validates these before any network traffic.

use std::collections::HashMap;
use std::time::Duration;

/// Request to register the calling process as a service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRegisterRequest {
    /// Namespace of the service being provided
    pub service_namespace: String,
    /// Name of the service being provided
    pub service_name: String,
    /// Token authorizing writes to the service
    pub service_token: String,
    /// Host the instance listens on
    pub host: String,
    /// Port the instance listens on; must be in [1, 65535]
    pub port: u16,
    /// Static weight; control-plane default when absent
    pub weight: Option<u32>,
    /// Instance labels published to consumers
    pub metadata: HashMap<String, String>,
    /// Heartbeat TTL in seconds; enables server-side health checking
    pub ttl_seconds: Option<u32>,
    /// Per-call budget override; the configured default applies when absent
    pub timeout: Option<Duration>,
}

impl InstanceRegisterRequest {
    /// Create a register request with the mandatory fields
    pub fn new(
        namespace: impl Into<String>,
        service: impl Into<String>,
        token: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_namespace: namespace.into(),
            service_name: service.into(),
            service_token: token.into(),
            host: host.into(),
            port,
            weight: None,
            metadata: HashMap::new(),
            ttl_seconds: None,
            timeout: None,
        }
    }

    /// Set the static weight
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Add an instance label
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Enable server-side health checking with the given TTL
    pub fn with_ttl(mut self, ttl_seconds: u32) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    /// Override the per-call timeout budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Request to remove a previously registered instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDeregisterRequest {
    /// Namespace of the service
    pub service_namespace: String,
    /// Name of the service
    pub service_name: String,
    /// Token authorizing writes to the service
    pub service_token: String,
    /// Control-plane assigned id; when set, host/port are ignored
    pub instance_id: Option<String>,
    /// Host, used when no instance id is given
    pub host: String,
    /// Port, used when no instance id is given
    pub port: u16,
    /// Per-call budget override
    pub timeout: Option<Duration>,
}

impl InstanceDeregisterRequest {
    /// Address the instance by `host:port`
    pub fn new(
        namespace: impl Into<String>,
        service: impl Into<String>,
        token: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_namespace: namespace.into(),
            service_name: service.into(),
            service_token: token.into(),
            instance_id: None,
            host: host.into(),
            port,
            timeout: None,
        }
    }

    /// Address the instance by its control-plane id
    pub fn with_instance_id(
        namespace: impl Into<String>,
        service: impl Into<String>,
        token: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            service_namespace: namespace.into(),
            service_name: service.into(),
            service_token: token.into(),
            instance_id: Some(instance_id.into()),
            host: String::new(),
            port: 0,
            timeout: None,
        }
    }

    /// Override the per-call timeout budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Request to refresh the liveness of a registered instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHeartbeatRequest {
    /// Namespace of the service
    pub service_namespace: String,
    /// Name of the service
    pub service_name: String,
    /// Token authorizing writes to the service
    pub service_token: String,
    /// Control-plane assigned id; when set, host/port are ignored
    pub instance_id: Option<String>,
    /// Host, used when no instance id is given
    pub host: String,
    /// Port, used when no instance id is given
    pub port: u16,
    /// Per-call budget override
    pub timeout: Option<Duration>,
}

impl InstanceHeartbeatRequest {
    /// Address the instance by `host:port`
    pub fn new(
        namespace: impl Into<String>,
        service: impl Into<String>,
        token: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_namespace: namespace.into(),
            service_name: service.into(),
            service_token: token.into(),
            instance_id: None,
            host: host.into(),
            port,
            timeout: None,
        }
    }

    /// Address the instance by its control-plane id
    pub fn with_instance_id(
        namespace: impl Into<String>,
        service: impl Into<String>,
        token: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            service_namespace: namespace.into(),
            service_name: service.into(),
            service_token: token.into(),
            instance_id: Some(instance_id.into()),
            host: String::new(),
            port: 0,
            timeout: None,
        }
    }

    /// Override the per-call timeout budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_builder() {
        let req = InstanceRegisterRequest::new("ns", "svc", "token", "10.0.0.1", 8080)
            .with_weight(50)
            .with_metadata("zone", "eu-1a")
            .with_ttl(5)
            .with_timeout(Duration::from_millis(200));

        assert_eq!(req.weight, Some(50));
        assert_eq!(req.metadata.get("zone").map(String::as_str), Some("eu-1a"));
        assert_eq!(req.ttl_seconds, Some(5));
        assert_eq!(req.timeout, Some(Duration::from_millis(200)));
    }

    #[test]
    fn deregister_by_id_clears_endpoint() {
        let req = InstanceDeregisterRequest::with_instance_id("ns", "svc", "token", "i-42");
        assert_eq!(req.instance_id.as_deref(), Some("i-42"));
        assert!(req.host.is_empty());
        assert_eq!(req.port, 0);
    }

    #[test]
    fn heartbeat_defaults_have_no_timeout() {
        let req = InstanceHeartbeatRequest::new("ns", "svc", "token", "10.0.0.1", 8080);
        assert!(req.timeout.is_none());
        assert!(req.instance_id.is_none());
    }
}
