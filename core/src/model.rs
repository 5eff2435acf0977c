//! Service and instance model shared across the client

use std::collections::HashMap;
use std::fmt;

/// Identity of a service on the control plane
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    /// Namespace the service lives in
    pub namespace: String,
    /// Service name, unique within the namespace
    pub name: String,
}

impl ServiceKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A single service instance as cached by the local registry
///
/// `healthy` reflects the latest outlier-detection verdict; `isolated` is the
/// operator-driven flag from the control plane. Routers filter on both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Control-plane assigned instance id
    pub id: String,
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Static weight configured on the control plane
    pub weight: u32,
    /// Latest health verdict
    pub healthy: bool,
    /// Operator isolation flag
    pub isolated: bool,
    /// Free-form labels (region, zone, version, ...)
    pub metadata: HashMap<String, String>,
}

impl Instance {
    /// Create a healthy, non-isolated instance with the default weight
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            weight: 100,
            healthy: true,
            isolated: false,
            metadata: HashMap::new(),
        }
    }

    /// Set the static weight
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the health flag
    pub fn with_healthy(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    /// Set the isolation flag
    pub fn with_isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    /// Add a metadata label
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `host:port` endpoint string
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Cached instance snapshot for one service
///
/// Snapshots are immutable once published; the local registry replaces the
/// whole value on every discovery push and bumps `revision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstances {
    /// Which service this snapshot belongs to
    pub key: ServiceKey,
    /// Monotonically increasing snapshot revision
    pub revision: u64,
    /// The instances themselves
    pub instances: Vec<Instance>,
}

impl ServiceInstances {
    /// Create a snapshot at revision 0
    pub fn new(key: ServiceKey, instances: Vec<Instance>) -> Self {
        Self {
            key,
            revision: 0,
            instances,
        }
    }

    /// Create a snapshot at an explicit revision
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Instances that are healthy and not isolated
    pub fn available(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter().filter(|i| i.healthy && !i.isolated)
    }
}
