//! Plugin trait surface
//!
//! Every stage of the discovery pipeline is an interchangeable plugin behind
//! one of the category traits below. Factories are static
//! [`PluginDescriptor`]s: the category (and, for load balancers, the
//! algorithm) is a property of the descriptor itself, so the registry never
//! has to instantiate a plugin just to classify it. Constructing a plugin
//! yields a typed [`PluginInstance`], which keeps the registry free of
//! downcasts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ReturnCode, Result};
use crate::model::{Instance, ServiceInstances, ServiceKey};
use crate::request::{
    InstanceDeregisterRequest, InstanceHeartbeatRequest, InstanceRegisterRequest,
};

/// Pipeline categories a plugin can implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginType {
    /// RPCs to the control plane
    ServerConnector,
    /// Client-side cache of discovered instances
    LocalRegistry,
    /// Instance filtering before load balancing
    ServiceRouter,
    /// Instance selection
    LoadBalancer,
    /// Per-instance failure accounting and isolation
    CircuitBreaker,
    /// Active health probing
    OutlierDetector,
    /// Dynamic weight computation
    WeightAdjuster,
    /// API call statistics sink
    StatReporter,
    /// Operational alert sink
    AlertReporter,
}

impl PluginType {
    /// Stable label used in registry keys and log fields
    pub fn as_str(self) -> &'static str {
        match self {
            PluginType::ServerConnector => "ServerConnector",
            PluginType::LocalRegistry => "LocalRegistry",
            PluginType::ServiceRouter => "ServiceRouter",
            PluginType::LoadBalancer => "LoadBalancer",
            PluginType::CircuitBreaker => "CircuitBreaker",
            PluginType::OutlierDetector => "OutlierDetector",
            PluginType::WeightAdjuster => "WeightAdjuster",
            PluginType::StatReporter => "StatReporter",
            PluginType::AlertReporter => "AlertReporter",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of load-balance algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadBalanceType {
    /// Weight-proportional random pick (the default)
    WeightedRandom,
    /// Ketama consistent hash ring
    RingHash,
    /// Maglev lookup table
    Maglev,
    /// L5 cluster consistent hash
    L5CstHash,
    /// `hash % n` over the instance list
    SimpleHash,
    /// The L5 cluster hash in its murmur-flagged mode
    CMurmurHash,
}

/// Which client API a stat record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    /// `ProviderApi::register`
    ProviderRegister,
    /// `ProviderApi::deregister`
    ProviderDeregister,
    /// `ProviderApi::heartbeat`
    ProviderHeartbeat,
}

impl ApiKind {
    /// Stable label used as a metric dimension
    pub fn as_str(self) -> &'static str {
        match self {
            ApiKind::ProviderRegister => "provider_register",
            ApiKind::ProviderDeregister => "provider_deregister",
            ApiKind::ProviderHeartbeat => "provider_heartbeat",
        }
    }
}

/// Severity of an operational alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// Degraded but functional
    Warn,
    /// Requires attention
    Error,
}

/// Caller-supplied hints for routing and load balancing
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    /// Key for hash-based balancers; same key maps to the same instance
    pub hash_key: Option<String>,
    /// Caller labels matched by metadata-aware routers
    pub metadata: HashMap<String, String>,
}

/// Verdict of a single outlier-detection probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectResult {
    /// Whether the instance answered the probe
    pub healthy: bool,
    /// How long the probe took
    pub elapsed: Duration,
}

/// Base capability shared by every plugin
pub trait Plugin: Send + Sync {
    /// Short name for logging; matches the registry name for defaults
    fn name(&self) -> &'static str;
}

/// Synchronous RPCs to the control plane
///
/// Implementations must return within the caller-supplied timeout and
/// classify faults onto the [`crate::ReturnCode`] taxonomy: transport faults
/// and individual RPC timeouts map to `NetworkFailed`, transient server
/// faults to `ServerError`, everything else to a terminal code.
#[async_trait]
pub trait ServerConnector: Plugin {
    /// Register an instance; returns the control-plane assigned id
    async fn register_instance(
        &self,
        req: &InstanceRegisterRequest,
        timeout: Duration,
    ) -> Result<String>;

    /// Remove an instance
    async fn deregister_instance(
        &self,
        req: &InstanceDeregisterRequest,
        timeout: Duration,
    ) -> Result<()>;

    /// Refresh an instance's liveness
    async fn instance_heartbeat(
        &self,
        req: &InstanceHeartbeatRequest,
        timeout: Duration,
    ) -> Result<()>;
}

/// Client-side cache of discovered instances
pub trait LocalRegistry: Plugin {
    /// Current snapshot for a service, if one has been published
    fn instances(&self, key: &ServiceKey) -> Option<ServiceInstances>;

    /// Replace a service's snapshot
    ///
    /// Implementations run the registered pre-update handler chain against
    /// the old and new instance collections before the swap becomes visible.
    fn update_instances(&self, snapshot: ServiceInstances);

    /// Flip the health flag on one cached instance
    ///
    /// Returns false when the service or instance is unknown.
    fn set_instance_healthy(&self, key: &ServiceKey, instance_id: &str, healthy: bool) -> bool;
}

/// Instance filtering stage run before load balancing
pub trait ServiceRouter: Plugin {
    /// Narrow the candidate set; must not invent instances
    fn route(&self, criteria: &Criteria, instances: Vec<Instance>) -> Vec<Instance>;
}

/// Instance selection stage
pub trait LoadBalancer: Plugin {
    /// Which algorithm this balancer implements
    fn load_balance_type(&self) -> LoadBalanceType;

    /// Pick one instance from the routed candidates
    fn choose_instance(&self, criteria: &Criteria, instances: &[Instance]) -> Option<Instance>;
}

/// Per-instance failure accounting and isolation
pub trait CircuitBreaker: Plugin {
    /// Feed one call outcome into the breaker
    fn report_outcome(&self, instance_id: &str, success: bool);

    /// Whether calls to the instance are currently allowed
    fn allow(&self, instance_id: &str) -> bool;

    /// Time-based state transitions; driven by the circuit-breaker executor
    fn periodic_check(&self);
}

/// Active health probe
#[async_trait]
pub trait OutlierDetector: Plugin {
    /// Probe one instance; `Err` means the probe itself could not run
    async fn detect_instance(&self, instance: &Instance) -> Result<DetectResult>;
}

/// Dynamic weight computation on top of the static weight
pub trait WeightAdjuster: Plugin {
    /// Effective weight for the instance
    fn dynamic_weight(&self, instance: &Instance) -> u32;
}

/// Sink for per-call API statistics
pub trait StatReporter: Plugin {
    /// Record one finished API call
    fn report_api_call(&self, api: ApiKind, code: ReturnCode, latency: Duration);
}

/// Sink for operational alerts
pub trait AlertReporter: Plugin {
    /// Emit one alert
    fn report_alert(&self, level: AlertLevel, message: &str);
}

/// Callback invoked before a service's instance snapshot is replaced
pub trait InstancePreUpdateHandler: Send + Sync {
    /// Observe the old and new instance collections
    fn on_instance_update(&self, old: &[Instance], new: &[Instance]);
}

/// A freshly constructed plugin, typed by category
pub enum PluginInstance {
    /// Control-plane connector
    ServerConnector(Arc<dyn ServerConnector>),
    /// Instance cache
    LocalRegistry(Arc<dyn LocalRegistry>),
    /// Routing stage
    ServiceRouter(Arc<dyn ServiceRouter>),
    /// Selection stage
    LoadBalancer(Arc<dyn LoadBalancer>),
    /// Failure isolation
    CircuitBreaker(Arc<dyn CircuitBreaker>),
    /// Active probing
    OutlierDetector(Arc<dyn OutlierDetector>),
    /// Weight computation
    WeightAdjuster(Arc<dyn WeightAdjuster>),
    /// Statistics sink
    StatReporter(Arc<dyn StatReporter>),
    /// Alert sink
    AlertReporter(Arc<dyn AlertReporter>),
}

impl PluginInstance {
    /// Category of the wrapped plugin
    pub fn plugin_type(&self) -> PluginType {
        match self {
            PluginInstance::ServerConnector(_) => PluginType::ServerConnector,
            PluginInstance::LocalRegistry(_) => PluginType::LocalRegistry,
            PluginInstance::ServiceRouter(_) => PluginType::ServiceRouter,
            PluginInstance::LoadBalancer(_) => PluginType::LoadBalancer,
            PluginInstance::CircuitBreaker(_) => PluginType::CircuitBreaker,
            PluginInstance::OutlierDetector(_) => PluginType::OutlierDetector,
            PluginInstance::WeightAdjuster(_) => PluginType::WeightAdjuster,
            PluginInstance::StatReporter(_) => PluginType::StatReporter,
            PluginInstance::AlertReporter(_) => PluginType::AlertReporter,
        }
    }

    /// Name of the wrapped plugin
    pub fn name(&self) -> &'static str {
        match self {
            PluginInstance::ServerConnector(p) => p.name(),
            PluginInstance::LocalRegistry(p) => p.name(),
            PluginInstance::ServiceRouter(p) => p.name(),
            PluginInstance::LoadBalancer(p) => p.name(),
            PluginInstance::CircuitBreaker(p) => p.name(),
            PluginInstance::OutlierDetector(p) => p.name(),
            PluginInstance::WeightAdjuster(p) => p.name(),
            PluginInstance::StatReporter(p) => p.name(),
            PluginInstance::AlertReporter(p) => p.name(),
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("plugin_type", &self.plugin_type())
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Debug for dyn LoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("name", &self.name())
            .field("load_balance_type", &self.load_balance_type())
            .finish()
    }
}

/// Factory function producing a fresh plugin instance per call
pub type PluginConstructor = fn() -> PluginInstance;

/// Static description of a registrable plugin
///
/// Two descriptors are considered the same registration when their
/// `construct` pointers are equal; re-registering an identical descriptor is
/// idempotent.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    /// Registry name; paired with `plugin_type` it must be unique
    pub name: &'static str,
    /// Category the constructor produces
    pub plugin_type: PluginType,
    /// Algorithm, for `LoadBalancer` descriptors only
    pub load_balance: Option<LoadBalanceType>,
    /// The factory itself
    pub construct: PluginConstructor,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("plugin_type", &self.plugin_type)
            .field("load_balance", &self.load_balance)
            .finish()
    }
}
