//! Default plugin implementations
//!
//! One default per category plus the load-balancer variants, registered
//! with the process-wide registry on first touch. Config files select
//! plugins by the name constants below.

pub mod alert_reporter;
pub mod circuit_breaker;
pub mod load_balancer;
pub mod local_registry;
pub mod outlier_detector;
pub mod server_connector;
pub mod service_router;
pub mod stat_reporter;
pub mod weight_adjuster;

use polaris_core::{LoadBalanceType, PluginDescriptor, PluginType};

/// Default control-plane connector (REST naming surface)
pub const DEFAULT_SERVER_CONNECTOR: &str = "http";
/// Default local registry
pub const DEFAULT_LOCAL_REGISTRY: &str = "inMemory";
/// Default stat reporter
pub const DEFAULT_STAT_REPORTER: &str = "prometheus";
/// Default alert reporter
pub const DEFAULT_ALERT_REPORTER: &str = "log";
/// Default weight adjuster
pub const DEFAULT_WEIGHT_ADJUSTER: &str = "static";

/// Health-filtering router
pub const HEALTH_ROUTER: &str = "healthRouter";
/// Metadata-matching router
pub const METADATA_ROUTER: &str = "metadataRouter";
/// Region/zone affinity router
pub const NEARBY_ROUTER: &str = "nearbyRouter";

/// Weight-proportional random balancer (default)
pub const WEIGHTED_RANDOM_LOAD_BALANCER: &str = "weightedRandom";
/// Ketama consistent hash ring
pub const RING_HASH_LOAD_BALANCER: &str = "ringHash";
/// Maglev lookup table
pub const MAGLEV_LOAD_BALANCER: &str = "maglev";
/// L5 cluster consistent hash
pub const L5_CST_HASH_LOAD_BALANCER: &str = "l5CstHash";
/// Plain `hash % n`
pub const SIMPLE_HASH_LOAD_BALANCER: &str = "simpleHash";
/// The L5 cluster hash in its murmur-flagged mode
pub const CMURMUR_LOAD_BALANCER: &str = "cMurmurHash";

/// Consecutive-failure circuit breaker
pub const ERROR_COUNT_CIRCUIT_BREAKER: &str = "errorCount";
/// Windowed error-rate circuit breaker
pub const ERROR_RATE_CIRCUIT_BREAKER: &str = "errorRate";

/// TCP connect probe
pub const TCP_OUTLIER_DETECTOR: &str = "tcp";
/// HTTP GET probe
pub const HTTP_OUTLIER_DETECTOR: &str = "http";
/// UDP echo probe
pub const UDP_OUTLIER_DETECTOR: &str = "udp";

/// The descriptor set seeded into the process-wide registry
pub(crate) fn default_descriptors() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor {
            name: DEFAULT_SERVER_CONNECTOR,
            plugin_type: PluginType::ServerConnector,
            load_balance: None,
            construct: server_connector::http_server_connector,
        },
        PluginDescriptor {
            name: DEFAULT_LOCAL_REGISTRY,
            plugin_type: PluginType::LocalRegistry,
            load_balance: None,
            construct: local_registry::in_memory_registry,
        },
        PluginDescriptor {
            name: DEFAULT_STAT_REPORTER,
            plugin_type: PluginType::StatReporter,
            load_balance: None,
            construct: stat_reporter::prometheus_stat_reporter,
        },
        PluginDescriptor {
            name: DEFAULT_ALERT_REPORTER,
            plugin_type: PluginType::AlertReporter,
            load_balance: None,
            construct: alert_reporter::log_alert_reporter,
        },
        PluginDescriptor {
            name: DEFAULT_WEIGHT_ADJUSTER,
            plugin_type: PluginType::WeightAdjuster,
            load_balance: None,
            construct: weight_adjuster::static_weight_adjuster,
        },
        PluginDescriptor {
            name: HEALTH_ROUTER,
            plugin_type: PluginType::ServiceRouter,
            load_balance: None,
            construct: service_router::health_router,
        },
        PluginDescriptor {
            name: METADATA_ROUTER,
            plugin_type: PluginType::ServiceRouter,
            load_balance: None,
            construct: service_router::metadata_router,
        },
        PluginDescriptor {
            name: NEARBY_ROUTER,
            plugin_type: PluginType::ServiceRouter,
            load_balance: None,
            construct: service_router::nearby_router,
        },
        PluginDescriptor {
            name: WEIGHTED_RANDOM_LOAD_BALANCER,
            plugin_type: PluginType::LoadBalancer,
            load_balance: Some(LoadBalanceType::WeightedRandom),
            construct: load_balancer::weighted_random,
        },
        PluginDescriptor {
            name: RING_HASH_LOAD_BALANCER,
            plugin_type: PluginType::LoadBalancer,
            load_balance: Some(LoadBalanceType::RingHash),
            construct: load_balancer::ring_hash,
        },
        PluginDescriptor {
            name: MAGLEV_LOAD_BALANCER,
            plugin_type: PluginType::LoadBalancer,
            load_balance: Some(LoadBalanceType::Maglev),
            construct: load_balancer::maglev,
        },
        PluginDescriptor {
            name: L5_CST_HASH_LOAD_BALANCER,
            plugin_type: PluginType::LoadBalancer,
            load_balance: Some(LoadBalanceType::L5CstHash),
            construct: load_balancer::l5_cst_hash,
        },
        PluginDescriptor {
            name: SIMPLE_HASH_LOAD_BALANCER,
            plugin_type: PluginType::LoadBalancer,
            load_balance: Some(LoadBalanceType::SimpleHash),
            construct: load_balancer::simple_hash,
        },
        PluginDescriptor {
            name: CMURMUR_LOAD_BALANCER,
            plugin_type: PluginType::LoadBalancer,
            load_balance: Some(LoadBalanceType::CMurmurHash),
            construct: load_balancer::c_murmur_hash,
        },
        PluginDescriptor {
            name: ERROR_COUNT_CIRCUIT_BREAKER,
            plugin_type: PluginType::CircuitBreaker,
            load_balance: None,
            construct: circuit_breaker::error_count,
        },
        PluginDescriptor {
            name: ERROR_RATE_CIRCUIT_BREAKER,
            plugin_type: PluginType::CircuitBreaker,
            load_balance: None,
            construct: circuit_breaker::error_rate,
        },
        PluginDescriptor {
            name: TCP_OUTLIER_DETECTOR,
            plugin_type: PluginType::OutlierDetector,
            load_balance: None,
            construct: outlier_detector::tcp_detector,
        },
        PluginDescriptor {
            name: HTTP_OUTLIER_DETECTOR,
            plugin_type: PluginType::OutlierDetector,
            load_balance: None,
            construct: outlier_detector::http_detector,
        },
        PluginDescriptor {
            name: UDP_OUTLIER_DETECTOR,
            plugin_type: PluginType::OutlierDetector,
            load_balance: None,
            construct: outlier_detector::udp_detector,
        },
    ]
}
