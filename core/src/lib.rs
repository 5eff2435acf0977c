//! polaris-core - shared types for the polaris discovery client
//!
//! This crate holds the types shared between the polaris client and external
//! plugin crates:
//!
//! - [`ServiceKey`], [`Instance`], [`ServiceInstances`] - the service model
//! - [`InstanceRegisterRequest`] and friends - provider request objects
//! - [`ClientError`] / [`ReturnCode`] - the closed error taxonomy
//! - the plugin trait surface ([`ServerConnector`], [`LoadBalancer`], ...)
//!   and the static [`PluginDescriptor`] factory type
//!
//! # Why this crate exists
//!
//! Third-party plugins (a custom connector, an in-house load balancer) need
//! the trait surface and the model types without depending on the client
//! crate, which in turn wants to optionally bundle such plugins. Splitting
//! the shared surface here breaks that cycle, the same way the client's own
//! default plugins consume it.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

mod error;
/// Service and instance model
pub mod model;
/// Plugin trait surface and factory descriptors
pub mod plugin;
/// Provider request value objects
pub mod request;

pub use error::{ClientError, Result, ReturnCode};
pub use model::{Instance, ServiceInstances, ServiceKey};
pub use plugin::{
    AlertLevel, AlertReporter, ApiKind, CircuitBreaker, Criteria, DetectResult,
    InstancePreUpdateHandler, LoadBalanceType, LoadBalancer, LocalRegistry, OutlierDetector,
    Plugin, PluginConstructor, PluginDescriptor, PluginInstance, PluginType, ServerConnector,
    ServiceRouter, StatReporter, WeightAdjuster,
};
pub use request::{InstanceDeregisterRequest, InstanceHeartbeatRequest, InstanceRegisterRequest};
