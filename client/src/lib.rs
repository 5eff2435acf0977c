//! polaris-client - embedded discovery and traffic-governance client
//!
//! A workload embeds this crate to register itself with the polaris control
//! plane, keep its liveness refreshed, and deregister on the way out. The
//! pieces:
//!
//! - [`ProviderApi`] - register / heartbeat / deregister with bounded retry
//! - [`Context`] - shared root owning config, plugins, and executors
//! - [`Reactor`] - single-threaded cooperative task loop behind each executor
//! - [`PluginRegistry`] - process-wide named factories per plugin category
//! - `plugin::*` - the default plugin set (connector, registry, balancers,
//!   breakers, probes, routers, reporters)
//!
//! # Quick start
//!
//! ```ignore
//! use polaris_client::ProviderApi;
//! use polaris_core::InstanceRegisterRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = ProviderApi::with_default_file()?;
//!     let req = InstanceRegisterRequest::new("prod", "checkout", "token", "10.0.0.7", 8080);
//!     let instance_id = provider.register(&req).await?;
//!     println!("registered as {instance_id}");
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

mod api_stat;
/// Client configuration
pub mod config;
/// Shared execution context
pub mod context;
mod executor;
/// Prometheus metrics
pub mod metrics;
/// Default plugin implementations
pub mod plugin;
/// Provider API
pub mod provider;
/// Cooperative task loop
pub mod reactor;
/// Process-wide plugin registry
pub mod registry;
/// Per-service plugin bundle
pub mod service_context;

pub use config::ClientConfig;
pub use context::{Context, ContextBuilder, ContextMode};
pub use metrics::Metrics;
pub use provider::ProviderApi;
pub use reactor::{Reactor, ReactorClosed, ReactorHandle};
pub use registry::{global as plugin_registry, register_plugin, PluginRegistry};
pub use service_context::{CircuitBreakerChain, OutlierDetectorChain, ServiceContext};

// Core types, re-exported so embedders need only this crate.
pub use polaris_core::{
    ClientError, Instance, InstanceDeregisterRequest, InstanceHeartbeatRequest,
    InstanceRegisterRequest, Result, ReturnCode, ServiceInstances, ServiceKey,
};
