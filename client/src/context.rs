//! Shared execution context
//!
//! The [`Context`] is the root aggregate an embedded client hangs off: the
//! config snapshot, the resolved plugin set, the per-service sub-contexts,
//! and the background executors. It is always handled as an `Arc`; the
//! executors hold only a `Weak` back-reference, so dropping the last
//! external handle stops the periodic work instead of leaking a cycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use polaris_core::{
    AlertReporter, ClientError, LocalRegistry, PluginInstance, PluginType, Result,
    ServerConnector, ServiceKey, StatReporter,
};
use tracing::{error, info};

use crate::config::ClientConfig;
use crate::executor::ExecutorSet;
use crate::plugin::server_connector::HttpServerConnector;
use crate::service_context::ServiceContext;

/// Ownership relation between a caller-facing API and its context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// The API owns the context and tears it down on drop
    Private,
    /// An externally owned context is borrowed
    Share,
    /// Rate-limit-client variant, accepted on equal footing with the others
    Limit,
}

/// Root aggregate owning config, plugins, sub-contexts, and executors
pub struct Context {
    mode: ContextMode,
    config: ClientConfig,
    server_connector: Arc<dyn ServerConnector>,
    local_registry: Arc<dyn LocalRegistry>,
    stat_reporter: Arc<dyn StatReporter>,
    alert_reporter: Arc<dyn AlertReporter>,
    service_contexts: RwLock<HashMap<ServiceKey, Arc<ServiceContext>>>,
    executors: Mutex<Option<ExecutorSet>>,
}

impl Context {
    /// Build a context from a validated config, with default plugin wiring
    pub fn new(config: ClientConfig, mode: ContextMode) -> Result<Arc<Self>> {
        Self::builder(config, mode).build()
    }

    /// Start building a context, optionally overriding plugin instances
    pub fn builder(config: ClientConfig, mode: ContextMode) -> ContextBuilder {
        ContextBuilder {
            config,
            mode,
            server_connector: None,
            local_registry: None,
            stat_reporter: None,
            alert_reporter: None,
        }
    }

    /// How this context is owned
    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    /// The config snapshot the context was built from
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Default per-call budget when a request omits one
    pub fn api_default_timeout(&self) -> Duration {
        self.config.global.api.timeout()
    }

    /// Attempts per provider call
    pub fn api_max_retry_times(&self) -> u32 {
        self.config.global.api.max_retry_times
    }

    /// Cap on the inter-attempt sleep
    pub fn api_retry_interval(&self) -> Duration {
        self.config.global.api.retry_interval()
    }

    /// The control-plane connector
    pub fn server_connector(&self) -> Arc<dyn ServerConnector> {
        self.server_connector.clone()
    }

    /// The instance cache
    pub fn local_registry(&self) -> Arc<dyn LocalRegistry> {
        self.local_registry.clone()
    }

    /// The statistics sink
    pub fn stat_reporter(&self) -> Arc<dyn StatReporter> {
        self.stat_reporter.clone()
    }

    /// The alert sink
    pub fn alert_reporter(&self) -> Arc<dyn AlertReporter> {
        self.alert_reporter.clone()
    }

    /// The sub-context for one service, created on first use
    pub fn service_context(&self, key: &ServiceKey) -> Result<Arc<ServiceContext>> {
        if let Some(existing) = self.service_contexts.read().get(key) {
            return Ok(existing.clone());
        }

        let built = Arc::new(ServiceContext::from_config(
            &self.config,
            key.clone(),
            self.local_registry.clone(),
        )?);

        let mut map = self.service_contexts.write();
        // A racing creator may have won; keep whichever landed first.
        Ok(map.entry(key.clone()).or_insert(built).clone())
    }

    /// All live sub-contexts; each clone holds a reference the caller releases by dropping
    pub fn service_contexts(&self) -> Vec<Arc<ServiceContext>> {
        self.service_contexts.read().values().cloned().collect()
    }

    /// Stop the executors and wait for their reactors to exit
    pub async fn shutdown(&self) {
        let set = self.executors.lock().take();
        if let Some(set) = set {
            set.stop().await;
            info!("polaris context shut down");
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("mode", &self.mode).finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Destructors cannot await; signal the reactors and let them wind
        // down on their own. `shutdown()` is the graceful path.
        if let Some(set) = self.executors.lock().take() {
            set.signal();
        }
    }
}

/// Builder for [`Context`], allowing plugin injection
pub struct ContextBuilder {
    config: ClientConfig,
    mode: ContextMode,
    server_connector: Option<Arc<dyn ServerConnector>>,
    local_registry: Option<Arc<dyn LocalRegistry>>,
    stat_reporter: Option<Arc<dyn StatReporter>>,
    alert_reporter: Option<Arc<dyn AlertReporter>>,
}

impl ContextBuilder {
    /// Use this connector instead of the configured one
    pub fn server_connector(mut self, connector: Arc<dyn ServerConnector>) -> Self {
        self.server_connector = Some(connector);
        self
    }

    /// Use this local registry instead of the configured one
    pub fn local_registry(mut self, registry: Arc<dyn LocalRegistry>) -> Self {
        self.local_registry = Some(registry);
        self
    }

    /// Use this stat reporter instead of the default
    pub fn stat_reporter(mut self, reporter: Arc<dyn StatReporter>) -> Self {
        self.stat_reporter = Some(reporter);
        self
    }

    /// Use this alert reporter instead of the default
    pub fn alert_reporter(mut self, reporter: Arc<dyn AlertReporter>) -> Self {
        self.alert_reporter = Some(reporter);
        self
    }

    /// Resolve remaining plugins, start the executors, and hand out the context
    ///
    /// Must be called from within a tokio runtime; the executors spawn their
    /// reactor loops onto it.
    pub fn build(self) -> Result<Arc<Context>> {
        if let Err(e) = self.config.validate() {
            error!(error = %e, "context rejected invalid config");
            return Err(e);
        }
        let registry = crate::registry::global();

        let server_connector = match self.server_connector {
            Some(connector) => connector,
            None => {
                let connector_config = &self.config.global.server_connector;
                if connector_config.plugin == crate::plugin::DEFAULT_SERVER_CONNECTOR {
                    // The default connector needs the configured addresses;
                    // named third-party connectors carry their own config.
                    Arc::new(HttpServerConnector::from_config(connector_config))
                } else {
                    match registry.get(&connector_config.plugin, PluginType::ServerConnector)? {
                        PluginInstance::ServerConnector(connector) => connector,
                        other => return Err(unexpected_category_err(other)),
                    }
                }
            }
        };

        let local_registry = match self.local_registry {
            Some(local_registry) => local_registry,
            None => match registry
                .get(&self.config.consumer.local_registry, PluginType::LocalRegistry)?
            {
                PluginInstance::LocalRegistry(local_registry) => local_registry,
                other => return Err(unexpected_category_err(other)),
            },
        };

        let stat_reporter = match self.stat_reporter {
            Some(reporter) => reporter,
            None => match registry
                .get(crate::plugin::DEFAULT_STAT_REPORTER, PluginType::StatReporter)?
            {
                PluginInstance::StatReporter(reporter) => reporter,
                other => return Err(unexpected_category_err(other)),
            },
        };

        let alert_reporter = match self.alert_reporter {
            Some(reporter) => reporter,
            None => match registry
                .get(crate::plugin::DEFAULT_ALERT_REPORTER, PluginType::AlertReporter)?
            {
                PluginInstance::AlertReporter(reporter) => reporter,
                other => return Err(unexpected_category_err(other)),
            },
        };

        let context = Arc::new(Context {
            mode: self.mode,
            config: self.config,
            server_connector,
            local_registry,
            stat_reporter,
            alert_reporter,
            service_contexts: RwLock::new(HashMap::new()),
            executors: Mutex::new(None),
        });

        let executors = crate::executor::start(&context);
        *context.executors.lock() = Some(executors);

        info!(mode = ?context.mode, "polaris context started");
        Ok(context)
    }
}

pub(crate) fn unexpected_category_err(instance: PluginInstance) -> ClientError {
    ClientError::Plugin(format!(
        "plugin {} resolved to unexpected category {}",
        instance.name(),
        instance.plugin_type()
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_context() -> Arc<Context> {
        Context::new(ClientConfig::default(), ContextMode::Private).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn builds_with_default_wiring() {
        let context = test_context();
        assert_eq!(context.mode(), ContextMode::Private);
        assert_eq!(context.api_default_timeout(), Duration::from_millis(1000));
        assert_eq!(context.api_max_retry_times(), 3);
        assert_eq!(context.api_retry_interval(), Duration::from_millis(100));
        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_is_rejected() {
        let mut config = ClientConfig::default();
        config.global.api.max_retry_times = 0;
        let err = Context::new(config, ContextMode::Private).unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn service_contexts_are_cached_per_key() {
        let context = test_context();
        let key = ServiceKey::new("ns", "svc");

        let first = context.service_context(&key).unwrap();
        let second = context.service_context(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = context
            .service_context(&ServiceKey::new("ns", "other"))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &other));

        assert_eq!(context.service_contexts().len(), 2);
        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_router_name_fails_service_context() {
        let mut config = ClientConfig::default();
        config.consumer.service_router.chain = vec!["noSuchRouter".to_string()];
        let context = Context::new(config, ContextMode::Share).unwrap();

        let err = context
            .service_context(&ServiceKey::new("ns", "svc"))
            .unwrap_err();
        assert!(matches!(err, ClientError::Plugin(_)));
        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_idempotent() {
        let context = test_context();
        context.shutdown().await;
        context.shutdown().await;
    }
}
