//! Process-wide plugin registry
//!
//! One table of named factories per plugin category plus a second index for
//! load-balance algorithms, seeded with the default plugin set on first
//! touch. Factories are static [`PluginDescriptor`]s, so registration never
//! instantiates a plugin; equality of a re-registration is equality of the
//! constructor pointer, matching the idempotence rule.
//!
//! The registry also owns the instance pre-update handler chain. Invocation
//! snapshots the chain under the lock and calls handlers outside it, so a
//! handler may (de)register siblings without deadlocking.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use polaris_core::{
    ClientError, Instance, InstancePreUpdateHandler, LoadBalanceType, LoadBalancer,
    PluginDescriptor, PluginInstance, PluginType, Result,
};
use tracing::{error, warn};

static GLOBAL: LazyLock<PluginRegistry> = LazyLock::new(PluginRegistry::with_defaults);

/// The process-wide registry, seeded with the default plugin set
pub fn global() -> &'static PluginRegistry {
    &GLOBAL
}

/// Register a plugin with the process-wide registry
pub fn register_plugin(descriptor: PluginDescriptor) -> Result<()> {
    global().register(descriptor)
}

/// Named factory table for every plugin category
pub struct PluginRegistry {
    factories: Mutex<HashMap<(String, PluginType), PluginDescriptor>>,
    load_balancers: Mutex<HashMap<LoadBalanceType, PluginDescriptor>>,
    pre_update_handlers: Mutex<Vec<Arc<dyn InstancePreUpdateHandler>>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: Mutex::new(HashMap::new()),
            load_balancers: Mutex::new(HashMap::new()),
            pre_update_handlers: Mutex::new(Vec::new()),
        }
    }

    /// Create a registry seeded with the default plugin set
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for descriptor in crate::plugin::default_descriptors() {
            if let Err(e) = registry.register(descriptor) {
                // Defaults are compiled in; a conflict here is a bug.
                error!(error = %e, "failed to seed default plugin");
            }
        }
        registry
    }

    /// Register a plugin factory under `(name, plugin_type)`
    ///
    /// Re-registering an identical descriptor is idempotent; a different
    /// constructor under an existing key is a conflict and leaves both
    /// indexes untouched. For load balancers the first descriptor per
    /// [`LoadBalanceType`] wins; later ones are skipped with a warning.
    pub fn register(&self, descriptor: PluginDescriptor) -> Result<()> {
        if descriptor.plugin_type == PluginType::LoadBalancer
            && descriptor.load_balance.is_none()
        {
            error!(
                name = descriptor.name,
                "load balancer descriptor missing its algorithm"
            );
            return Err(ClientError::Plugin(format!(
                "load balancer plugin {} declares no LoadBalanceType",
                descriptor.name
            )));
        }

        let key = (descriptor.name.to_string(), descriptor.plugin_type);
        let mut factories = self.factories.lock();
        if let Some(existing) = factories.get(&key) {
            if !std::ptr::fn_addr_eq(existing.construct, descriptor.construct) {
                error!(
                    name = descriptor.name,
                    plugin_type = %descriptor.plugin_type,
                    "plugin already registered with a different factory"
                );
                return Err(ClientError::Plugin(format!(
                    "plugin {} of type {} already exists",
                    descriptor.name, descriptor.plugin_type
                )));
            }
        }
        factories.insert(key, descriptor);
        drop(factories);

        if let Some(lb_type) = descriptor.load_balance {
            let mut load_balancers = self.load_balancers.lock();
            if load_balancers.contains_key(&lb_type) {
                warn!(
                    name = descriptor.name,
                    lb_type = ?lb_type,
                    "load balance type already registered, skipping"
                );
            } else {
                load_balancers.insert(lb_type, descriptor);
            }
        }
        Ok(())
    }

    /// Construct a fresh plugin instance from the stored factory
    pub fn get(&self, name: &str, plugin_type: PluginType) -> Result<PluginInstance> {
        let descriptor = {
            let factories = self.factories.lock();
            factories.get(&(name.to_string(), plugin_type)).copied()
        };
        let Some(descriptor) = descriptor else {
            error!(name, plugin_type = %plugin_type, "plugin not registered");
            return Err(ClientError::Plugin(format!(
                "plugin {name} of type {plugin_type} not registered"
            )));
        };

        // Construction happens outside the lock.
        let instance = (descriptor.construct)();
        if instance.plugin_type() != plugin_type {
            error!(
                name,
                declared = %plugin_type,
                actual = %instance.plugin_type(),
                "plugin factory produced a different category than declared"
            );
            return Err(ClientError::Plugin(format!(
                "plugin {name} produced {} instead of {plugin_type}",
                instance.plugin_type()
            )));
        }
        Ok(instance)
    }

    /// Construct a fresh load balancer by algorithm
    pub fn get_load_balancer(&self, lb_type: LoadBalanceType) -> Result<Arc<dyn LoadBalancer>> {
        let descriptor = {
            let load_balancers = self.load_balancers.lock();
            load_balancers.get(&lb_type).copied()
        };
        let Some(descriptor) = descriptor else {
            error!(lb_type = ?lb_type, "no load balancer registered for type");
            return Err(ClientError::Plugin(format!(
                "no load balancer registered for {lb_type:?}"
            )));
        };
        match (descriptor.construct)() {
            PluginInstance::LoadBalancer(lb) => Ok(lb),
            other => Err(ClientError::Plugin(format!(
                "plugin {} produced {} instead of LoadBalancer",
                descriptor.name,
                other.plugin_type()
            ))),
        }
    }

    /// Add a pre-update handler, at the back by default
    ///
    /// Adding the same handler (by pointer identity) twice returns
    /// `ExistedResource`.
    pub fn register_instance_pre_update_handler(
        &self,
        handler: Arc<dyn InstancePreUpdateHandler>,
        at_front: bool,
    ) -> Result<()> {
        let mut handlers = self.pre_update_handlers.lock();
        if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return Err(ClientError::ExistedResource(
                "pre-update handler already registered".to_string(),
            ));
        }
        if at_front {
            handlers.insert(0, handler);
        } else {
            handlers.push(handler);
        }
        Ok(())
    }

    /// Remove a previously added pre-update handler
    pub fn deregister_instance_pre_update_handler(
        &self,
        handler: &Arc<dyn InstancePreUpdateHandler>,
    ) -> Result<()> {
        let mut handlers = self.pre_update_handlers.lock();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        if handlers.len() == before {
            return Err(ClientError::Plugin(
                "pre-update handler not registered".to_string(),
            ));
        }
        Ok(())
    }

    /// Invoke the pre-update chain with the old and new instance collections
    ///
    /// The chain is snapshotted under the lock and invoked outside it, in
    /// registration order with head insertions first. Handlers registered or
    /// removed during invocation take effect from the next update.
    pub fn on_pre_update_service_data(&self, old: &[Instance], new: &[Instance]) {
        let handlers: Vec<Arc<dyn InstancePreUpdateHandler>> = {
            let guard = self.pre_update_handlers.lock();
            if guard.is_empty() {
                return;
            }
            guard.clone()
        };
        for handler in handlers {
            handler.on_instance_update(old, new);
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
