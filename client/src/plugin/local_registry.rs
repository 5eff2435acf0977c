//! In-memory instance cache

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use polaris_core::{LocalRegistry, Plugin, PluginInstance, ServiceInstances, ServiceKey};
use tracing::debug;

pub(crate) fn in_memory_registry() -> PluginInstance {
    PluginInstance::LocalRegistry(Arc::new(InMemoryRegistry::new()))
}

/// Default local registry: a snapshot map guarded by a read-write lock
///
/// Snapshot replacement runs the process-wide pre-update handler chain
/// against the old and new instance collections before the swap becomes
/// visible to readers.
pub struct InMemoryRegistry {
    services: RwLock<HashMap<ServiceKey, ServiceInstances>>,
}

impl InMemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for InMemoryRegistry {
    fn name(&self) -> &'static str {
        "inMemory"
    }
}

impl LocalRegistry for InMemoryRegistry {
    fn instances(&self, key: &ServiceKey) -> Option<ServiceInstances> {
        self.services.read().get(key).cloned()
    }

    fn update_instances(&self, snapshot: ServiceInstances) {
        let old = self.instances(&snapshot.key);
        let old_instances = old.map(|s| s.instances).unwrap_or_default();
        // Handlers observe the transition before readers see the new set.
        crate::registry::global().on_pre_update_service_data(&old_instances, &snapshot.instances);

        debug!(
            service = %snapshot.key,
            revision = snapshot.revision,
            instances = snapshot.instances.len(),
            "service snapshot replaced"
        );
        self.services.write().insert(snapshot.key.clone(), snapshot);
    }

    fn set_instance_healthy(&self, key: &ServiceKey, instance_id: &str, healthy: bool) -> bool {
        let mut services = self.services.write();
        let Some(snapshot) = services.get_mut(key) else {
            return false;
        };
        match snapshot
            .instances
            .iter_mut()
            .find(|instance| instance.id == instance_id)
        {
            Some(instance) => {
                instance.healthy = healthy;
                true
            }
            None => false,
        }
    }
}
