//! Ketama consistent hash ring
//!
//! Every instance contributes weight-scaled virtual nodes, and a key maps
//! to the first node clockwise from its hash. Moving or removing one
//! instance only remaps the keys that hashed onto its own virtual nodes.

use std::collections::BTreeMap;

use polaris_core::{Criteria, Instance, LoadBalanceType, LoadBalancer, Plugin};

use super::{criteria_key, hash64};

pub(super) const DEFAULT_VIRTUAL_NODES: usize = 100;

/// Ketama consistent hash ring
pub struct RingHashLoadBalancer {
    virtual_nodes: usize,
}

impl RingHashLoadBalancer {
    /// Ring with a custom virtual-node count per unit of weight
    pub fn with_virtual_nodes(virtual_nodes: usize) -> Self {
        Self {
            virtual_nodes: virtual_nodes.max(1),
        }
    }

    fn build_ring(&self, instances: &[Instance]) -> BTreeMap<u64, usize> {
        let mut ring = BTreeMap::new();
        for (index, instance) in instances.iter().enumerate() {
            let replicas = scaled_replicas(self.virtual_nodes, instance.weight);
            for replica in 0..replicas {
                let node = format!("{}:{}#{replica}", instance.host, instance.port);
                ring.insert(hash64(&node, "ring"), index);
            }
        }
        ring
    }
}

impl Default for RingHashLoadBalancer {
    fn default() -> Self {
        Self::with_virtual_nodes(DEFAULT_VIRTUAL_NODES)
    }
}

/// Virtual nodes for an instance, scaled by weight around the default of 100
pub(super) fn scaled_replicas(virtual_nodes: usize, weight: u32) -> usize {
    (virtual_nodes * weight as usize / 100).max(1)
}

pub(super) fn lookup(ring: &BTreeMap<u64, usize>, point: u64) -> Option<usize> {
    ring.range(point..)
        .next()
        .or_else(|| ring.iter().next())
        .map(|(_, &index)| index)
}

impl Plugin for RingHashLoadBalancer {
    fn name(&self) -> &'static str {
        "ringHash"
    }
}

impl LoadBalancer for RingHashLoadBalancer {
    fn load_balance_type(&self) -> LoadBalanceType {
        LoadBalanceType::RingHash
    }

    fn choose_instance(&self, criteria: &Criteria, instances: &[Instance]) -> Option<Instance> {
        if instances.is_empty() {
            return None;
        }
        let ring = self.build_ring(instances);
        let point = hash64(criteria_key(criteria), "key");
        lookup(&ring, point).and_then(|index| instances.get(index).cloned())
    }
}
