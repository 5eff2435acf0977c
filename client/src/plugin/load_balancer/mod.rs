//! Load balancer implementations
//!
//! One default (weight-proportional random) plus the hash-based variants.
//! Hash-based balancers key on `Criteria::hash_key`; callers that omit it
//! all land on the same instance, so selection stays deterministic.

mod l5_cst_hash;
mod maglev;
mod ring_hash;
mod simple_hash;

pub use l5_cst_hash::L5CstHashLoadBalancer;
pub use maglev::MaglevLoadBalancer;
pub use ring_hash::RingHashLoadBalancer;
pub use simple_hash::SimpleHashLoadBalancer;

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use polaris_core::{Criteria, Instance, LoadBalanceType, LoadBalancer, Plugin, PluginInstance};
use rand::Rng;

pub(crate) fn weighted_random() -> PluginInstance {
    PluginInstance::LoadBalancer(Arc::new(WeightedRandomLoadBalancer))
}

pub(crate) fn ring_hash() -> PluginInstance {
    PluginInstance::LoadBalancer(Arc::new(RingHashLoadBalancer::default()))
}

pub(crate) fn maglev() -> PluginInstance {
    PluginInstance::LoadBalancer(Arc::new(MaglevLoadBalancer::default()))
}

pub(crate) fn l5_cst_hash() -> PluginInstance {
    PluginInstance::LoadBalancer(Arc::new(L5CstHashLoadBalancer::new(false)))
}

pub(crate) fn simple_hash() -> PluginInstance {
    PluginInstance::LoadBalancer(Arc::new(SimpleHashLoadBalancer))
}

pub(crate) fn c_murmur_hash() -> PluginInstance {
    PluginInstance::LoadBalancer(Arc::new(L5CstHashLoadBalancer::new(true)))
}

/// The caller's hash key, or the empty key when none was supplied
pub(crate) fn criteria_key(criteria: &Criteria) -> &str {
    criteria.hash_key.as_deref().unwrap_or("")
}

/// 64-bit hash of a string, salted so call sites can derive distinct streams
pub(crate) fn hash64(value: &str, salt: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    salt.hash(&mut hasher);
    hasher.finish()
}

/// Weight-proportional random selection (the default balancer)
pub struct WeightedRandomLoadBalancer;

impl Plugin for WeightedRandomLoadBalancer {
    fn name(&self) -> &'static str {
        "weightedRandom"
    }
}

impl LoadBalancer for WeightedRandomLoadBalancer {
    fn load_balance_type(&self) -> LoadBalanceType {
        LoadBalanceType::WeightedRandom
    }

    fn choose_instance(&self, _criteria: &Criteria, instances: &[Instance]) -> Option<Instance> {
        if instances.is_empty() {
            return None;
        }

        let total: u64 = instances.iter().map(|i| u64::from(i.weight)).sum();
        let mut rng = rand::thread_rng();
        if total == 0 {
            // All weights zeroed out: fall back to a uniform pick.
            return instances.get(rng.gen_range(0..instances.len())).cloned();
        }

        let mut point = rng.gen_range(0..total);
        for instance in instances {
            let weight = u64::from(instance.weight);
            if point < weight {
                return Some(instance.clone());
            }
            point -= weight;
        }
        instances.last().cloned()
    }
}
