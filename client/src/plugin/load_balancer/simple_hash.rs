//! Plain modulo hashing

use polaris_core::{Criteria, Instance, LoadBalanceType, LoadBalancer, Plugin};

use super::{criteria_key, hash64};

/// `hash(key) % n` over the candidate list
///
/// Cheapest of the hash balancers; any change to the candidate set remaps
/// most keys, so it only suits callers that tolerate churn.
pub struct SimpleHashLoadBalancer;

impl Plugin for SimpleHashLoadBalancer {
    fn name(&self) -> &'static str {
        "simpleHash"
    }
}

impl LoadBalancer for SimpleHashLoadBalancer {
    fn load_balance_type(&self) -> LoadBalanceType {
        LoadBalanceType::SimpleHash
    }

    fn choose_instance(&self, criteria: &Criteria, instances: &[Instance]) -> Option<Instance> {
        if instances.is_empty() {
            return None;
        }
        let index = (hash64(criteria_key(criteria), "simple") % instances.len() as u64) as usize;
        instances.get(index).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn instances() -> Vec<Instance> {
        (0..5)
            .map(|i| Instance::new(format!("i-{i}"), format!("10.0.0.{i}"), 80))
            .collect()
    }

    fn keyed(key: &str) -> Criteria {
        Criteria {
            hash_key: Some(key.to_string()),
            ..Criteria::default()
        }
    }

    #[test]
    fn same_key_is_stable() {
        let lb = SimpleHashLoadBalancer;
        let candidates = instances();
        let first = lb.choose_instance(&keyed("order-1"), &candidates).unwrap();
        let again = lb.choose_instance(&keyed("order-1"), &candidates).unwrap();
        assert_eq!(first.id, again.id);
    }

    #[test]
    fn distinct_keys_spread() {
        let lb = SimpleHashLoadBalancer;
        let candidates = instances();
        let mut seen = std::collections::HashSet::new();
        for i in 0..50 {
            seen.insert(lb.choose_instance(&keyed(&format!("k{i}")), &candidates).unwrap().id);
        }
        assert!(seen.len() >= 2);
    }

    #[test]
    fn empty_candidates_yield_none() {
        let lb = SimpleHashLoadBalancer;
        assert!(lb.choose_instance(&keyed("any"), &[]).is_none());
    }
}
