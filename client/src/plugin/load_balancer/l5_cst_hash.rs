//! L5 cluster consistent hash
//!
//! One balancer serves two registrations: the unflagged `l5CstHash` plugin
//! hashes with the classic L5 rolling hash, and the murmur-flagged
//! construction is registered as `cMurmurHash`. Both build the same
//! weight-scaled virtual-node ring; only the hash function differs, which
//! is what lets a client agree on placement with peers that still hash the
//! L5 way while newer fleets move to murmur3.

use std::collections::BTreeMap;

use polaris_core::{Criteria, Instance, LoadBalanceType, LoadBalancer, Plugin};

use super::criteria_key;
use super::ring_hash::{lookup, scaled_replicas, DEFAULT_VIRTUAL_NODES};

/// L5 cluster-hash balancer; murmur-flagged it becomes `cMurmurHash`
pub struct L5CstHashLoadBalancer {
    c_murmur: bool,
    virtual_nodes: usize,
}

impl L5CstHashLoadBalancer {
    /// Unflagged: the L5 rolling hash. Flagged: murmur3.
    pub fn new(c_murmur: bool) -> Self {
        Self {
            c_murmur,
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
        }
    }

    /// Balancer with a custom virtual-node count per unit of weight
    pub fn with_virtual_nodes(c_murmur: bool, virtual_nodes: usize) -> Self {
        Self {
            c_murmur,
            virtual_nodes: virtual_nodes.max(1),
        }
    }

    fn hash(&self, data: &[u8]) -> u64 {
        if self.c_murmur {
            u64::from(murmur3_32(data, 0))
        } else {
            u64::from(l5_hash(data))
        }
    }
}

impl Default for L5CstHashLoadBalancer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Plugin for L5CstHashLoadBalancer {
    fn name(&self) -> &'static str {
        if self.c_murmur {
            "cMurmurHash"
        } else {
            "l5CstHash"
        }
    }
}

impl LoadBalancer for L5CstHashLoadBalancer {
    fn load_balance_type(&self) -> LoadBalanceType {
        if self.c_murmur {
            LoadBalanceType::CMurmurHash
        } else {
            LoadBalanceType::L5CstHash
        }
    }

    fn choose_instance(&self, criteria: &Criteria, instances: &[Instance]) -> Option<Instance> {
        if instances.is_empty() {
            return None;
        }

        let mut ring: BTreeMap<u64, usize> = BTreeMap::new();
        for (index, instance) in instances.iter().enumerate() {
            let replicas = scaled_replicas(self.virtual_nodes, instance.weight);
            for replica in 0..replicas {
                let node = format!("{}:{}#{replica}", instance.host, instance.port);
                ring.insert(self.hash(node.as_bytes()), index);
            }
        }

        let point = self.hash(criteria_key(criteria).as_bytes());
        lookup(&ring, point).and_then(|index| instances.get(index).cloned())
    }
}

/// Classic L5 rolling hash (BKDR, factor 131)
fn l5_hash(data: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &byte in data {
        h = h.wrapping_mul(131).wrapping_add(u32::from(byte));
    }
    h
}

/// murmur3 x86 32-bit
fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in chunks.by_ref() {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k ^= u32::from(byte) << (8 * i);
        }
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn instances() -> Vec<Instance> {
        vec![
            Instance::new("a", "10.0.0.1", 80),
            Instance::new("b", "10.0.0.2", 80),
            Instance::new("c", "10.0.0.3", 80),
        ]
    }

    fn keyed(key: &str) -> Criteria {
        Criteria {
            hash_key: Some(key.to_string()),
            ..Criteria::default()
        }
    }

    #[test]
    fn flag_selects_the_registered_identity() {
        let l5 = L5CstHashLoadBalancer::new(false);
        assert_eq!(l5.name(), "l5CstHash");
        assert_eq!(l5.load_balance_type(), LoadBalanceType::L5CstHash);

        let murmur = L5CstHashLoadBalancer::new(true);
        assert_eq!(murmur.name(), "cMurmurHash");
        assert_eq!(murmur.load_balance_type(), LoadBalanceType::CMurmurHash);
    }

    #[test]
    fn both_modes_are_stable_per_key() {
        for c_murmur in [false, true] {
            let lb = L5CstHashLoadBalancer::new(c_murmur);
            let candidates = instances();
            let first = lb.choose_instance(&keyed("session-9"), &candidates).unwrap();
            for _ in 0..10 {
                let again = lb.choose_instance(&keyed("session-9"), &candidates).unwrap();
                assert_eq!(first.id, again.id, "c_murmur={c_murmur}");
            }
        }
    }

    #[test]
    fn removing_another_instance_keeps_the_mapping() {
        for c_murmur in [false, true] {
            let lb = L5CstHashLoadBalancer::new(c_murmur);
            let candidates = instances();
            let chosen = lb.choose_instance(&keyed("user-17"), &candidates).unwrap();

            let dropped = candidates
                .iter()
                .find(|i| i.id != chosen.id)
                .unwrap()
                .id
                .clone();
            let remaining: Vec<Instance> = candidates
                .into_iter()
                .filter(|i| i.id != dropped)
                .collect();

            let after = lb.choose_instance(&keyed("user-17"), &remaining).unwrap();
            assert_eq!(chosen.id, after.id, "c_murmur={c_murmur}");
        }
    }

    #[test]
    fn keys_spread_across_instances() {
        for c_murmur in [false, true] {
            let lb = L5CstHashLoadBalancer::new(c_murmur);
            let candidates = instances();
            let mut seen = std::collections::HashSet::new();
            for i in 0..100 {
                let chosen = lb
                    .choose_instance(&keyed(&format!("key-{i}")), &candidates)
                    .unwrap();
                seen.insert(chosen.id);
            }
            assert!(seen.len() >= 2, "c_murmur={c_murmur}");
        }
    }

    #[test]
    fn empty_candidates_yield_none() {
        let lb = L5CstHashLoadBalancer::default();
        assert!(lb.choose_instance(&Criteria::default(), &[]).is_none());
    }

    #[test]
    fn l5_hash_is_the_factor_131_rolling_hash() {
        assert_eq!(l5_hash(b""), 0);
        assert_eq!(l5_hash(b"a"), 97);
        assert_eq!(l5_hash(b"ab"), 97 * 131 + 98);
    }

    #[test]
    fn murmur3_reference_vectors() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"hello", 0), 0x248b_fa47);
        // Seed changes and tail bytes must both disturb the hash.
        assert_ne!(murmur3_32(b"hello", 1), murmur3_32(b"hello", 0));
        assert_ne!(murmur3_32(b"hello!", 0), murmur3_32(b"hello", 0));
    }
}
