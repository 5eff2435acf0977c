//! Maglev lookup-table balancer
//!
//! Builds the Maglev permutation table: every instance fills preference
//! slots derived from two hashes (offset and skip) until the table is full,
//! giving near-uniform occupancy and minimal disruption when the instance
//! set changes. The table size must be prime and larger than the instance
//! count.

use polaris_core::{Criteria, Instance, LoadBalanceType, LoadBalancer, Plugin};

use super::{criteria_key, hash64};

const DEFAULT_TABLE_SIZE: usize = 65537;

/// Maglev consistent-hash lookup table
pub struct MaglevLoadBalancer {
    table_size: usize,
}

impl MaglevLoadBalancer {
    /// Balancer with a custom (prime) table size; handy for tests
    pub fn with_table_size(table_size: usize) -> Self {
        Self {
            table_size: table_size.max(2),
        }
    }

    fn build_table(&self, instances: &[Instance]) -> Vec<usize> {
        let m = self.table_size;
        let n = instances.len();

        let mut offsets = Vec::with_capacity(n);
        let mut skips = Vec::with_capacity(n);
        for instance in instances {
            let node = format!("{}:{}", instance.host, instance.port);
            offsets.push((hash64(&node, "offset") % m as u64) as usize);
            skips.push((hash64(&node, "skip") % (m as u64 - 1) + 1) as usize);
        }

        let mut table = vec![usize::MAX; m];
        let mut next = vec![0usize; n];
        let mut filled = 0;
        while filled < m {
            for backend in 0..n {
                let slot = loop {
                    let candidate = (offsets[backend] + skips[backend] * next[backend]) % m;
                    next[backend] += 1;
                    if table[candidate] == usize::MAX {
                        break candidate;
                    }
                };
                table[slot] = backend;
                filled += 1;
                if filled == m {
                    break;
                }
            }
        }
        table
    }
}

impl Default for MaglevLoadBalancer {
    fn default() -> Self {
        Self::with_table_size(DEFAULT_TABLE_SIZE)
    }
}

impl Plugin for MaglevLoadBalancer {
    fn name(&self) -> &'static str {
        "maglev"
    }
}

impl LoadBalancer for MaglevLoadBalancer {
    fn load_balance_type(&self) -> LoadBalanceType {
        LoadBalanceType::Maglev
    }

    fn choose_instance(&self, criteria: &Criteria, instances: &[Instance]) -> Option<Instance> {
        if instances.is_empty() {
            return None;
        }
        let table = self.build_table(instances);
        let slot = (hash64(criteria_key(criteria), "lookup") % table.len() as u64) as usize;
        instances.get(table[slot]).cloned()
    }
}
