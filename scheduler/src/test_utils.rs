//! Fleet synthesis helpers for downstream embedders' own integration tests. Gated behind the
//! `testing` feature rather than `#[cfg(test)]` so a dependent crate's own test suite can pull
//! these in without duplicating them (mirrors the teacher's `test_utils` module).

use std::collections::BTreeMap;

use crate::ids::NodeId;
use crate::resource_set::{cpu, Quantity, ResourceSet};
use crate::resources::NodeResources;

/// A node with `cpu_total` CPUs, all of it free, no labels, not draining. Node ids start at one.
pub fn make_test_fleet(node_count: u64, cpu_total: u64) -> BTreeMap<NodeId, NodeResources> {
    (1..=node_count)
        .map(|i| {
            let node = NodeResources::new(
                ResourceSet::from_pairs([(cpu(), Quantity::from_units(cpu_total))]),
                ResourceSet::from_pairs([(cpu(), Quantity::from_units(cpu_total))]),
                BTreeMap::new(),
            );
            (NodeId::from_u128(i as u128), node)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_the_requested_node_count() {
        let fleet = make_test_fleet(5, 4);
        assert_eq!(fleet.len(), 5);
        assert!(fleet.values().all(|n| n.available().get(cpu()) == Quantity::from_units(4)));
    }
}
