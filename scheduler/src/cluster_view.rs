//! The authoritative, shared mapping from node identity to [`NodeResources`].
//!
//! Mutated exclusively from the dispatcher thread (SPEC_FULL.md §5); reads go through
//! [`ClusterResourceView::snapshot_for_policy`], a refcounted copy-on-write snapshot so that a
//! policy scan never observes a torn update even if it runs across an `await` point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::ids::NodeId;
use crate::resource_set::ResourceSet;
use crate::resources::NodeResources;

/// An immutable, refcounted view of the fleet at one instant. Cheap to clone (an `Arc` bump) and
/// safe to hold across a policy evaluation even if the view is concurrently replaced underneath.
pub type ClusterSnapshot = Arc<HashMap<NodeId, NodeResources>>;

/// A heartbeat's contribution to a node's availability. Deliberately narrower than the full
/// heartbeat wire record in SPEC_FULL.md §6: totals and labels are assumed stable between
/// heartbeats and are only ever changed via [`ClusterResourceView::add_or_update`]
/// (reconfiguration), matching §4.3's "preserves totals and labels" contract.
#[derive(Clone, Debug)]
pub struct HeartbeatReport {
    pub generation: u64,
    /// Partial: a resource name absent here means "unchanged since the last report", not zero.
    pub available: ResourceSet,
    pub is_draining: bool,
}

pub struct ClusterResourceView {
    local_node_id: NodeId,
    nodes: ArcSwap<HashMap<NodeId, NodeResources>>,
}

impl ClusterResourceView {
    pub fn new(local_node_id: NodeId, local_node_resources: NodeResources) -> Self {
        assert!(!local_node_id.is_nil(), "local node id must not be nil");
        let mut map = HashMap::new();
        map.insert(local_node_id, local_node_resources);
        Self {
            local_node_id,
            nodes: ArcSwap::from_pointee(map),
        }
    }

    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    /// Clones, mutates, and atomically republishes the map. Copy-on-write: reads via
    /// [`Self::snapshot_for_policy`] never block on and never observe a half-applied mutation.
    fn mutate(&self, f: impl FnOnce(&mut HashMap<NodeId, NodeResources>)) {
        let mut map = HashMap::clone(&self.nodes.load());
        f(&mut map);
        self.nodes.store(Arc::new(map));
    }

    /// Upsert: replaces a node's totals and availability atomically. Used for initial discovery
    /// and for reconfiguration (a node's total capacity or label set changing).
    pub fn add_or_update(&self, node_id: NodeId, resources: NodeResources) {
        self.mutate(|map| {
            map.insert(node_id, resources);
        });
    }

    /// Applies a heartbeat. Drops reports carrying a generation older than what's on file;
    /// otherwise merges the (possibly partial) available-resource snapshot into the existing
    /// record without touching totals or labels.
    pub fn update_available(&self, node_id: NodeId, report: HeartbeatReport) {
        let mut dropped = false;
        self.mutate(|map| {
            let Some(node) = map.get_mut(&node_id) else {
                warn!(%node_id, "dropping heartbeat for unknown node");
                return;
            };
            if report.generation < node.generation() {
                dropped = true;
                return;
            }
            let mut available = node.available().clone();
            for (name, qty) in report.available.iter() {
                available.set(name, qty);
            }
            *node = crate::resources::NodeResources::new(
                node.total().clone(),
                available,
                node.labels().clone(),
            );
            node.set_generation(report.generation);
            node.set_draining(report.is_draining);
        });
        if dropped {
            debug!(%node_id, generation = report.generation, "dropped stale heartbeat");
        }
    }

    /// Removes a node that has left the cluster. Never removes the local node: the local node's
    /// identity is present in the view for the lifetime of the scheduler (SPEC_FULL.md §3).
    pub fn remove(&self, node_id: NodeId) {
        if node_id == self.local_node_id {
            warn!(%node_id, "refusing to remove the local node from the cluster view");
            return;
        }
        let mut removed = false;
        self.mutate(|map| {
            removed = map.remove(&node_id).is_some();
        });
        if !removed {
            warn!(%node_id, "removed non-existent node from cluster view");
        }
    }

    /// Re-checks schedulability and subtracts `request` from `node_id` in the same copy-on-write
    /// step, so nothing can observe a state where the check passed but the subtraction didn't
    /// happen, or vice versa (SPEC_FULL.md §7, "RaceLost"). `still_available` is evaluated inside
    /// the mutation closure, after re-reading the node's current record, so a concurrent drain or
    /// liveness flip between the caller's last read and this call is never missed.
    pub(crate) fn try_allocate(
        &self,
        node_id: NodeId,
        request: &crate::resources::ResourceRequest,
        ignore_object_store: bool,
        still_available: impl Fn() -> bool,
    ) -> bool {
        let mut committed = false;
        self.mutate(|map| {
            let Some(node) = map.get_mut(&node_id) else {
                return;
            };
            if !node.has_sufficient(request, ignore_object_store) || !still_available() {
                return;
            }
            if node.allocate(request).is_err() {
                return;
            }
            committed = true;
        });
        committed
    }

    /// Atomically applies a batch of node updates in one copy-on-write swap, so a multi-node
    /// bundle placement either becomes visible in full or not at all (SPEC_FULL.md §4.6).
    pub(crate) fn commit_many(&self, updates: HashMap<NodeId, NodeResources>) {
        self.mutate(|map| {
            for (id, resources) in updates {
                map.insert(id, resources);
            }
        });
    }

    pub fn set_draining(&self, node_id: NodeId, draining: bool) {
        self.mutate(|map| {
            if let Some(node) = map.get_mut(&node_id) {
                node.set_draining(draining);
            } else {
                warn!(%node_id, "set_draining on unknown node");
            }
        });
    }

    pub fn is_draining(&self, node_id: NodeId) -> bool {
        self.nodes
            .load()
            .get(&node_id)
            .map(|n| n.is_draining())
            .unwrap_or(false)
    }

    pub fn get(&self, node_id: NodeId) -> Option<NodeResources> {
        self.nodes.load().get(&node_id).cloned()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.load().contains_key(&node_id)
    }

    /// A consistent, refcounted snapshot for policy evaluation. No lock is held past this call:
    /// the returned `Arc` keeps its contents alive even if the view is mutated concurrently.
    pub fn snapshot_for_policy(&self) -> ClusterSnapshot {
        self.nodes.load_full()
    }

    #[cfg(test)]
    pub(crate) fn node_labels(&self, node_id: NodeId) -> BTreeMap<String, String> {
        self.get(node_id).map(|n| n.labels().clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_set::{cpu, Quantity};

    fn node(total: u64, available: u64) -> NodeResources {
        NodeResources::new(
            ResourceSet::from_pairs([(cpu(), Quantity::from_units(total))]),
            ResourceSet::from_pairs([(cpu(), Quantity::from_units(available))]),
            BTreeMap::new(),
        )
    }

    #[test]
    fn add_or_update_round_trips() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let remote = NodeId::from_u128(2);
        view.add_or_update(remote, node(2, 2));
        let snap = view.snapshot_for_policy();
        assert_eq!(snap.get(&remote).unwrap().available().get(cpu()), Quantity::from_units(2));
    }

    #[test]
    fn heartbeat_preserves_totals_and_merges_partial_available() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let remote = NodeId::from_u128(2);
        view.add_or_update(remote, node(8, 8));

        view.update_available(
            remote,
            HeartbeatReport {
                generation: 1,
                available: ResourceSet::from_pairs([(cpu(), Quantity::from_units(2))]),
                is_draining: false,
            },
        );
        let snap = view.snapshot_for_policy();
        let n = snap.get(&remote).unwrap();
        assert_eq!(n.total().get(cpu()), Quantity::from_units(8), "totals preserved");
        assert_eq!(n.available().get(cpu()), Quantity::from_units(2));
    }

    #[test]
    fn older_generation_heartbeats_are_dropped() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let remote = NodeId::from_u128(2);
        view.add_or_update(remote, node(8, 8));
        view.update_available(
            remote,
            HeartbeatReport {
                generation: 5,
                available: ResourceSet::from_pairs([(cpu(), Quantity::from_units(1))]),
                is_draining: false,
            },
        );
        view.update_available(
            remote,
            HeartbeatReport {
                generation: 3,
                available: ResourceSet::from_pairs([(cpu(), Quantity::from_units(7))]),
                is_draining: false,
            },
        );
        let snap = view.snapshot_for_policy();
        assert_eq!(
            snap.get(&remote).unwrap().available().get(cpu()),
            Quantity::from_units(1),
            "stale generation must not overwrite newer availability"
        );
    }

    #[test]
    fn local_node_is_never_removed() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        view.remove(local);
        assert!(view.contains(local));
    }

    #[test]
    fn draining_is_observable_but_does_not_remove_inventory() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let remote = NodeId::from_u128(2);
        view.add_or_update(remote, node(4, 4));
        view.set_draining(remote, true);
        assert!(view.is_draining(remote));
        assert!(view.get(remote).is_some());
    }
}
