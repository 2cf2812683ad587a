//! Leaf scheduling policies plus the composite dispatcher that routes a request to one of them.
//!
//! Each leaf is a pure function over a [`ClusterSnapshot`]: `(snapshot, request, options) ->
//! Option<NodeId>`. No leaf suspends or mutates the view (SPEC_FULL.md §5).

mod composite;
mod hybrid;
mod node_affinity;
mod random;
mod spread;

pub(crate) use composite::CompositeDispatcher;

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::cluster_view::ClusterSnapshot;
use crate::ids::NodeId;
use crate::resource_set::gpu;
use crate::resources::{NodeResources, ResourceRequest};
use crate::strategy::SchedulingOptions;

/// Read-only context threaded through every leaf policy: the fleet snapshot, the scheduler's own
/// identity (needed for the object-store carve-out), and the combined availability predicate the
/// façade computed from drain state + external liveness (SPEC_FULL.md §6).
pub(crate) struct PolicyInput<'a> {
    pub snapshot: &'a ClusterSnapshot,
    pub local_node_id: NodeId,
    pub node_available: &'a dyn Fn(NodeId) -> bool,
}

impl<'a> PolicyInput<'a> {
    /// Feasible (totals satisfy the request) over every node in the fleet, regardless of
    /// `exclude` or current availability. Used only to compute the infeasible flag, which must
    /// reflect the whole fleet's *capacity*, not the subset a particular call is willing to use.
    pub fn any_feasible_anywhere(&self, request: &ResourceRequest) -> bool {
        self.snapshot.values().any(|n| n.is_feasible(request))
    }

    /// `node_id` is schedulable right now for `request`: sufficient availability, the
    /// object-store carve-out applied iff `node_id` is local, and the combined availability
    /// predicate holds.
    pub fn is_schedulable(&self, node_id: NodeId, node: &NodeResources, request: &ResourceRequest) -> bool {
        let ignore_object_store = node_id == self.local_node_id;
        node.has_sufficient(request, ignore_object_store) && (self.node_available)(node_id)
    }

    /// Feasible nodes after applying the caller's exclusion and the `options`-level preference
    /// knobs (SPEC_FULL.md §3): `avoid_local_node` drops the local node the same way a forced
    /// spillback would, and `avoid_gpu_nodes` drops any node whose totals carry a nonzero GPU
    /// share, keeping GPU inventory free for GPU-requesting work.
    pub fn feasible(
        &self,
        request: &ResourceRequest,
        options: &SchedulingOptions,
        exclude_local: bool,
    ) -> Vec<(NodeId, &NodeResources)> {
        let exclude_local = exclude_local || options.avoid_local_node;
        self.snapshot
            .iter()
            .filter(|(id, _)| !(exclude_local && **id == self.local_node_id))
            .filter(|(_, n)| !options.avoid_gpu_nodes || n.total().get(gpu()).is_zero())
            .filter(|(_, n)| n.is_feasible(request))
            .map(|(id, n)| (*id, n))
            .collect()
    }
}

/// Deterministic tie-break used by Hybrid/Spread when several nodes are equally preferable: a
/// fast, non-adversarial hash (this is internal load-spreading, not a security boundary) of the
/// node id and the request's shape, so repeated identical requests spread across ties instead of
/// always landing on the same node.
pub(crate) fn tie_break_hash(node_id: NodeId, fingerprint: &str) -> u64 {
    let mut hasher = FxHasher::default();
    node_id.hash(&mut hasher);
    fingerprint.hash(&mut hasher);
    hasher.finish()
}

pub(crate) fn pick_by_tie_break(
    mut candidates: Vec<(NodeId, &NodeResources)>,
    fingerprint: &str,
) -> Option<NodeId> {
    candidates.sort_by_key(|(id, _)| tie_break_hash(*id, fingerprint));
    candidates.first().map(|(id, _)| *id)
}
