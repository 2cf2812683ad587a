//! Hard and soft node-affinity handling.
//!
//! Hard affinity never substitutes a different node for the named one (testable property 5 in
//! SPEC_FULL.md §8): on failure it reports nil. What happens next is ambiguous in the source this
//! spec was distilled from, which leaves it to "strategy flags not fully exercised"; this
//! implementation resolves that literally per SPEC_FULL.md's REDESIGN FLAGS: `fail_on_unavailable`
//! wins if set (always infeasible), otherwise `spill_on_unavailable` lets the call fall through to
//! Hybrid instead of failing outright, and with neither flag set the default is to fail.

use tracing::debug;

use crate::ids::NodeId;
use crate::resources::ResourceRequest;
use crate::strategy::SchedulingOptions;

use super::{hybrid, PolicyInput};

#[allow(clippy::too_many_arguments)]
pub(crate) fn schedule_hard(
    input: &PolicyInput,
    request: &ResourceRequest,
    options: &SchedulingOptions,
    node_id: NodeId,
    spill_on_unavailable: bool,
    fail_on_unavailable: bool,
    force_spillback: bool,
    preferred_node_id: NodeId,
) -> (Option<NodeId>, bool) {
    match input.snapshot.get(&node_id) {
        Some(node) if input.is_schedulable(node_id, node, request) => {
            debug!(%node_id, "hard affinity: target is schedulable");
            (Some(node_id), false)
        }
        _ if fail_on_unavailable => {
            debug!(%node_id, "hard affinity: target unavailable, fail_on_unavailable set");
            (None, true)
        }
        _ if spill_on_unavailable => {
            debug!(%node_id, "hard affinity: target unavailable, spilling to hybrid");
            hybrid::schedule(input, request, options, force_spillback, preferred_node_id)
        }
        _ => {
            debug!(%node_id, "hard affinity: target unavailable, no fallback flag set");
            (None, true)
        }
    }
}

/// Soft affinity tries the named node first; on any failure it falls through to the Hybrid
/// policy rather than reporting infeasible, since a soft constraint never blocks placement
/// elsewhere.
pub(crate) fn schedule_soft(
    input: &PolicyInput,
    request: &ResourceRequest,
    options: &SchedulingOptions,
    node_id: NodeId,
    force_spillback: bool,
    preferred_node_id: NodeId,
) -> (Option<NodeId>, bool) {
    if let Some(node) = input.snapshot.get(&node_id) {
        if input.is_schedulable(node_id, node, request) {
            debug!(%node_id, "soft affinity: target is schedulable");
            return (Some(node_id), false);
        }
    }
    debug!(%node_id, "soft affinity: target unavailable, falling back to hybrid");
    hybrid::schedule(input, request, options, force_spillback, preferred_node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_view::ClusterResourceView;
    use crate::resource_set::{cpu, Quantity, ResourceSet};
    use crate::resources::NodeResources;
    use std::collections::BTreeMap;

    fn node(total: u64, available: u64) -> NodeResources {
        NodeResources::new(
            ResourceSet::from_pairs([(cpu(), Quantity::from_units(total))]),
            ResourceSet::from_pairs([(cpu(), Quantity::from_units(available))]),
            BTreeMap::new(),
        )
    }

    fn req(units: u64) -> ResourceRequest {
        ResourceRequest::new(ResourceSet::from_pairs([(cpu(), Quantity::from_units(units))]))
    }

    #[test]
    fn hard_affinity_never_substitutes_a_different_node() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let target = NodeId::from_u128(2);
        view.add_or_update(target, node(1, 0)); // out of headroom
        let snapshot = view.snapshot_for_policy();
        let available = |_: NodeId| true;
        let input = PolicyInput {
            snapshot: &snapshot,
            local_node_id: local,
            node_available: &available,
        };
        let options = SchedulingOptions::default();
        let (chosen, infeasible) = schedule_hard(&input, &req(1), &options, target, false, true, false, NodeId::nil());
        assert_eq!(chosen, None, "must never fall back to `local`");
        assert!(infeasible);
    }

    #[test]
    fn hard_affinity_on_draining_target_is_infeasible() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let target = NodeId::from_u128(2);
        view.add_or_update(target, node(4, 4));
        view.set_draining(target, true);
        let snapshot = view.snapshot_for_policy();
        // Draining is folded into `node_available` by the façade; simulate that here.
        let available = move |id: NodeId| id != target;
        let input = PolicyInput {
            snapshot: &snapshot,
            local_node_id: local,
            node_available: &available,
        };
        let options = SchedulingOptions::default();
        let (chosen, infeasible) = schedule_hard(&input, &req(1), &options, target, false, true, false, NodeId::nil());
        assert_eq!(chosen, None);
        assert!(infeasible);
    }

    #[test]
    fn spill_on_unavailable_falls_through_to_hybrid() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let target = NodeId::from_u128(2);
        view.add_or_update(target, node(1, 0)); // out of headroom
        let snapshot = view.snapshot_for_policy();
        let available = |_: NodeId| true;
        let input = PolicyInput {
            snapshot: &snapshot,
            local_node_id: local,
            node_available: &available,
        };
        let options = SchedulingOptions::default();
        let (chosen, infeasible) = schedule_hard(&input, &req(1), &options, target, true, false, false, NodeId::nil());
        assert_eq!(chosen, Some(local), "spill_on_unavailable should fall through to hybrid");
        assert!(!infeasible);
    }

    #[test]
    fn soft_affinity_falls_back_when_target_fails() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let target = NodeId::from_u128(2);
        view.add_or_update(target, node(1, 0));
        let snapshot = view.snapshot_for_policy();
        let available = |_: NodeId| true;
        let input = PolicyInput {
            snapshot: &snapshot,
            local_node_id: local,
            node_available: &available,
        };
        let options = SchedulingOptions::default();
        let (chosen, infeasible) = schedule_soft(&input, &req(1), &options, target, false, NodeId::nil());
        assert_eq!(chosen, Some(local));
        assert!(!infeasible);
    }
}
