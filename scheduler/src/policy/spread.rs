//! Pure load-spreading: choose the feasible, currently-schedulable node least loaded on the
//! request's bottleneck resource.

use tracing::debug;

use crate::ids::NodeId;
use crate::resources::ResourceRequest;
use crate::strategy::SchedulingOptions;

use super::{tie_break_hash, PolicyInput};

pub(crate) fn schedule(input: &PolicyInput, request: &ResourceRequest, options: &SchedulingOptions) -> (Option<NodeId>, bool) {
    let bottleneck = request.bottleneck();
    let fingerprint = request.fingerprint();

    let mut candidates: Vec<(NodeId, f64)> = input
        .feasible(request, options, false)
        .into_iter()
        .filter(|(id, node)| input.is_schedulable(*id, node, request))
        .map(|(id, node)| {
            let utilization = bottleneck.map(|r| node.utilization(r)).unwrap_or(0.0);
            (id, utilization)
        })
        .collect();

    if candidates.is_empty() {
        let is_infeasible = !input.any_feasible_anywhere(request);
        debug!(is_infeasible, "spread: no schedulable node found");
        return (None, is_infeasible);
    }

    candidates.sort_by(|(id_a, u_a), (id_b, u_b)| {
        u_a.partial_cmp(u_b)
            .unwrap()
            .then_with(|| tie_break_hash(*id_a, &fingerprint).cmp(&tie_break_hash(*id_b, &fingerprint)))
    });
    let chosen = candidates.first().map(|(id, _)| *id);
    debug!(node_id = ?chosen, "spread: chose least-utilized node");
    (chosen, false)
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
    fn picks_least_utilized() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 1)); // 75% used
        let b = NodeId::from_u128(2);
        view.add_or_update(b, node(4, 4)); // 0% used
        let snapshot = view.snapshot_for_policy();
        let available = |_: NodeId| true;
        let input = PolicyInput {
            snapshot: &snapshot,
            local_node_id: local,
            node_available: &available,
        };
        let (chosen, infeasible) = schedule(&input, &req(1), &SchedulingOptions::default());
        assert_eq!(chosen, Some(b));
        assert!(!infeasible);
    }

    #[test]
    fn avoid_local_node_excludes_it_even_when_least_utilized() {
        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4)); // 0% used
        let b = NodeId::from_u128(2);
        view.add_or_update(b, node(4, 1)); // 75% used
        let snapshot = view.snapshot_for_policy();
        let available = |_: NodeId| true;
        let input = PolicyInput {
            snapshot: &snapshot,
            local_node_id: local,
            node_available: &available,
        };
        let options = SchedulingOptions {
            avoid_local_node: true,
            ..Default::default()
        };
        let (chosen, infeasible) = schedule(&input, &req(1), &options);
        assert_eq!(chosen, Some(b), "local is the better fit but must be excluded");
        assert!(!infeasible);
    }

    #[test]
    fn avoid_gpu_nodes_excludes_nodes_with_any_gpu_capacity() {
        use crate::resource_set::{gpu, Quantity as Q};

        let local = NodeId::from_u128(1);
        let view = ClusterResourceView::new(local, node(4, 4));
        let gpu_node = NodeId::from_u128(2);
        let gpu_total = ResourceSet::from_pairs([(cpu(), Q::from_units(4)), (gpu(), Q::from_units(1))]);
        view.add_or_update(gpu_node, NodeResources::new(gpu_total.clone(), gpu_total, BTreeMap::new()));
        let snapshot = view.snapshot_for_policy();
        let available = |_: NodeId| true;
        let input = PolicyInput {
            snapshot: &snapshot,
            local_node_id: local,
            node_available: &available,
        };
        let options = SchedulingOptions {
            avoid_gpu_nodes: true,
            ..Default::default()
        };
        let (chosen, infeasible) = schedule(&input, &req(1), &options);
        assert_eq!(chosen, Some(local), "the GPU-carrying node must be excluded");
        assert!(!infeasible);
    }
}
