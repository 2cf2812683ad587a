//! The composite dispatcher: classifies a [`SchedulingStrategy`] and routes it to a leaf policy,
//! in the order laid out in SPEC_FULL.md §4.5.

use crate::cluster_view::ClusterSnapshot;
use crate::ids::NodeId;
use crate::resources::ResourceRequest;
use crate::strategy::{SchedulingOptions, SchedulingStrategy};

use super::{hybrid, node_affinity, random, spread, PolicyInput};

pub(crate) struct CompositeDispatcher;

impl CompositeDispatcher {
    /// Returns `(chosen_node, is_infeasible)`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn schedule(
        snapshot: &ClusterSnapshot,
        local_node_id: NodeId,
        node_available: &dyn Fn(NodeId) -> bool,
        strategy: &SchedulingStrategy,
        request: &ResourceRequest,
        options: &SchedulingOptions,
        actor_creation: bool,
        force_spillback: bool,
        preferred_node_id: NodeId,
    ) -> (Option<NodeId>, bool) {
        let input = PolicyInput {
            snapshot,
            local_node_id,
            node_available,
        };

        // Step 1: zero-cpu actor creation must spread even under most strategies, but never
        // overrides a hard affinity constraint.
        if actor_creation && request.is_empty() && !strategy.is_hard_node_affinity() {
            return random::schedule(&input, request, options);
        }

        match strategy {
            SchedulingStrategy::NodeAffinity {
                node_id,
                soft: false,
                spill_on_unavailable,
                fail_on_unavailable,
            } => node_affinity::schedule_hard(
                &input,
                request,
                options,
                *node_id,
                *spill_on_unavailable,
                *fail_on_unavailable,
                force_spillback,
                preferred_node_id,
            ),
            SchedulingStrategy::NodeAffinity { node_id, soft: true, .. } => node_affinity::schedule_soft(
                &input,
                request,
                options,
                *node_id,
                force_spillback,
                preferred_node_id,
            ),
            _ if strategy.is_placement_group_with_id() => {
                // Placement-group bundle resolution happens outside this core (SPEC_FULL.md
                // §4.5 step 4); by the time a concrete node is known, callers re-issue this as a
                // `NodeAffinity` strategy. Until then, report "not yet decided" rather than
                // guessing: callers should treat a nil/not-infeasible result as "retry once the
                // placement group has resolved a bundle location".
                (None, false)
            }
            SchedulingStrategy::Spread => spread::schedule(&input, request, options),
            _ => hybrid::schedule(&input, request, options, force_spillback, preferred_node_id),
        }
    }
}
