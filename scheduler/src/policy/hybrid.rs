//! The default leaf policy: prefer a named node, then spread below a utilization threshold, then
//! spill onto a busier-but-available node, then optionally queue on an infeasible-right-now node.

use tracing::debug;

use crate::ids::NodeId;
use crate::resources::ResourceRequest;
use crate::strategy::SchedulingOptions;

use super::{pick_by_tie_break, PolicyInput};

pub(crate) fn schedule(
    input: &PolicyInput,
    request: &ResourceRequest,
    options: &SchedulingOptions,
    force_spillback: bool,
    preferred_node_id: NodeId,
) -> (Option<NodeId>, bool) {
    // The local node is excluded from every preference step below when spillback is forced,
    // unless the caller explicitly still prefers it (SPEC_FULL.md §4.5 Hybrid policy).
    let exclude_local = force_spillback && preferred_node_id != input.local_node_id;

    // Step 1: preferred node, if it's feasible on current availability (not just totals).
    if !preferred_node_id.is_nil() && !(exclude_local && preferred_node_id == input.local_node_id) {
        if let Some(node) = input.snapshot.get(&preferred_node_id) {
            if input.is_schedulable(preferred_node_id, node, request) {
                debug!(node_id = %preferred_node_id, "hybrid: chose preferred node");
                return (Some(preferred_node_id), false);
            }
        }
    }

    let feasible = input.feasible(request, options, exclude_local);
    let mut below = Vec::new();
    let mut above = Vec::new();
    for (id, node) in &feasible {
        if !input.is_schedulable(*id, node, request) {
            continue;
        }
        if node.below_utilization_threshold(options.spread_threshold) {
            below.push((*id, *node));
        } else {
            above.push((*id, *node));
        }
    }

    let fingerprint = request.fingerprint();

    // Step 2: any below-threshold node.
    if !below.is_empty() {
        let chosen = pick_by_tie_break(below, &fingerprint);
        debug!(node_id = ?chosen, "hybrid: chose below-threshold node");
        return (chosen, false);
    }

    // Step 3: any above-threshold but available node.
    if !above.is_empty() {
        let chosen = pick_by_tie_break(above, &fingerprint);
        debug!(node_id = ?chosen, "hybrid: chose above-threshold node");
        return (chosen, false);
    }

    // Step 4: queue locally on a feasible-but-not-currently-available node.
    if !options.require_node_available && !feasible.is_empty() {
        let chosen = pick_by_tie_break(feasible, &fingerprint);
        debug!(node_id = ?chosen, "hybrid: queuing on feasible-but-unavailable node");
        return (chosen, false);
    }

    // Step 5: nothing usable. Whether this is permanent depends on the *whole* fleet's totals,
    // not just the spillback-restricted subset considered above.
    let is_infeasible = !input.any_feasible_anywhere(request);
    debug!(is_infeasible, "hybrid: no schedulable node found");
    (None, is_infeasible)
}
