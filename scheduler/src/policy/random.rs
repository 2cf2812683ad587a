//! Uniform-random selection among feasible, currently-schedulable nodes.
//!
//! Used for the zero-cpu actor-creation special case (SPEC_FULL.md §4.5 step 1): such actors
//! carry no resource demand, so every feasible node is an equally valid destination, and the
//! whole point is to avoid piling all of them onto one node.

use rand::seq::SliceRandom;
use tracing::debug;

use crate::ids::NodeId;
use crate::resources::ResourceRequest;
use crate::strategy::SchedulingOptions;

use super::PolicyInput;

pub(crate) fn schedule(input: &PolicyInput, request: &ResourceRequest, options: &SchedulingOptions) -> (Option<NodeId>, bool) {
    let candidates: Vec<NodeId> = input
        .feasible(request, options, false)
        .into_iter()
        .filter(|(id, node)| input.is_schedulable(*id, node, request))
        .map(|(id, _)| id)
        .collect();

    // A fresh RNG per call, per SPEC_FULL.md §4.5: successive calls must not collide on the same
    // seed and therefore the same pick.
    let mut rng = rand::thread_rng();
    let chosen = candidates.choose(&mut rng).copied();
    if chosen.is_none() {
        let is_infeasible = !input.any_feasible_anywhere(request);
        debug!(is_infeasible, "random: no schedulable node found");
        return (None, is_infeasible);
    }
    debug!(node_id = ?chosen, "random: chose node uniformly");
    (chosen, false)
}
