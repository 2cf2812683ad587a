//! Bundle (multi-request, all-or-nothing) scheduling: PACK / SPREAD / STRICT_PACK / STRICT_SPREAD
//! (SPEC_FULL.md §4.6).
//!
//! Every variant runs entirely against a working copy cloned from a single
//! [`ClusterSnapshot`]; nothing is written back to the real [`ClusterResourceView`] until every
//! request in the list has a node, at which point the touched nodes are committed in one atomic
//! swap. A failure partway through never leaves the working copy's deductions visible anywhere.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use tracing::debug;

use crate::cluster_view::ClusterResourceView;
use crate::ids::NodeId;
use crate::resource_set::cpu;
use crate::resources::{NodeResources, ResourceRequest};
use crate::strategy::{BundlePolicy, BundleScheduleFailure, SchedulingOptions, SchedulingResult};

pub(crate) struct BundleScheduler;

impl BundleScheduler {
    pub(crate) fn schedule(
        view: &ClusterResourceView,
        requests: &[ResourceRequest],
        policy: BundlePolicy,
        options: &SchedulingOptions,
    ) -> SchedulingResult {
        if requests.is_empty() {
            return SchedulingResult::Success(Vec::new());
        }

        let snapshot = view.snapshot_for_policy();
        let mut working: HashMap<NodeId, NodeResources> = (*snapshot).clone();
        let mut touched: HashSet<NodeId> = HashSet::new();

        let outcome = match policy {
            BundlePolicy::Pack => pack(requests, &mut working, &mut touched, options.max_cpu_fraction_per_node),
            BundlePolicy::Spread => spread(requests, &mut working, &mut touched, false),
            BundlePolicy::StrictPack => {
                strict_pack(requests, &mut working, &mut touched, options.max_cpu_fraction_per_node)
            }
            BundlePolicy::StrictSpread => spread(requests, &mut working, &mut touched, true),
        };

        match outcome {
            Ok(assignment) => {
                let commit: HashMap<NodeId, NodeResources> = touched
                    .into_iter()
                    .map(|id| (id, working.remove(&id).expect("touched nodes exist in the working copy")))
                    .collect();
                debug!(nodes = commit.len(), requests = requests.len(), "bundle placement committed");
                view.commit_many(commit);
                SchedulingResult::Success(assignment)
            }
            Err(failure) => {
                debug!(%failure, "bundle placement discarded, view unchanged");
                match failure {
                    BundleScheduleFailure::Infeasible(msg) => SchedulingResult::Infeasible(msg),
                    BundleScheduleFailure::Failed(msg) => SchedulingResult::Failed(msg),
                }
            }
        }
    }
}

/// `true` iff no node in the fleet's *totals* could ever satisfy `request`, regardless of current
/// availability.
fn individually_infeasible(request: &ResourceRequest, working: &HashMap<NodeId, NodeResources>) -> bool {
    !working.values().any(|n| n.is_feasible(request))
}

fn any_individually_infeasible(requests: &[ResourceRequest], working: &HashMap<NodeId, NodeResources>) -> bool {
    requests.iter().any(|r| individually_infeasible(r, working))
}

/// `true` iff tentatively allocating `request` on `node` would push its CPU utilization strictly
/// past `cap_fraction`. A `cap_fraction >= 1.0` never rejects, since utilization cannot exceed 1.0.
fn exceeds_cpu_cap(node: &NodeResources, cap_fraction: f64) -> bool {
    cap_fraction < 1.0 && node.utilization(cpu()) > cap_fraction
}

fn sorted_node_ids(working: &HashMap<NodeId, NodeResources>) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = working.keys().copied().collect();
    ids.sort();
    ids
}

/// Greedy first-fit-decreasing: largest bundles (by bottleneck quantity) placed first, each onto
/// the first node (in a fixed deterministic order) with enough headroom — which naturally packs
/// onto already-used nodes before spilling to a fresh one.
fn pack(
    requests: &[ResourceRequest],
    working: &mut HashMap<NodeId, NodeResources>,
    touched: &mut HashSet<NodeId>,
    cap_fraction: f64,
) -> Result<Vec<NodeId>, BundleScheduleFailure> {
    let node_ids = sorted_node_ids(working);
    let order: Vec<usize> = (0..requests.len())
        .sorted_by_key(|&i| {
            let bottleneck_qty = requests[i].bottleneck().map(|r| requests[i].get(r)).unwrap_or_default();
            std::cmp::Reverse(bottleneck_qty)
        })
        .collect();

    let mut assignment = vec![NodeId::nil(); requests.len()];
    for idx in order {
        let request = &requests[idx];
        let mut placed = false;
        for &node_id in &node_ids {
            let node = working.get_mut(&node_id).expect("node_ids drawn from working copy");
            if !node.has_sufficient(request, false) {
                continue;
            }
            node.allocate(request).expect("has_sufficient just confirmed headroom");
            if exceeds_cpu_cap(node, cap_fraction) {
                node.release(request);
                continue;
            }
            touched.insert(node_id);
            assignment[idx] = node_id;
            placed = true;
            break;
        }
        if !placed {
            return Err(classify_failure(requests, working, "no node has headroom for a PACK bundle"));
        }
    }
    Ok(assignment)
}

/// Distinct-node-per-request when there are enough nodes; falls back to reuse, always preferring
/// the least-used node first, once the fleet is exhausted. `strict` disables that fallback.
fn spread(
    requests: &[ResourceRequest],
    working: &mut HashMap<NodeId, NodeResources>,
    touched: &mut HashSet<NodeId>,
    strict: bool,
) -> Result<Vec<NodeId>, BundleScheduleFailure> {
    if strict && requests.len() > working.len() {
        return Err(BundleScheduleFailure::Infeasible(format!(
            "STRICT_SPREAD needs {} distinct nodes but the fleet only has {}",
            requests.len(),
            working.len()
        )));
    }

    let node_ids = sorted_node_ids(working);
    let mut use_count: HashMap<NodeId, usize> = node_ids.iter().map(|&id| (id, 0)).collect();
    let mut assignment = vec![NodeId::nil(); requests.len()];

    for (idx, request) in requests.iter().enumerate() {
        let mut candidates: Vec<NodeId> = node_ids
            .iter()
            .copied()
            .filter(|id| working[id].has_sufficient(request, false))
            .filter(|id| !strict || use_count[id] == 0)
            .collect();
        if candidates.is_empty() {
            return Err(classify_failure(requests, working, "no distinct-enough node available for a SPREAD bundle"));
        }
        candidates.sort_by_key(|id| (use_count[id], *id));
        let chosen = candidates[0];

        let node = working.get_mut(&chosen).expect("chosen from working copy");
        node.allocate(request).expect("has_sufficient just confirmed headroom");
        *use_count.get_mut(&chosen).unwrap() += 1;
        touched.insert(chosen);
        assignment[idx] = chosen;
    }
    Ok(assignment)
}

/// Every request must land on the *same* single node.
fn strict_pack(
    requests: &[ResourceRequest],
    working: &mut HashMap<NodeId, NodeResources>,
    touched: &mut HashSet<NodeId>,
    cap_fraction: f64,
) -> Result<Vec<NodeId>, BundleScheduleFailure> {
    let node_ids = sorted_node_ids(working);
    for &node_id in &node_ids {
        let mut candidate = working[&node_id].clone();
        let mut ok = true;
        for request in requests {
            if !candidate.has_sufficient(request, false) {
                ok = false;
                break;
            }
            candidate.allocate(request).expect("has_sufficient just confirmed headroom");
            if exceeds_cpu_cap(&candidate, cap_fraction) {
                ok = false;
                break;
            }
        }
        if ok {
            working.insert(node_id, candidate);
            touched.insert(node_id);
            return Ok(vec![node_id; requests.len()]);
        }
    }

    let mut combined = ResourceRequest::default();
    for request in requests {
        let mut merged = combined.resources().clone();
        merged.add(request.resources());
        combined = ResourceRequest::new(merged);
    }
    let no_node_could_ever_fit = !working.values().any(|n| n.is_feasible(&combined));
    if no_node_could_ever_fit || any_individually_infeasible(requests, working) {
        Err(BundleScheduleFailure::Infeasible(
            "no single node's total capacity can ever hold this STRICT_PACK bundle".into(),
        ))
    } else {
        Err(BundleScheduleFailure::Failed(
            "no single node currently has enough free headroom for this STRICT_PACK bundle".into(),
        ))
    }
}

fn classify_failure(requests: &[ResourceRequest], working: &HashMap<NodeId, NodeResources>, msg: &str) -> BundleScheduleFailure {
    if any_individually_infeasible(requests, working) {
        BundleScheduleFailure::Infeasible(msg.to_string())
    } else {
        BundleScheduleFailure::Failed(msg.to_string())
    }
}
