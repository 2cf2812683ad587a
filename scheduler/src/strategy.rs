//! Strategy and options tagged variants consumed by the composite dispatcher and the façade.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::ids::{NodeId, PlacementGroupId};

/// How a single task should be placed. See SPEC_FULL.md §3 and §4.5.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SchedulingStrategy {
    Default,
    Spread,
    Random,
    NodeAffinity {
        node_id: NodeId,
        soft: bool,
        spill_on_unavailable: bool,
        fail_on_unavailable: bool,
    },
    PlacementGroup {
        pg_id: PlacementGroupId,
        bundle_index: usize,
        capture_child_tasks: bool,
    },
}

impl SchedulingStrategy {
    /// Hard node affinity (`soft == false`) is the one strategy exempt from the zero-cpu
    /// actor-creation special case (SPEC_FULL.md §4.5 step 1).
    pub fn is_hard_node_affinity(&self) -> bool {
        matches!(self, SchedulingStrategy::NodeAffinity { soft: false, .. })
    }

    pub fn is_placement_group_with_id(&self) -> bool {
        matches!(self, SchedulingStrategy::PlacementGroup { pg_id, .. } if !pg_id.is_empty())
    }
}

/// Per-call, immutable knobs for the leaf policies (SPEC_FULL.md §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulingOptions {
    pub spread_threshold: f64,
    pub avoid_local_node: bool,
    pub require_node_available: bool,
    pub avoid_gpu_nodes: bool,
    /// Bundle policies only (PACK/STRICT_PACK): caps the fraction of a node's CPU total a single
    /// bundle placement round may consume.
    pub max_cpu_fraction_per_node: f64,
}

impl Default for SchedulingOptions {
    fn default() -> Self {
        Self {
            spread_threshold: 0.5,
            avoid_local_node: false,
            require_node_available: true,
            avoid_gpu_nodes: false,
            max_cpu_fraction_per_node: 1.0,
        }
    }
}

/// Which variant a bundle scheduling call uses (SPEC_FULL.md §4.6).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, EnumString, Display)]
pub enum BundlePolicy {
    Pack,
    Spread,
    StrictPack,
    StrictSpread,
}

/// Why a bundle scheduling call didn't return a successful placement.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BundleScheduleFailure {
    /// No node's totals can satisfy the request, now or ever: retrying won't help until the
    /// fleet's capacity changes.
    #[error("bundle placement is infeasible: {0}")]
    Infeasible(String),
    /// Totals would suffice somewhere but current availability doesn't: transient, caller may
    /// retry.
    #[error("bundle placement failed: {0}")]
    Failed(String),
}

/// Outcome of a bundle scheduling call (SPEC_FULL.md §3, §4.6).
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulingResult {
    /// One node id per input request, same order.
    Success(Vec<NodeId>),
    Infeasible(String),
    Failed(String),
}

impl SchedulingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SchedulingResult::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_affinity_is_detected() {
        let hard = SchedulingStrategy::NodeAffinity {
            node_id: NodeId::from_u128(1),
            soft: false,
            spill_on_unavailable: false,
            fail_on_unavailable: true,
        };
        let soft = SchedulingStrategy::NodeAffinity {
            node_id: NodeId::from_u128(1),
            soft: true,
            spill_on_unavailable: true,
            fail_on_unavailable: false,
        };
        assert!(hard.is_hard_node_affinity());
        assert!(!soft.is_hard_node_affinity());
        assert!(!SchedulingStrategy::Default.is_hard_node_affinity());
    }

    #[test]
    fn empty_pg_id_is_not_an_affinity_tag() {
        let pg = SchedulingStrategy::PlacementGroup {
            pg_id: PlacementGroupId::new(""),
            bundle_index: 0,
            capture_child_tasks: false,
        };
        assert!(!pg.is_placement_group_with_id());
    }
}
