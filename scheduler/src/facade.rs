//! [`ClusterResourceScheduler`]: the public façade combining the cluster-wide view, the local
//! node's own resource manager, and the composite/bundle dispatch rules into the single entry
//! point an embedder talks to (SPEC_FULL.md §4.7, grounded on `cluster_resource_scheduler.cc`'s
//! `GetBestSchedulableNode` / `IsSchedulable` / `AllocateRemoteTaskResources` / `DebugString`
//! surface).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::bundle::BundleScheduler;
use crate::cluster_view::ClusterResourceView;
use crate::error::invariant_violation;
use crate::ids::NodeId;
use crate::local_manager::LocalResourceManager;
use crate::policy::CompositeDispatcher;
use crate::resource_set::ResourceSet;
use crate::resources::{NodeResources, ResourceRequest};
use crate::strategy::{BundlePolicy, SchedulingOptions, SchedulingStrategy, SchedulingResult};

/// Outcome of [`ClusterResourceScheduler::get_best_schedulable_node`]. `violations` mirrors the
/// original `out_violations` reference parameter; this core never produces soft-constraint
/// violations of its own, so it is always `0` on every path, success or not (see DESIGN.md).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSelection {
    pub node_id: Option<NodeId>,
    pub is_infeasible: bool,
    pub violations: u32,
}

pub struct ClusterResourceScheduler {
    view: Arc<ClusterResourceView>,
    local: LocalResourceManager,
    is_node_available: Box<dyn Fn(NodeId) -> bool + Send + Sync>,
    local_raylet_alive: AtomicBool,
}

impl ClusterResourceScheduler {
    pub fn new(
        local_node_id: NodeId,
        local_total: ResourceSet,
        local_labels: BTreeMap<String, String>,
        used_object_store_bytes: impl Fn() -> i64 + Send + Sync + 'static,
        pull_manager_at_capacity: impl Fn() -> bool + Send + Sync + 'static,
        is_node_available: impl Fn(NodeId) -> bool + Send + Sync + 'static,
    ) -> Self {
        let placeholder = NodeResources::new(local_total.clone(), local_total.clone(), local_labels.clone());
        let view = Arc::new(ClusterResourceView::new(local_node_id, placeholder));
        let view_for_callback = Arc::clone(&view);
        let local = LocalResourceManager::new(
            local_total,
            local_labels,
            used_object_store_bytes,
            pull_manager_at_capacity,
            move |resources| view_for_callback.add_or_update(local_node_id, resources.clone()),
        );
        Self {
            view,
            local,
            is_node_available: Box::new(is_node_available),
            local_raylet_alive: AtomicBool::new(true),
        }
    }

    pub fn local_node_id(&self) -> NodeId {
        self.view.local_node_id()
    }

    pub fn view(&self) -> &ClusterResourceView {
        &self.view
    }

    pub fn local(&self) -> &LocalResourceManager {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut LocalResourceManager {
        &mut self.local
    }

    /// Looks up a node's current resource record for diagnostics/observability callers that need
    /// more than `is_schedulable`'s boolean answer.
    pub fn node_resources(&self, node_id: NodeId) -> Result<NodeResources, crate::error::ScheduleError> {
        self.view.get(node_id).ok_or(crate::error::ScheduleError::UnknownNode(node_id))
    }

    /// Toggles the local raylet's own liveness, folded into every schedulability check for the
    /// local node the same way `is_node_available` is folded in for remote ones (SPEC_FULL.md
    /// §6). A scheduler bootstrapping before its raylet has registered sets this `false`.
    pub fn set_local_raylet_alive(&self, alive: bool) {
        self.local_raylet_alive.store(alive, Ordering::Relaxed);
    }

    /// The combined availability signal policies see: drain state and external liveness for
    /// remote nodes, drain state and the raylet-presence flag for the local node. A draining
    /// local node must never be selected, the same way a draining remote node never is
    /// (SPEC_FULL.md §3 invariant (c)).
    fn effective_availability(&self, node_id: NodeId) -> bool {
        if node_id == self.view.local_node_id() {
            self.local_raylet_alive.load(Ordering::Relaxed) && !self.view.is_draining(node_id)
        } else {
            !self.view.is_draining(node_id) && (self.is_node_available)(node_id)
        }
    }

    /// Picks a node for a single task or actor (SPEC_FULL.md §4.5, §4.7).
    #[allow(clippy::too_many_arguments)]
    pub fn get_best_schedulable_node(
        &self,
        request: &ResourceRequest,
        strategy: &SchedulingStrategy,
        options: &SchedulingOptions,
        actor_creation: bool,
        force_spillback: bool,
        preferred_node_id: NodeId,
    ) -> NodeSelection {
        let snapshot = self.view.snapshot_for_policy();
        let available = |id: NodeId| self.effective_availability(id);
        let (node_id, is_infeasible) = CompositeDispatcher::schedule(
            &snapshot,
            self.view.local_node_id(),
            &available,
            strategy,
            request,
            options,
            actor_creation,
            force_spillback,
            preferred_node_id,
        );
        if is_infeasible {
            info!(?strategy, "selection infeasible: no node's totals satisfy this request");
        } else {
            debug!(?node_id, ?strategy, "selection completed");
        }
        NodeSelection {
            node_id,
            is_infeasible,
            violations: 0,
        }
    }

    /// A pure query: would `request` fit on `node_id` right now. Ignores object-store pressure iff
    /// `node_id` is the local node (SPEC_FULL.md §4.7).
    pub fn is_schedulable(&self, request: &ResourceRequest, node_id: NodeId) -> bool {
        let ignore_object_store = node_id == self.view.local_node_id();
        match self.view.get(node_id) {
            Some(node) => node.has_sufficient(request, ignore_object_store) && self.effective_availability(node_id),
            None => false,
        }
    }

    /// Commits `request` against a remote node's availability, re-checking schedulability in the
    /// same atomic step it subtracts (SPEC_FULL.md §7's "RaceLost"). Aborts the process if asked
    /// to target the local node: remote allocation bookkeeping and local allocation bookkeeping
    /// are deliberately separate paths ([`LocalResourceManager::allocate`] is the local one), and
    /// conflating them would silently double-book the local node's resources.
    pub fn allocate_remote_task_resources(&self, node_id: NodeId, request: &ResourceRequest) -> bool {
        if node_id == self.view.local_node_id() {
            invariant_violation(format!(
                "allocate_remote_task_resources targeted the local node {node_id}; use LocalResourceManager instead"
            ));
        }
        let ok = self
            .view
            .try_allocate(node_id, request, false, || self.effective_availability(node_id));
        if ok {
            debug!(%node_id, "remote allocation committed");
        } else {
            debug!(%node_id, "remote allocation lost the race or target is no longer schedulable");
        }
        ok
    }

    /// Bundle (all-or-nothing, multi-request) scheduling (SPEC_FULL.md §4.6).
    pub fn schedule(&self, requests: &[ResourceRequest], policy: BundlePolicy, options: &SchedulingOptions) -> SchedulingResult {
        BundleScheduler::schedule(&self.view, requests, policy, options)
    }

    pub fn debug_string(&self) -> String {
        let snapshot = self.view.snapshot_for_policy();
        format!(
            "local_node={} nodes_in_view={} local={{{}}}",
            self.view.local_node_id(),
            snapshot.len(),
            self.local.debug_string(),
        )
    }

    /// A structured counterpart to [`Self::debug_string`] for embedders that expose scheduler
    /// state over an admin/metrics endpoint rather than a log line.
    pub fn debug_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self.view.snapshot_for_policy().as_ref())
    }
}
