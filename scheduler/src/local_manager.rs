//! Authoritative owner of the local node's resource record.
//!
//! Bridges the two injected object-store predicates and the rest of the fleet: every mutation
//! here refreshes the local node's object-store decoration and, if anything observable changed,
//! invokes the registered change callback so [`crate::cluster_view::ClusterResourceView`] can
//! fold the update in (SPEC_FULL.md §4.4).

use std::collections::{BTreeMap, HashMap};

use tracing::error;
use uuid::Uuid;

use crate::resource_set::{ResourceSet, Underflow};
use crate::resources::{NodeResources, ObjectStoreState, ResourceRequest};

/// Handle to an in-flight local allocation, returned by [`LocalResourceManager::allocate`] and
/// required to [`LocalResourceManager::release`] it. Opaque by design: callers should not expect
/// to reconstruct one.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct AllocationId(Uuid);

pub struct LocalResourceManager {
    resources: NodeResources,
    used_object_store_bytes: Box<dyn Fn() -> i64 + Send + Sync>,
    pull_manager_at_capacity: Box<dyn Fn() -> bool + Send + Sync>,
    on_change: Box<dyn Fn(&NodeResources) + Send + Sync>,
    in_flight: HashMap<AllocationId, ResourceRequest>,
    last_published: Option<NodeResources>,
}

impl LocalResourceManager {
    pub fn new(
        total: ResourceSet,
        labels: BTreeMap<String, String>,
        used_object_store_bytes: impl Fn() -> i64 + Send + Sync + 'static,
        pull_manager_at_capacity: impl Fn() -> bool + Send + Sync + 'static,
        on_change: impl Fn(&NodeResources) + Send + Sync + 'static,
    ) -> Self {
        let resources = NodeResources::new(total.clone(), total, labels);
        let mut manager = Self {
            resources,
            used_object_store_bytes: Box::new(used_object_store_bytes),
            pull_manager_at_capacity: Box::new(pull_manager_at_capacity),
            on_change: Box::new(on_change),
            in_flight: HashMap::new(),
            last_published: None,
        };
        manager.refresh_object_store_state();
        manager.publish();
        manager
    }

    fn refresh_object_store_state(&mut self) {
        let state = ObjectStoreState {
            used_bytes: (self.used_object_store_bytes)(),
            at_capacity: (self.pull_manager_at_capacity)(),
        };
        self.resources.set_object_store(state);
    }

    /// Invokes the change callback iff the published state actually changed since the last call,
    /// so two identical consecutive states never produce two notifications (SPEC_FULL.md §4.4).
    fn publish(&mut self) {
        if self.last_published.as_ref() == Some(&self.resources) {
            return;
        }
        (self.on_change)(&self.resources);
        self.last_published = Some(self.resources.clone());
    }

    pub fn resources(&self) -> &NodeResources {
        &self.resources
    }

    /// Re-queries the injected predicates and republishes if anything changed. Callers invoke
    /// this on a timer or in response to an object-store event; the scheduler core never polls on
    /// its own.
    pub fn refresh(&mut self) {
        self.refresh_object_store_state();
        self.publish();
    }

    /// Deducts `request` from the local node's availability and returns a handle for later
    /// release. Fails if the local node doesn't currently have headroom.
    pub fn allocate(&mut self, request: ResourceRequest) -> Result<AllocationId, Underflow> {
        self.resources.allocate(&request)?;
        let id = AllocationId(Uuid::new_v4());
        self.in_flight.insert(id, request);
        self.publish();
        Ok(id)
    }

    /// Returns a previously allocated request's quantities to availability. Releasing an unknown
    /// or already-released id is logged as an error and otherwise ignored: a double release is a
    /// caller bug, not a condition serious enough to abort the dispatcher loop over.
    pub fn release(&mut self, id: AllocationId) {
        match self.in_flight.remove(&id) {
            Some(request) => {
                self.resources.release(&request);
                self.publish();
            }
            None => error!(?id, "release of unknown or already-released local allocation"),
        }
    }

    pub fn set_draining(&mut self, draining: bool) {
        self.resources.set_draining(draining);
        self.publish();
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn debug_string(&self) -> String {
        format!(
            "total={:?} available={:?} draining={} in_flight_allocations={}",
            self.resources.total(),
            self.resources.available(),
            self.resources.is_draining(),
            self.in_flight.len(),
        )
    }
}
