//! Per-node resource records and the label/object-store feasibility rules layered on top of
//! plain [`ResourceSet`] arithmetic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource_set::{critical_resources, Quantity, ResourceName, ResourceSet};

/// A set of label key=value pairs a node must carry for a request to be feasible on it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    required: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        assert!(!key.is_empty() && !value.is_empty(), "labels must be non-empty");
        self.required.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn is_satisfied_by(&self, labels: &BTreeMap<String, String>) -> bool {
        self.required
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|lv| lv == v))
    }
}

/// A task's resource demand: quantities per resource, plus the object-store flag and an optional
/// label selector. See SPEC_FULL.md §3.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    resources: ResourceSet,
    pub requires_object_store_memory: bool,
    pub label_selector: LabelSelector,
}

impl ResourceRequest {
    pub fn new(resources: ResourceSet) -> Self {
        Self {
            resources,
            requires_object_store_memory: false,
            label_selector: LabelSelector::new(),
        }
    }

    pub fn with_object_store_memory(mut self) -> Self {
        self.requires_object_store_memory = true;
        self
    }

    pub fn with_label_selector(mut self, selector: LabelSelector) -> Self {
        self.label_selector = selector;
        self
    }

    pub fn get(&self, name: ResourceName) -> Quantity {
        self.resources.get(name)
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// A deterministic string summarizing this request's shape, used as the tie-break hash input
    /// for load-spreading (SPEC_FULL.md §4.5). Two requests with the same quantities always
    /// fingerprint identically, regardless of construction order, because `ResourceSet` iterates
    /// in resource-name order.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        for (name, qty) in self.resources.iter() {
            out.push_str(name.as_str());
            out.push('=');
            out.push_str(&qty.as_f64().to_string());
            out.push(';');
        }
        out
    }

    /// The resource this request leans on hardest: the critical resource (CPU/GPU/memory) with
    /// the largest quantity, or else any nonzero resource. `None` for an empty request.
    pub fn bottleneck(&self) -> Option<ResourceName> {
        critical_resources()
            .into_iter()
            .filter(|r| !self.get(*r).is_zero())
            .max_by_key(|r| self.get(*r))
            .or_else(|| self.resources.iter().map(|(n, _)| n).next())
    }
}

/// The local node's live reading of object-store pressure, fed by the two predicates injected
/// into [`crate::local_manager::LocalResourceManager`]. `None` on every node this scheduler
/// doesn't consider "local" — remote object-store pressure is not tracked by this core (see
/// SPEC_FULL.md §6).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreState {
    pub used_bytes: i64,
    pub at_capacity: bool,
}

/// A node's total/available resource inventory, labels, and drain state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeResources {
    total: ResourceSet,
    available: ResourceSet,
    labels: BTreeMap<String, String>,
    is_draining: bool,
    object_store: Option<ObjectStoreState>,
    #[serde(default)]
    generation: u64,
}

impl NodeResources {
    pub fn new(total: ResourceSet, available: ResourceSet, labels: BTreeMap<String, String>) -> Self {
        debug_assert!(
            total.ge(&available),
            "available must never exceed total at construction"
        );
        Self {
            total,
            available,
            labels,
            is_draining: false,
            object_store: None,
            generation: 0,
        }
    }

    pub fn total(&self) -> &ResourceSet {
        &self.total
    }

    pub fn available(&self) -> &ResourceSet {
        &self.available
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn is_draining(&self) -> bool {
        self.is_draining
    }

    pub fn set_draining(&mut self, draining: bool) {
        self.is_draining = draining;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn object_store(&self) -> Option<&ObjectStoreState> {
        self.object_store.as_ref()
    }

    pub fn set_object_store(&mut self, state: ObjectStoreState) {
        self.object_store = Some(state);
    }

    /// Whether `request`'s *totals* can ever be satisfied here, ignoring current availability.
    /// A prerequisite for [`Self::has_sufficient`], and the basis for `is_infeasible` (SPEC_FULL
    /// §7): a request no node is feasible for can never succeed no matter how the fleet drains.
    pub fn is_feasible(&self, request: &ResourceRequest) -> bool {
        self.total.ge(request.resources()) && request.label_selector.is_satisfied_by(&self.labels)
    }

    /// Whether `request` can be placed here right now.
    ///
    /// `ignore_object_store` exists because the local node's object-store pressure is handled by
    /// a waiting queue rather than by spillback: for the local node this single dimension never
    /// disqualifies (SPEC_FULL.md §4.2).
    pub fn has_sufficient(&self, request: &ResourceRequest, ignore_object_store: bool) -> bool {
        if !self.available.ge(request.resources()) {
            return false;
        }
        if request.requires_object_store_memory && !ignore_object_store {
            if let Some(state) = &self.object_store {
                if state.at_capacity {
                    return false;
                }
            }
        }
        request.label_selector.is_satisfied_by(&self.labels)
    }

    /// Fraction of `name`'s total currently in use, in `[0, 1]`.
    pub fn utilization(&self, name: ResourceName) -> f64 {
        let total = self.total.get(name);
        let available = self.available.get(name);
        let used = total.checked_sub(available).unwrap_or(Quantity::ZERO);
        total.utilization_of(used)
    }

    /// `true` iff every critical resource (CPU/GPU/memory) is strictly below `threshold`
    /// utilization. Used by the Hybrid/Spread policies to partition nodes (SPEC_FULL §4.5): a
    /// node sitting exactly at the threshold is treated as busy, not below it.
    pub fn below_utilization_threshold(&self, threshold: f64) -> bool {
        critical_resources()
            .into_iter()
            .all(|r| self.utilization(r) < threshold)
    }

    /// Deducts `request` from `available`. Mutates `available` only; `total` is untouched.
    pub fn allocate(&mut self, request: &ResourceRequest) -> Result<(), crate::resource_set::Underflow> {
        self.available.subtract(request.resources())
    }

    /// Returns `request`'s quantities to `available`. Mutates `available` only.
    pub fn release(&mut self, request: &ResourceRequest) {
        self.available.add(request.resources());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_set::cpu;

    fn node(total_cpu: u64, avail_cpu: u64) -> NodeResources {
        let total = ResourceSet::from_pairs([(cpu(), Quantity::from_units(total_cpu))]);
        let available = ResourceSet::from_pairs([(cpu(), Quantity::from_units(avail_cpu))]);
        NodeResources::new(total, available, BTreeMap::new())
    }

    fn req(cpu_units: u64) -> ResourceRequest {
        ResourceRequest::new(ResourceSet::from_pairs([(cpu(), Quantity::from_units(cpu_units))]))
    }

    #[test]
    fn feasible_but_not_sufficient() {
        let n = node(2, 0);
        assert!(n.is_feasible(&req(1)));
        assert!(!n.has_sufficient(&req(1), false));
    }

    #[test]
    fn infeasible_request_never_sufficient() {
        let n = node(1, 1);
        assert!(!n.is_feasible(&req(2)));
        assert!(!n.has_sufficient(&req(2), false));
    }

    #[test]
    fn local_object_store_pressure_is_ignorable() {
        let mut n = node(4, 4);
        n.set_object_store(ObjectStoreState {
            used_bytes: 0,
            at_capacity: true,
        });
        let r = req(1).with_object_store_memory();
        assert!(!n.has_sufficient(&r, false), "remote nodes are gated");
        assert!(n.has_sufficient(&r, true), "local node ignores the gate");
    }

    #[test]
    fn allocate_then_release_round_trips() {
        let mut n = node(4, 4);
        n.allocate(&req(1)).unwrap();
        assert_eq!(n.available().get(cpu()), Quantity::from_units(3));
        n.release(&req(1));
        assert_eq!(n.available().get(cpu()), Quantity::from_units(4));
    }

    #[test]
    fn allocate_rejects_insufficient_without_mutating() {
        let mut n = node(1, 0);
        let before = n.clone();
        assert!(n.allocate(&req(1)).is_err());
        assert_eq!(n, before);
    }

    #[test]
    fn label_selector_gates_feasibility() {
        let mut labels = BTreeMap::new();
        labels.insert("zone".to_string(), "us-east".to_string());
        let n = NodeResources::new(
            ResourceSet::from_pairs([(cpu(), Quantity::from_units(1))]),
            ResourceSet::from_pairs([(cpu(), Quantity::from_units(1))]),
            labels,
        );
        let selector = LabelSelector::new().require("zone", "us-west");
        let r = req(1).with_label_selector(selector);
        assert!(!n.is_feasible(&r));
    }
}
