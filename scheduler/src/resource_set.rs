//! Exact fixed-point resource arithmetic.
//!
//! Quantities are compared and summed as scaled integers so that repeated addition and
//! subtraction of fractional CPU shares never drifts the way binary floating point would.

use std::collections::BTreeMap;
use std::fmt;

use lasso::{Spur, ThreadedRodeo};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static INTERNER: Lazy<ThreadedRodeo> = Lazy::new(ThreadedRodeo::new);

/// A resource name, interned process-wide so repeated requests for "CPU" or "GPU" cost a pointer
/// comparison rather than a string comparison once scheduling is in the hot path.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ResourceName(Spur);

impl ResourceName {
    pub fn new(name: &str) -> Self {
        Self(INTERNER.get_or_intern(name))
    }

    pub fn as_str(&self) -> &'static str {
        INTERNER.resolve(&self.0)
    }
}

impl PartialOrd for ResourceName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Debug for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ResourceName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ResourceName::new(&s))
    }
}

/// CPU, as almost every scheduling policy treats it specially ("critical" resources).
pub fn cpu() -> ResourceName {
    ResourceName::new("CPU")
}

pub fn gpu() -> ResourceName {
    ResourceName::new("GPU")
}

pub fn memory() -> ResourceName {
    ResourceName::new("memory")
}

/// The resources considered "critical" for hybrid/spread utilization thresholds (SPEC_FULL §4.5).
pub fn critical_resources() -> [ResourceName; 3] {
    [cpu(), gpu(), memory()]
}

/// A non-negative fixed-point scalar, exact to 1/10000th of a unit.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);
    const SCALE: f64 = 10_000.0;

    /// Constructs a quantity from whole units (e.g. `Quantity::from_units(4)` for 4 CPUs).
    pub fn from_units(units: u64) -> Self {
        Quantity(units * 10_000)
    }

    /// Constructs a quantity from a fractional value, e.g. `0.1`. Only used at the boundary
    /// (building a request from a human-supplied number); never used in a comparison.
    pub fn from_f64(value: f64) -> Self {
        assert!(value >= 0.0, "resource quantities are non-negative");
        Quantity((value * Self::SCALE).round() as u64)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Quantity)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Quantity)
    }

    /// Fraction of `self` that `used` represents, clamped to `[0, 1]`. Used for utilization
    /// thresholds; returns `0.0` when `self` is zero (an unconstrained resource is never "busy").
    pub fn utilization_of(self, used: Self) -> f64 {
        if self.0 == 0 {
            0.0
        } else {
            (used.0 as f64 / self.0 as f64).min(1.0)
        }
    }
}

impl fmt::Debug for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("insufficient {resource}: have {available}, need {requested}")]
pub struct Underflow {
    pub resource: ResourceName,
    pub available: Quantity,
    pub requested: Quantity,
}

/// A sparse, ordered mapping from resource name to quantity. Zero-valued entries are never
/// stored, so `is_empty()` is a cheap structural check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    quantities: BTreeMap<ResourceName, Quantity>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (ResourceName, Quantity)>) -> Self {
        let mut set = Self::new();
        for (name, qty) in pairs {
            set.set(name, qty);
        }
        set
    }

    pub fn set(&mut self, name: ResourceName, qty: Quantity) {
        if qty.is_zero() {
            self.quantities.remove(&name);
        } else {
            self.quantities.insert(name, qty);
        }
    }

    pub fn get(&self, name: ResourceName) -> Quantity {
        self.quantities.get(&name).copied().unwrap_or(Quantity::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceName, Quantity)> + '_ {
        self.quantities.iter().map(|(n, q)| (*n, *q))
    }

    /// Componentwise addition. Panics on overflow: a quantity overflowing u64 ten-thousandths
    /// indicates a caller bug (an absurd resource total), not a runtime condition to recover from.
    pub fn add(&mut self, other: &Self) {
        for (name, qty) in other.iter() {
            let sum = self
                .get(name)
                .checked_add(qty)
                .expect("resource quantity overflow");
            self.set(name, sum);
        }
    }

    /// Componentwise subtraction. Either every resource in `other` has sufficient headroom and
    /// the subtraction is applied in full, or none of it is applied and `Err` is returned.
    pub fn subtract(&mut self, other: &Self) -> Result<(), Underflow> {
        for (name, qty) in other.iter() {
            let available = self.get(name);
            if available < qty {
                return Err(Underflow {
                    resource: name,
                    available,
                    requested: qty,
                });
            }
        }
        for (name, qty) in other.iter() {
            let remaining = self
                .get(name)
                .checked_sub(qty)
                .expect("checked above: subtraction cannot underflow");
            self.set(name, remaining);
        }
        Ok(())
    }

    /// `self >= other` componentwise, treating a missing key in either side as zero.
    pub fn ge(&self, other: &Self) -> bool {
        other.iter().all(|(name, qty)| self.get(name) >= qty)
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        other.ge(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, u64)]) -> ResourceSet {
        ResourceSet::from_pairs(
            pairs
                .iter()
                .map(|(n, u)| (ResourceName::new(n), Quantity::from_units(*u))),
        )
    }

    #[test]
    fn zero_entries_are_normalized_away() {
        let mut s = ResourceSet::new();
        s.set(cpu(), Quantity::ZERO);
        assert!(s.is_empty());
    }

    #[test]
    fn add_is_componentwise() {
        let mut a = set(&[("CPU", 2)]);
        let b = set(&[("CPU", 1), ("GPU", 1)]);
        a.add(&b);
        assert_eq!(a.get(cpu()), Quantity::from_units(3));
        assert_eq!(a.get(gpu()), Quantity::from_units(1));
    }

    #[test]
    fn subtract_never_partially_applies_on_underflow() {
        let mut a = set(&[("CPU", 1), ("GPU", 1)]);
        let too_much = set(&[("CPU", 1), ("GPU", 2)]);
        let before = a.clone();
        let err = a.subtract(&too_much).unwrap_err();
        assert_eq!(err.resource, gpu());
        assert_eq!(a, before, "operand must be unchanged on underflow");
    }

    #[test]
    fn subtract_applies_fully_on_success() {
        let mut a = set(&[("CPU", 4)]);
        a.subtract(&set(&[("CPU", 1)])).unwrap();
        assert_eq!(a.get(cpu()), Quantity::from_units(3));
    }

    #[test]
    fn ge_treats_missing_keys_as_zero() {
        let a = set(&[("CPU", 2)]);
        let b = ResourceSet::new();
        assert!(a.ge(&b));
        assert!(!b.ge(&a));
    }

    #[test]
    fn exact_fractional_sums() {
        let mut a = ResourceSet::new();
        for _ in 0..10 {
            let cur = a.get(cpu());
            a.set(cpu(), cur.checked_add(Quantity::from_f64(0.1)).unwrap());
        }
        assert_eq!(a.get(cpu()), Quantity::from_units(1));
    }

    #[test]
    fn resource_names_compare_lexicographically() {
        assert!(ResourceName::new("CPU") < ResourceName::new("GPU"));
    }
}
