//! Opaque identifiers used throughout the scheduler.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node participating in the cluster.
///
/// Backed by a 128-bit value so that embedders can derive it from whatever identity scheme their
/// transport already uses (a UUID, a hashed address, ...). [`NodeId::nil`] is the distinguished
/// sentinel: it never identifies a real node and is never present in a [`crate::ClusterResourceView`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub const fn from_u128(v: u128) -> Self {
        Self(Uuid::from_u128(v))
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

/// Identifies a placement group. The scheduler core only ever inspects this to detect the
/// placement-group-affinity tag on a [`crate::strategy::SchedulingStrategy`]; resolving the tag
/// into an actual bundle/node mapping is external to this crate (see SPEC_FULL.md §4.5 step 4).
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlacementGroupId(String);

impl PlacementGroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PlacementGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PlacementGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlacementGroupId({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_nil() {
        assert!(NodeId::nil().is_nil());
        assert_eq!(NodeId::nil(), NodeId::default());
    }

    #[test]
    fn ordering_is_total_and_deterministic() {
        let a = NodeId::from_u128(1);
        let b = NodeId::from_u128(2);
        assert!(a < b);
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
    }

    #[test]
    fn distinct_values_round_trip() {
        let id = NodeId::from_u128(42);
        assert_eq!(id.as_u128(), 42);
        assert!(!id.is_nil());
    }
}
