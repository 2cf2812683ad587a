//! The non-fatal error taxonomy surfaced at the façade boundary, plus the two fatal invariant
//! checks (SPEC_FULL.md §7). `InvariantViolation`s are not a `Result` variant: they panic
//! unconditionally, matching this codebase's `RAY_CHECK`-equivalent convention of aborting on a
//! condition that should be structurally impossible rather than limping on with corrupted state.

use thiserror::Error;

use crate::ids::NodeId;
use crate::resource_set::Underflow;

/// Non-fatal failures from the façade's remote-allocation path. Selection failures are reported
/// through `(Option<NodeId>, is_infeasible)` rather than this type — see SPEC_FULL.md §4.7.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScheduleError {
    #[error(transparent)]
    Underflow(#[from] Underflow),
    #[error("node {0} is not present in the cluster view")]
    UnknownNode(NodeId),
}

/// Aborts the process with a diagnostic. Reserved for the two conditions SPEC_FULL.md §7 calls
/// `InvariantViolation`: a nil local node id, and a remote allocation aimed at the local node.
/// Both indicate a caller bug that corrupted data, not a runtime condition to recover from.
#[track_caller]
pub(crate) fn invariant_violation(message: impl std::fmt::Display) -> ! {
    panic!("scheduler invariant violated: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "scheduler invariant violated")]
    fn invariant_violation_panics_with_context() {
        invariant_violation("remote allocation aimed at local node");
    }
}
