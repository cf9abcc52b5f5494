//! Invariant checks that run in debug builds.
//!
//! Release builds skip them unless the `check-invariants` feature is on.
//! Code paths that must always check call
//! [`DebugInvariants::validate_invariants`] and propagate the error instead.

use crate::loop_error::LoopError;

/// Structures with checkable invariants.
pub trait DebugInvariants {
    /// Panic on a violated invariant when checking is enabled.
    fn debug_assert_invariants(&self);
    /// Return the first violated invariant.
    fn validate_invariants(&self) -> Result<(), LoopError>;
}

/// Run a fallible check and panic with `$ctx` on error when checking is
/// enabled; expands to nothing otherwise.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
