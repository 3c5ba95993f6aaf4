//! Internal error types for the handful of fatal conditions the core can hit.
//!
//! Nothing in this module is part of the public API. These conditions have
//! no recoverable path, so every value here is immediately converted into a
//! panic with a diagnostic message at its single call site.

use thiserror::Error;

/// A futex syscall returned an errno the wait loop does not know how to
/// treat as benign.
#[derive(Debug, Error)]
pub(crate) enum FatalWaitError {
    #[error("futex({op}) failed with unexpected errno {errno}")]
    Futex { op: &'static str, errno: i32 },
}

impl FatalWaitError {
    /// Panic with a diagnostic. These conditions mean the process's futex
    /// primitives can no longer be trusted, so there is no recovery path.
    pub(crate) fn die(self) -> ! {
        panic!("qsbr-rcu: unrecoverable OS primitive failure: {self}");
    }
}
