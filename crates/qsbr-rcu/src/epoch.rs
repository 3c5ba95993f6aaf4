//! The global grace-period epoch and the reader-state classifier.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

/// Low bit of [`GlobalEpoch::ctr`]: set whenever the epoch is in its normal
/// online state (always, for this design — there is no offline epoch state,
/// only offline *readers*). Preserved across every bump/flip.
pub(crate) const GP_ONLINE: usize = 1;

/// Amount a 64-bit-word build adds per grace period; the XOR mask a
/// narrower-word build flips per sub-phase. Using the same constant for both
/// keeps the online bit (bit 0) untouched in either case.
pub(crate) const GP_CTR: usize = 2;

/// The process-wide grace-period epoch plus its companion futex word.
pub(crate) struct GlobalEpoch {
    ctr: AtomicUsize,
    futex: AtomicI32,
}

impl GlobalEpoch {
    pub(crate) const fn new() -> Self {
        Self {
            ctr: AtomicUsize::new(GP_ONLINE),
            futex: AtomicI32::new(0),
        }
    }

    pub(crate) fn current(&self, ordering: Ordering) -> usize {
        self.ctr.load(ordering)
    }

    /// 64-bit-word grace-period bump: advance by `GP_CTR`, never touching
    /// the online bit. Returns the new value.
    pub(crate) fn bump(&self, ordering: Ordering) -> usize {
        self.ctr.fetch_add(GP_CTR, ordering) + GP_CTR
    }

    /// Narrower-word sub-phase flip: toggle bit 1 via XOR. Returns the new
    /// value. Called twice per grace period; the two flips cancel, so the
    /// value is back where it started by the end.
    pub(crate) fn flip(&self, ordering: Ordering) -> usize {
        self.ctr.fetch_xor(GP_CTR, ordering) ^ GP_CTR
    }

    pub(crate) fn futex(&self) -> &AtomicI32 {
        &self.futex
    }
}

/// The process-wide grace-period epoch. A `static` for the process lifetime,
/// per the data model's "exists for the process lifetime" lifecycle.
pub(crate) static GLOBAL_EPOCH: GlobalEpoch = GlobalEpoch::new();

/// The three-way classification of a reader relative to one grace-period
/// sub-phase's target epoch value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReaderClass {
    /// `ctr == 0`: offline, irrelevant to any grace period.
    Inactive,
    /// Online and has observed this sub-phase's target value.
    ActiveCurrent,
    /// Online but still at a stale value; must keep waiting.
    ActiveOld,
}

/// Classify a reader's observed `ctr` against `target`, the epoch value this
/// grace-period sub-phase is waiting for readers to reach.
pub(crate) fn classify(reader_ctr: usize, target: usize) -> ReaderClass {
    if reader_ctr == 0 {
        ReaderClass::Inactive
    } else if reader_ctr == target {
        ReaderClass::ActiveCurrent
    } else {
        ReaderClass::ActiveOld
    }
}
