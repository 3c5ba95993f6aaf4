//! The grace-period engine: `synchronize_rcu` itself, writer
//! coalescing, and the wait loop that classifies readers against a target
//! epoch value until every online reader has caught up.

use std::mem;
use std::sync::atomic::Ordering::{Acquire, SeqCst};
use std::sync::Arc;

use crate::config;
use crate::epoch::{classify, ReaderClass, GLOBAL_EPOCH};
use crate::queue::{WaiterNode, WaiterStack};
use crate::reader;
use crate::registry::{ReaderNode, FLAG_STORE_ORDERING, REGISTRY};
use crate::wait::{self, QS_ACTIVE_ATTEMPTS};

static GP_WAITERS: WaiterStack = WaiterStack::new();

/// Block until every reader thread that was online when this call began has
/// passed through at least one quiescent state.
///
/// Concurrent callers coalesce onto a single grace period: only the
/// caller that finds the waiter stack empty actually drives the epoch
/// forward and scans the registry; everyone else parks until that leader
/// signals them.
pub fn synchronize_rcu() {
    // If the caller is itself a registered reader, it must not wait on
    // its own stale epoch value, whether it ends up leading the grace
    // period or just parking on the waiter stack. Mark it offline for the
    // duration and restore it before returning.
    let was_registered = reader::offline_if_registered();

    let node = WaiterNode::new();
    if !GP_WAITERS.push(&node) {
        node.wait();
    } else {
        // Fix the batch this grace period covers right now, before doing
        // any of the actual work. A writer that pushes after this point
        // must not be signaled off the period we're about to run — its
        // own prior stores haven't necessarily been covered by it yet — so
        // it has to land on the stack we just emptied and start a fresh one.
        let batch = GP_WAITERS.drain();

        run_grace_period();

        // SAFETY: every node reachable from the batch, other than `node`
        // itself, is a follower currently blocked in `WaiterNode::wait`,
        // so it is still live.
        unsafe { batch.signal_all_except(&node) };
    }

    if was_registered {
        reader::online_restore();
    }
}

#[cfg(target_pointer_width = "64")]
fn run_grace_period() {
    let target = GLOBAL_EPOCH.bump(SeqCst);
    std::sync::atomic::fence(SeqCst);
    let input_readers = take_registry_snapshot();
    let outcome = scan_until_caught_up(input_readers, target, SweepNewcomers::Yes);
    splice_back(outcome.inactive.into_iter().chain(outcome.active_current));
}

#[cfg(not(target_pointer_width = "64"))]
fn run_grace_period() {
    run_narrow_word_grace_period();
}

/// The two-subphase narrow-word algorithm, kept callable independent of
/// `cfg(target_pointer_width)` so CI running on 64-bit hosts can still
/// exercise it directly.
///
/// Subphase 1 resolves every reader that was already inactive, or that had
/// already observed `target_a`, outright — but an active reader observed at
/// `target_a` might have entered its critical section right at the flip, so
/// it's set aside in `cur_snap_readers` rather than trusted. Subphase 2
/// flips again (restoring the original value) and waits *only* on that
/// carried-over set, never re-scanning the full registry: a thread that
/// registers during subphase 2 is brand new and wasn't part of the window
/// this grace period is covering.
fn run_narrow_word_grace_period() {
    let target_a = GLOBAL_EPOCH.flip(SeqCst);
    std::sync::atomic::fence(SeqCst);
    let input_readers = take_registry_snapshot();
    let phase1 = scan_until_caught_up(input_readers, target_a, SweepNewcomers::Yes);

    let target_b = GLOBAL_EPOCH.flip(SeqCst);
    std::sync::atomic::fence(SeqCst);
    let cur_snap_readers = phase1.active_current;
    let phase2 = scan_until_caught_up(cur_snap_readers, target_b, SweepNewcomers::No);

    splice_back(
        phase1
            .inactive
            .into_iter()
            .chain(phase2.inactive)
            .chain(phase2.active_current),
    );
}

#[cfg(test)]
pub(crate) fn run_narrow_word_grace_period_for_test() {
    run_narrow_word_grace_period();
}

fn take_registry_snapshot() -> Vec<Arc<ReaderNode>> {
    let mut guard = config::lock(&REGISTRY);
    mem::take(&mut *guard)
}

/// Whether a subphase should pull newly-registered threads into its scan.
/// Only the first subphase of a grace period may do this — a later subphase
/// is following up on an already-fixed carried-over set and must not widen
/// it with readers that weren't part of the original snapshot.
#[derive(Clone, Copy, PartialEq, Eq)]
enum SweepNewcomers {
    Yes,
    No,
}

/// Readers resolved by one subphase: those found offline outright, and
/// those found online but already at `target` — the latter only trusted as
/// fully done by the caller if no further subphase needs to confirm them.
struct ScanOutcome {
    inactive: Vec<Arc<ReaderNode>>,
    active_current: Vec<Arc<ReaderNode>>,
}

/// Classify `pending` against `target`, looping until every reader has
/// either gone inactive or observed `target`.
fn scan_until_caught_up(
    mut pending: Vec<Arc<ReaderNode>>,
    target: usize,
    sweep_newcomers: SweepNewcomers,
) -> ScanOutcome {
    let mut inactive = Vec::new();
    let mut active_current = Vec::new();

    loop {
        let batch = mem::take(&mut pending);
        for reader in batch {
            match classify(reader.ctr.load(Acquire), target) {
                ReaderClass::Inactive => inactive.push(reader),
                ReaderClass::ActiveCurrent => active_current.push(reader),
                ReaderClass::ActiveOld => pending.push(reader),
            }
        }

        if sweep_newcomers == SweepNewcomers::Yes {
            // Sweep in anyone who registered while we were scanning: the
            // registry is the only place a brand-new reader can be found,
            // and it's empty right now except for such newcomers.
            let mut guard = config::lock(&REGISTRY);
            pending.append(&mut guard);
        }

        if pending.is_empty() {
            break;
        }

        for reader in &pending {
            reader.waiting.store(true, FLAG_STORE_ORDERING);
        }

        let all_caught_up = || {
            pending
                .iter()
                .all(|r| classify(r.ctr.load(Acquire), target) != ReaderClass::ActiveOld)
        };
        if !wait::spin_until(all_caught_up, QS_ACTIVE_ATTEMPTS) {
            let snapshot = GLOBAL_EPOCH.futex().load(Acquire);
            wait::futex_wait_i32(GLOBAL_EPOCH.futex(), snapshot);
        }
    }

    ScanOutcome {
        inactive,
        active_current,
    }
}

/// Splice resolved readers back into the registry, dropping any that
/// unregistered while held in a private scan list (the `registered` flag,
/// not `Vec` membership, is authoritative).
fn splice_back(readers: impl Iterator<Item = Arc<ReaderNode>>) {
    let mut guard = config::lock(&REGISTRY);
    guard.extend(readers.filter(|r| r.registered.load(Acquire)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn synchronize_with_no_readers_returns_immediately() {
        synchronize_rcu();
    }

    #[test]
    #[serial]
    fn synchronize_passes_an_offline_reader_without_blocking() {
        reader::register_thread();
        reader::thread_offline();
        synchronize_rcu();
        reader::unregister_thread();
    }

    #[test]
    #[serial]
    fn synchronize_passes_a_reader_that_reports_quiescent_state() {
        reader::register_thread();
        reader::quiescent_state();
        synchronize_rcu();
        reader::unregister_thread();
    }

    #[test]
    #[serial]
    fn narrow_word_path_completes_with_no_readers() {
        run_narrow_word_grace_period_for_test();
    }

    #[test]
    #[serial]
    fn narrow_word_path_passes_an_offline_reader() {
        reader::register_thread();
        reader::thread_offline();
        run_narrow_word_grace_period_for_test();
        reader::unregister_thread();
    }
}
