//! The reader registry: an allocator-backed handle table of reader
//! threads, keyed by `Arc` identity rather than raw intrusive pointers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;
use std::sync::Arc;

/// One registered reader thread's handle. Addressable from any thread via
/// `Arc`, mutated only by its owning thread (except `registered`, which a
/// grace period's splice-back also reads).
pub(crate) struct ReaderNode {
    /// 0 = offline; non-zero = exact epoch value last observed online.
    pub(crate) ctr: AtomicUsize,
    /// Set by a writer to request a futex wake on this reader's next
    /// quiescent state.
    pub(crate) waiting: AtomicBool,
    /// Authoritative membership flag. Cleared by `unregister_thread`
    /// before the node is necessarily removed from the registry `Vec`.
    pub(crate) registered: AtomicBool,
    /// Diagnostics only.
    pub(crate) id: ThreadId,
}

impl ReaderNode {
    fn new(id: ThreadId) -> Self {
        Self {
            ctr: AtomicUsize::new(0),
            waiting: AtomicBool::new(false),
            registered: AtomicBool::new(true),
            id,
        }
    }
}

/// The reader registry, guarded by the registry lock (may nest inside
/// the grace-period lock, never the reverse).
pub(crate) static REGISTRY: Mutex<Vec<Arc<ReaderNode>>> = Mutex::new(Vec::new());

/// Create, register, and return a fresh reader handle for the calling
/// thread. Panics if a handle already exists (double-register contract
/// violation).
pub(crate) fn register(id: ThreadId) -> Arc<ReaderNode> {
    let node = Arc::new(ReaderNode::new(id));
    let mut guard = crate::config::lock(&REGISTRY);
    guard.push(node.clone());
    drop(guard);
    tracing::debug!(thread = ?id, "registered rcu reader");
    node
}

/// Remove `node` from the registry if it is currently present there.
///
/// It may transiently not be present — a grace period in progress may be
/// holding it in a private scan list (`input_readers`/`cur_snap_readers`)
/// drained out of the registry `Vec`. That's fine: `node.registered` is
/// already false by the time this is called, and the grace period's
/// splice-back filters on that flag rather than assuming `Vec` presence.
pub(crate) fn unregister(node: &Arc<ReaderNode>) {
    let mut guard = crate::config::lock(&REGISTRY);
    if let Some(pos) = guard.iter().position(|n| Arc::ptr_eq(n, node)) {
        guard.swap_remove(pos);
    }
    drop(guard);
    tracing::debug!(thread = ?node.id, "unregistered rcu reader");
}

/// Ordering for plain `store`s of `registered`/`waiting`: these are
/// coordination flags, not data carrying a publication requirement of their
/// own, so `Release` is sufficient (the epoch/ctr fences are what carry the
/// RCU ordering guarantee). `Acquire`/`AcqRel` are illegal on a plain store
/// (only meaningful on a read-modify-write), so this must stay distinct from
/// [`FLAG_SWAP_ORDERING`].
pub(crate) const FLAG_STORE_ORDERING: Ordering = Ordering::Release;

/// Ordering for the read-modify-write `swap` on `waiting` (`reader.rs`'s
/// wake check): needs both the acquire half, to see a writer's prior
/// `store(true, ...)`, and the release half, to publish the flag's clearing.
pub(crate) const FLAG_SWAP_ORDERING: Ordering = Ordering::AcqRel;
