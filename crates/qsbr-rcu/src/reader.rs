//! The reader fast path and registration.

use std::cell::RefCell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::epoch::GLOBAL_EPOCH;
use crate::registry::{self, ReaderNode, FLAG_STORE_ORDERING, FLAG_SWAP_ORDERING};
use crate::wait;

thread_local! {
    /// The calling thread's own handle, if registered. Presence here mirrors
    /// `ReaderNode::registered`, which is the authoritative flag; this
    /// cell just avoids a registry scan on every fast-path call.
    static SELF: RefCell<Option<Arc<ReaderNode>>> = const { RefCell::new(None) };
}

fn with_self<R>(f: impl FnOnce(&Arc<ReaderNode>) -> R) -> R {
    SELF.with(|cell| {
        let borrow = cell.borrow();
        let node = borrow
            .as_ref()
            .expect("qsbr-rcu: operation requires a registered thread (call register_thread() first)");
        f(node)
    })
}

/// Register the calling thread as an RCU reader.
///
/// # Panics
///
/// Panics if the calling thread is already registered.
pub fn register_thread() {
    SELF.with(|cell| {
        assert!(
            cell.borrow().is_none(),
            "qsbr-rcu: register_thread() called twice on the same thread"
        );
        let node = registry::register(std::thread::current().id());
        *cell.borrow_mut() = Some(node);
    });
    thread_online();
}

/// Unregister the calling thread from RCU.
///
/// # Panics
///
/// Panics if the calling thread is not currently registered.
pub fn unregister_thread() {
    // Go offline first so a concurrent synchronize_rcu cannot deadlock
    // waiting on a thread that is mid-teardown.
    thread_offline();
    SELF.with(|cell| {
        let node = cell
            .borrow_mut()
            .take()
            .expect("qsbr-rcu: unregister_thread() called on an unregistered thread");
        node.registered.store(false, FLAG_STORE_ORDERING);
        registry::unregister(&node);
    });
}

/// Enter an RCU read-side critical section. No-op in QSBR; see module docs.
#[inline(always)]
pub fn read_lock() {}

/// Exit an RCU read-side critical section. No-op in QSBR; see module docs.
#[inline(always)]
pub fn read_unlock() {}

/// Announce a quiescent state: the calling thread holds no RCU-protected
/// references at this instant.
///
/// # Panics
///
/// Panics if the calling thread is not registered.
pub fn quiescent_state() {
    with_self(|node| {
        let ge = GLOBAL_EPOCH.current(Ordering::Acquire);
        node.ctr.store(ge, Ordering::Release);
        wake_if_waited_on(node);
    });
}

/// Mark the calling thread quiescent until [`thread_online`] is called.
///
/// # Panics
///
/// Panics if the calling thread is not registered.
pub fn thread_offline() {
    with_self(|node| {
        node.ctr.store(0, Ordering::Release);
        wake_if_waited_on(node);
    });
}

/// Resume RCU-protected reads on the calling thread.
///
/// # Panics
///
/// Panics if the calling thread is not registered.
pub fn thread_online() {
    with_self(|node| {
        let ge = GLOBAL_EPOCH.current(Ordering::Acquire);
        node.ctr.store(ge, Ordering::SeqCst);
        std::sync::atomic::fence(Ordering::SeqCst);
    });
}

/// Whether the calling thread is currently online.
///
/// # Panics
///
/// Panics if the calling thread is not registered.
pub fn read_ongoing() -> bool {
    with_self(|node| node.ctr.load(Ordering::Acquire) != 0)
}

/// If the calling thread is registered, mark it offline and report that.
/// `synchronize_rcu` uses this so a registered thread calling it directly
/// never waits on its own stale epoch value.
pub(crate) fn offline_if_registered() -> bool {
    SELF.with(|cell| {
        let borrow = cell.borrow();
        match borrow.as_ref() {
            Some(node) => {
                node.ctr.store(0, Ordering::Release);
                wake_if_waited_on(node);
                true
            }
            None => false,
        }
    })
}

/// Undo [`offline_if_registered`]: restore the calling thread to online.
pub(crate) fn online_restore() {
    thread_online();
}

fn wake_if_waited_on(node: &ReaderNode) {
    if node.waiting.swap(false, FLAG_SWAP_ORDERING) {
        wait::futex_wake(GLOBAL_EPOCH.futex(), 1);
    }
}

#[cfg(test)]
pub(crate) fn is_registered() -> bool {
    SELF.with(|cell| cell.borrow().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn register_then_online_then_unregister() {
        register_thread();
        assert!(read_ongoing());
        thread_offline();
        assert!(!read_ongoing());
        thread_online();
        assert!(read_ongoing());
        unregister_thread();
        assert!(!is_registered());
    }

    #[test]
    #[serial]
    #[should_panic(expected = "called twice")]
    fn double_register_panics() {
        register_thread();
        let result = std::panic::catch_unwind(|| register_thread());
        unregister_thread();
        result.unwrap();
    }

    #[test]
    #[serial]
    #[should_panic(expected = "unregistered thread")]
    fn unregister_without_register_panics() {
        unregister_thread();
    }

    #[test]
    #[serial]
    fn read_lock_unlock_are_noops() {
        register_thread();
        read_lock();
        read_unlock();
        unregister_thread();
    }
}
