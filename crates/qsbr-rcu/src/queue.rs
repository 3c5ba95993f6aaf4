//! Writer-side coalescing queue: a lock-free Treiber stack of
//! stack-allocated waiter nodes. The first writer to observe an empty stack
//! becomes the leader and runs the grace period on behalf of everyone it
//! later finds linked beneath it; everyone else parks on their own node.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use crate::wait;

const WAITING: u32 = 0;
const DONE: u32 = 1;

/// One caller's place in line. Lives on `synchronize_rcu`'s stack frame for
/// the duration of the call; never heap-allocated, never shared beyond that.
pub(crate) struct WaiterNode {
    state: AtomicU32,
    next: AtomicPtr<WaiterNode>,
}

impl WaiterNode {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU32::new(WAITING),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Block until some leader calls [`signal`](Self::signal) on this node.
    pub(crate) fn wait(&self) {
        let became_done = wait::spin_until(
            || self.state.load(Ordering::Acquire) == DONE,
            wait::QS_ACTIVE_ATTEMPTS,
        );
        if became_done {
            return;
        }
        loop {
            wait::futex_wait_u32(&self.state, WAITING);
            if self.state.load(Ordering::Acquire) == DONE {
                return;
            }
        }
    }

    /// Mark this node done and wake whoever is parked on it.
    fn signal(&self) {
        self.state.store(DONE, Ordering::Release);
        wait::futex_wake_u32(&self.state, 1);
    }
}

/// The global stack of writers coalesced onto the in-flight (or next) grace
/// period.
pub(crate) struct WaiterStack {
    head: AtomicPtr<WaiterNode>,
}

impl WaiterStack {
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Push `node` onto the stack. Returns `true` if `node` landed on an
    /// empty stack, i.e. this caller is the leader responsible for actually
    /// running the grace period.
    pub(crate) fn push(&self, node: &WaiterNode) -> bool {
        let node_ptr = node as *const WaiterNode as *mut WaiterNode;
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            node.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                node_ptr,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return head.is_null(),
                Err(actual) => head = actual,
            }
        }
    }

    /// Atomically detach the whole stack into a [`Batch`]: a fixed snapshot
    /// of every waiter queued at this instant. Anyone who pushes after this
    /// call lands on a fresh empty stack and starts a grace period of their
    /// own rather than riding this batch's.
    pub(crate) fn drain(&self) -> Batch {
        Batch(self.head.swap(ptr::null_mut(), Ordering::AcqRel))
    }
}

/// A snapshot of waiters detached from a [`WaiterStack`] by [`WaiterStack::drain`].
/// The grace period run over this batch covers every waiter in it; the batch
/// must eventually be consumed by [`Batch::signal_all_except`] so each
/// waiter is woken exactly once.
pub(crate) struct Batch(*mut WaiterNode);

impl Batch {
    /// Signal every node in the batch except `leader`, which the caller owns
    /// and will return from directly instead of parking.
    ///
    /// # Safety
    ///
    /// Every non-null pointer reachable from this batch must still be a live
    /// `WaiterNode` — true as long as every follower is blocked in
    /// [`WaiterNode::wait`] and has not yet returned.
    pub(crate) unsafe fn signal_all_except(self, leader: &WaiterNode) {
        let mut cur = self.0;
        while !cur.is_null() {
            // SAFETY: caller's invariant above.
            let node = unsafe { &*cur };
            let next = node.next.load(Ordering::Relaxed);
            if !ptr::eq(node, leader) {
                node.signal();
            }
            cur = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_push_onto_empty_stack_is_leader() {
        let stack = WaiterStack::new();
        let node = WaiterNode::new();
        assert!(stack.push(&node));
    }

    #[test]
    fn second_push_is_not_leader() {
        let stack = WaiterStack::new();
        let a = WaiterNode::new();
        let b = WaiterNode::new();
        assert!(stack.push(&a));
        assert!(!stack.push(&b));
    }

    #[test]
    fn drain_and_signal_except_wakes_followers_but_not_leader() {
        let stack = WaiterStack::new();
        let leader = WaiterNode::new();
        let follower = WaiterNode::new();
        stack.push(&leader);
        stack.push(&follower);

        let batch = stack.drain();
        // SAFETY: both nodes are alive for the duration of this test.
        unsafe { batch.signal_all_except(&leader) };

        assert_eq!(follower.state.load(Ordering::Acquire), DONE);
        assert_eq!(leader.state.load(Ordering::Acquire), WAITING);
    }

    #[test]
    fn drain_leaves_stack_empty() {
        let stack = WaiterStack::new();
        let node = WaiterNode::new();
        stack.push(&node);
        assert!(!stack.head.load(Ordering::Acquire).is_null());
        let _ = stack.drain();
        assert!(stack.head.load(Ordering::Acquire).is_null());
    }

    #[test]
    fn late_push_after_drain_starts_a_fresh_batch() {
        let stack = WaiterStack::new();
        let leader = WaiterNode::new();
        stack.push(&leader);

        let batch = stack.drain();

        // A push arriving after the drain must not be part of `batch`; it
        // sees an empty stack and becomes its own leader.
        let late = WaiterNode::new();
        assert!(stack.push(&late));

        // SAFETY: `leader` is alive for the duration of this test.
        unsafe { batch.signal_all_except(&leader) };
        assert_eq!(leader.state.load(Ordering::Acquire), WAITING);
        assert_eq!(late.state.load(Ordering::Acquire), WAITING);
    }
}
