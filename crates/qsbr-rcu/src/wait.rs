//! Adaptive spin-then-futex waiting.
//!
//! `libc::syscall(SYS_futex, ...)` is used directly rather than a
//! condition-variable fallback: this crate targets Linux only.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::error::FatalWaitError;

/// Number of busy-spin attempts before falling back to a futex sleep.
pub(crate) const QS_ACTIVE_ATTEMPTS: u32 = 100;

/// Block until `word` is woken or its value no longer matches `expect`.
///
/// Mirrors `wait_gp()`: a read fence, a check that the value hasn't already
/// changed (in which case there is nothing to wait for), then the syscall
/// itself with `EWOULDBLOCK`/`EINTR` handled as benign races.
pub(crate) fn futex_wait_i32(word: &AtomicI32, expect: i32) {
    std::sync::atomic::fence(Ordering::Acquire);
    if word.load(Ordering::Acquire) != expect {
        return;
    }
    loop {
        // SAFETY: `word` is a valid, live `AtomicI32` for the duration of
        // this call (it is either the static global futex word or a
        // stack-local waiter node kept alive by its owning stack frame).
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                word as *const AtomicI32 as *const i32,
                libc::FUTEX_WAIT,
                expect,
                std::ptr::null::<libc::timespec>(),
            )
        };
        if rc == 0 {
            return;
        }
        match errno() {
            libc::EWOULDBLOCK => return,
            libc::EINTR => continue,
            other => FatalWaitError::Futex {
                op: "FUTEX_WAIT",
                errno: other,
            }
            .die(),
        }
    }
}

/// Same as [`futex_wait_i32`] but for the 32-bit-word waiter-node futex
/// (state words use `AtomicU32`; the futex ABI only cares about the raw
/// 32-bit value, not its signedness).
pub(crate) fn futex_wait_u32(word: &AtomicU32, expect: u32) {
    std::sync::atomic::fence(Ordering::Acquire);
    if word.load(Ordering::Acquire) != expect {
        return;
    }
    loop {
        // SAFETY: see `futex_wait_i32`.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                word as *const AtomicU32 as *const u32,
                libc::FUTEX_WAIT,
                expect,
                std::ptr::null::<libc::timespec>(),
            )
        };
        if rc == 0 {
            return;
        }
        match errno() {
            libc::EWOULDBLOCK => return,
            libc::EINTR => continue,
            other => FatalWaitError::Futex {
                op: "FUTEX_WAIT",
                errno: other,
            }
            .die(),
        }
    }
}

/// Wake up to `n` threads parked on `word`.
pub(crate) fn futex_wake(word: &AtomicI32, n: i32) {
    // SAFETY: see `futex_wait_i32`. FUTEX_WAKE never blocks and its only
    // failure modes are benign (no waiters, or the word changed underfoot).
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicI32 as *const i32,
            libc::FUTEX_WAKE,
            n,
        );
    }
}

/// Wake up to `n` threads parked on a 32-bit-word futex (waiter-node state).
pub(crate) fn futex_wake_u32(word: &AtomicU32, n: i32) {
    // SAFETY: see `futex_wake`.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE,
            n,
        );
    }
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Bounded busy-spin with a CPU-relax hint between attempts.
///
/// Returns `true` if `done()` became true within the spin budget, `false`
/// if the caller should fall back to a futex sleep.
pub(crate) fn spin_until(mut done: impl FnMut() -> bool, attempts: u32) -> bool {
    for _ in 0..attempts {
        if done() {
            return true;
        }
        std::hint::spin_loop();
    }
    done()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_until_returns_true_when_predicate_becomes_true() {
        let mut count = 0;
        let result = spin_until(
            || {
                count += 1;
                count >= 3
            },
            QS_ACTIVE_ATTEMPTS,
        );
        assert!(result);
    }

    #[test]
    fn spin_until_returns_false_when_predicate_never_true() {
        let result = spin_until(|| false, 5);
        assert!(!result);
    }

    #[test]
    fn futex_wait_returns_immediately_when_value_already_changed() {
        let word = AtomicI32::new(0);
        // expect == -1 but word is 0: should return without syscalling.
        futex_wait_i32(&word, -1);
    }

    #[test]
    fn futex_wake_on_unparked_word_is_harmless() {
        let word = AtomicI32::new(0);
        futex_wake(&word, 1);
    }
}
