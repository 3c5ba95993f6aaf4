//! Process-wide tunables.
//!
//! A runtime-toggleable try-lock-poll policy for this crate's two global
//! mutexes (the registry lock and, transitively, the grace-period wait
//! loop). `parking_lot::Mutex` already handles `EINTR`/`EBUSY` internally,
//! so this buys no extra correctness on its own, but a pollable, bounded
//! lock acquisition is still useful when this crate is embedded in a
//! process with aggressive signal handlers elsewhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static DISTRUST_SIGNALS: AtomicBool = AtomicBool::new(false);

/// Poll interval used by the try-lock loop when distrust-signals mode is on.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Switch both process-wide mutexes to a try-lock loop that polls every
/// 10 ms instead of blocking indefinitely.
///
/// Safe to call at any time; takes effect on the next lock acquisition.
pub fn enable_distrust_signals_mode() {
    DISTRUST_SIGNALS.store(true, Ordering::Release);
}

/// Restore the default blocking lock-acquisition policy.
pub fn disable_distrust_signals_mode() {
    DISTRUST_SIGNALS.store(false, Ordering::Release);
}

/// Whether distrust-signals mode is currently enabled.
pub(crate) fn distrust_signals_enabled() -> bool {
    DISTRUST_SIGNALS.load(Ordering::Acquire)
}

/// Acquire `mutex`, honoring the current lock-acquisition policy.
pub(crate) fn lock<'a, T>(mutex: &'a parking_lot::Mutex<T>) -> parking_lot::MutexGuard<'a, T> {
    if !distrust_signals_enabled() {
        return mutex.lock();
    }
    loop {
        if let Some(guard) = mutex.try_lock() {
            return guard;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distrust_signals_mode_round_trips() {
        assert!(!distrust_signals_enabled());
        enable_distrust_signals_mode();
        assert!(distrust_signals_enabled());
        disable_distrust_signals_mode();
        assert!(!distrust_signals_enabled());
    }

    #[test]
    fn lock_works_under_both_policies() {
        let m = parking_lot::Mutex::new(0);
        {
            let mut g = lock(&m);
            *g += 1;
        }
        enable_distrust_signals_mode();
        {
            let mut g = lock(&m);
            *g += 1;
        }
        disable_distrust_signals_mode();
        assert_eq!(*m.lock(), 2);
    }
}
