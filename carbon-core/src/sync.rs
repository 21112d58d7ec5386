//! Thin wrappers over [`std::sync::Mutex`]/[`std::sync::Condvar`] that
//! centralize lock-poisoning policy for the kernel.
//!
//! A poisoned lock here means some other thread panicked while holding it,
//! which is a logic bug inside this crate, not a recoverable condition for
//! callers — so we `expect` through rather than bubble up a `Result` at
//! every call site. The one place poisoning *is* surfaced to a caller is
//! `LoopThread::start`, which reports it the way the rest of this crate
//! reports other startup failures.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

const POISON_MSG: &str = "carbon-core: internal lock poisoned by a prior panic";

/// Locks `mutex`, panicking with a clear message on poisoning instead of
/// propagating `PoisonError` everywhere.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect(POISON_MSG)
}

/// Waits on `condvar` while `condition(&mut *guard)` holds, up to `timeout`
/// total, handling spurious wakeups internally (a thin poison-safe wrapper
/// over [`Condvar::wait_timeout_while`]). Returns the guard and whether the
/// wait ended because the timeout elapsed rather than the condition going
/// false.
pub fn wait_while_timeout<'a, T, F>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    condition: F,
) -> (MutexGuard<'a, T>, bool)
where
    F: FnMut(&mut T) -> bool,
{
    let (guard, result) =
        condvar.wait_timeout_while(guard, timeout, condition).expect(POISON_MSG);
    (guard, result.timed_out())
}
