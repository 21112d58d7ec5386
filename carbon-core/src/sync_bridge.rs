//! Ergonomic entry point for the sync bridge: attach, post, wait, detach.

use std::time::Duration;

use crate::error::{CarbonError, CarbonErrorKind, CarbonResult};
use crate::event_loop::EventLoop;
use crate::sync_waiter::{SyncOutcome, SyncWaiter};

struct DetachGuard<'a> {
    event_loop: &'a EventLoop,
}

impl Drop for DetachGuard<'_> {
    fn drop(&mut self) { self.event_loop.detach_sync(); }
}

/// Attaches `waiter` to `event_loop`, runs `post` (expected to dispatch the
/// async request somewhere that will eventually reply with `waiter`'s
/// session id), then blocks for up to `timeout` for the reply.
///
/// `waiter` is detached on every exit path — success, timeout, an error
/// returned from `post`, or a panic unwinding through this frame — via an
/// RAII guard, so a caller can never leave a stale waiter attached to a
/// loop that outlives this call.
pub fn sync_call<R, W, F>(
    event_loop: &EventLoop,
    waiter: W,
    post: F,
    timeout: Duration,
) -> CarbonResult<R>
where
    R: 'static,
    W: SyncWaiter + 'static,
    F: FnOnce() -> CarbonResult<()>,
{
    let session_id = waiter.session_id();
    event_loop.attach_sync(Box::new(waiter));
    let _guard = DetachGuard { event_loop };

    post()?;

    match event_loop.wait_sync(timeout) {
        SyncOutcome::Value(value) => value.downcast::<R>().map(|b| *b).map_err(|_| {
            CarbonError::new(CarbonErrorKind::Invalid, "sync reply had an unexpected type")
        }),
        SyncOutcome::TimedOut => Err(CarbonError::timed_out(format!(
            "sync call (session {}) timed out after {timeout:?}",
            session_id.get()
        ))),
        SyncOutcome::Gone => {
            Err(CarbonError::new(CarbonErrorKind::Canceled, "event loop stopped while awaiting reply"))
        }
    }
}
