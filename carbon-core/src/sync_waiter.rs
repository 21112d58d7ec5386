//! The synchronous-over-asynchronous reply bridge.
//!
//! Asynchronous subsystems (the connector, `NetClient`, the remote-event
//! service, shell-exec) deliver completion as a reply event carrying the
//! caller's session id. A caller that simply blocked on a condvar would
//! stall the loop it's attached to; the bridge exists so that loop keeps
//! dispatching everything except the one matching-session event, which is
//! short-circuited straight into the waiter.

use crate::event::Event;
use crate::ids::SessionId;

/// What a blocked `wait_sync` call resolves to.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The waiter's `process_sync_event` ran and produced this value.
    Value(Box<dyn std::any::Any + Send>),
    /// No reply arrived before the deadline.
    TimedOut,
    /// The loop stopped while a reply was still outstanding.
    Gone,
}

impl SyncOutcome {
    /// Downcasts a `Value` outcome to `T`, the type the particular
    /// [`SyncWaiter`] is known (by its caller) to produce.
    pub fn into_value<T: 'static>(self) -> Option<T> {
        match self {
            SyncOutcome::Value(boxed) => boxed.downcast::<T>().ok().map(|b| *b),
            _ => None,
        }
    }
}

/// A per-call object attached to a loop (via
/// [`EventLoop::attach_sync`](crate::event_loop::EventLoop::attach_sync)) to
/// intercept the one reply event matching `session_id()`. Its lifetime is
/// bounded by the attach/detach bracket around a single blocking call; the
/// caller's stack owns it.
pub trait SyncWaiter: Send {
    fn session_id(&self) -> SessionId;

    /// Validates and extracts the result from the reply event. Called
    /// exactly once, from whichever thread is blocked in `wait_sync`.
    fn process_sync_event(&mut self, reply: Event) -> SyncOutcome;
}
