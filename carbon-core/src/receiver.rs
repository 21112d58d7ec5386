//! Receivers: logical consumers of events bound to exactly one loop.

use crate::event::{Event, EventType};

/// Opaque handle a loop hands out on [`register_receiver`]; used for both
/// directed delivery (`Target::Receiver`) and for locating the slot to
/// remove on [`unregister_receiver`].
///
/// [`register_receiver`]: crate::event_loop::EventLoop::register_receiver
/// [`unregister_receiver`]: crate::event_loop::EventLoop::unregister_receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(pub(crate) usize);

/// A logical consumer of events. Implementors only need to handle the event
/// types that matter to them; [`handle_default`] intercepts the four system
/// events (`QUIT`/`HUP`/`USR1`/`USR2`) so every receiver gets the same
/// baseline behavior without repeating the match arms.
///
/// [`handle_default`]: Receiver::handle_default
pub trait Receiver: Send + Sync {
    /// Receiver-specific handling for anything `handle_default` didn't
    /// already claim. Returns whether the event was handled.
    fn handle(&self, event: &Event) -> bool;

    /// Handles `QUIT`/`HUP`/`USR1`/`USR2` uniformly; returns `true` if it
    /// claimed the event, in which case `process` should not call `handle`.
    fn handle_default(&self, event: &Event) -> bool {
        matches!(
            event.type_,
            EventType::QUIT | EventType::HUP | EventType::USR1 | EventType::USR2
        )
    }

    /// The entry point the loop calls. Default implementation wires
    /// `handle_default` in front of `handle` so the short-circuit can't be
    /// bypassed by an override.
    fn process(&self, event: &Event) -> bool {
        if self.handle_default(event) {
            return true;
        }
        self.handle(event)
    }
}
