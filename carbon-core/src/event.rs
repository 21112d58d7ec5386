//! Event values ferried through an [`EventLoop`](crate::event_loop::EventLoop).

use std::time::Instant;

use crate::ids::SessionId;
use crate::receiver::ReceiverId;

/// A 32-bit event type tag. Values `< 0x8000` are reserved for the system
/// events every [`Receiver`](crate::receiver::Receiver) handles by default;
/// user event types live at `0x8000` and above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType(pub u32);

impl EventType {
    pub const QUIT: EventType = EventType(1);
    pub const HUP: EventType = EventType(2);
    pub const USR1: EventType = EventType(3);
    pub const USR2: EventType = EventType(4);

    const USER_RANGE_START: u32 = 0x8000;

    /// Constructs a user event type, asserting it falls above the reserved
    /// system range (debug builds only — release builds trust the caller,
    /// matching the cost/benefit of the rest of this crate's assertions).
    #[must_use]
    pub const fn user(n: u32) -> Self {
        debug_assert!(n >= Self::USER_RANGE_START, "user event types must be >= 0x8000");
        EventType(n)
    }

    #[must_use]
    pub const fn is_system(self) -> bool { self.0 < Self::USER_RANGE_START }
}

/// Where an event is headed: one specific receiver, or every receiver
/// registered on the destination loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Receiver(ReceiverId),
    Multicast,
}

/// Opaque payload carried by an event. Only byte payloads cross the
/// local-event boundary (no typed object graphs, per the Non-goals); richer
/// subtypes (remote events, container-carrying events) wrap an `Event`
/// rather than extend this enum, keeping `carbon-core` free of their
/// knowledge.
#[derive(Debug, Clone, Default)]
pub enum EventPayload {
    #[default]
    None,
    Bytes(Vec<u8>),
}

/// A single message dispatched by an [`EventLoop`](crate::event_loop::EventLoop).
///
/// Events are plain owned values in this port — there is no reference
/// counting to model, since Rust's ownership already gives each event
/// exactly one owner at a time (the loop while queued, the receiver's
/// `process` call while dispatched).
#[derive(Debug, Clone)]
pub struct Event {
    pub type_: EventType,
    pub receiver: Target,
    pub pparam: usize,
    pub nparam: i64,
    pub desc: &'static str,
    pub session_id: Option<SessionId>,
    pub created_at: Instant,
    pub payload: EventPayload,
}

impl Event {
    #[must_use]
    pub fn new(type_: EventType, receiver: Target) -> Self {
        Self {
            type_,
            receiver,
            pparam: 0,
            nparam: 0,
            desc: "",
            session_id: None,
            created_at: Instant::now(),
            payload: EventPayload::None,
        }
    }

    #[must_use]
    pub fn to(mut self, receiver: ReceiverId) -> Self {
        self.receiver = Target::Receiver(receiver);
        self
    }

    #[must_use]
    pub fn multicast(mut self) -> Self {
        self.receiver = Target::Multicast;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub fn with_nparam(mut self, nparam: i64) -> Self {
        self.nparam = nparam;
        self
    }

    #[must_use]
    pub fn with_pparam(mut self, pparam: usize) -> Self {
        self.pparam = pparam;
        self
    }

    #[must_use]
    pub fn with_desc(mut self, desc: &'static str) -> Self {
        self.desc = desc;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = EventPayload::Bytes(payload);
        self
    }
}
