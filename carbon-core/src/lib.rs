//! Per-thread event-driven concurrency kernel: clock, sync primitives,
//! events, timers, receivers, the event loop, the loop-thread wrapper, and
//! the synchronous-over-asynchronous reply bridge.
//!
//! Everything socket-facing (the connector, the remote-event service,
//! shell-exec) lives in the `carbon-net`/`carbon-remote`/`carbon-shell`
//! crates built on top of this one; this crate has no knowledge of sockets.

pub mod clock;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod ids;
pub mod loop_thread;
pub mod receiver;
pub mod sync;
pub mod sync_bridge;
pub mod sync_waiter;
pub mod timer;

pub use error::{CarbonError, CarbonErrorKind, CarbonResult};
pub use event::{Event, EventPayload, EventType, Target};
pub use event_loop::EventLoop;
pub use ids::{SessionId, SessionIdGenerator};
pub use loop_thread::LoopThread;
pub use receiver::{Receiver, ReceiverId};
pub use sync_bridge::sync_call;
pub use sync_waiter::{SyncOutcome, SyncWaiter};
pub use timer::{Timer, TimerId, TimerParam};
