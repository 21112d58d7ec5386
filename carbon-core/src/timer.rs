//! Timers: scheduled callbacks owned by a loop.

use std::time::{Duration, Instant};

/// Opaque parameter passed to a timer's callback. Kept as a plain `usize`
/// (matching `Event::pparam`) rather than a generic type, so a loop's timer
/// queue can stay a single concrete collection instead of requiring
/// type-erased boxing per distinct `T`.
pub type TimerParam = usize;

/// Handle returned by [`insert_timer`](crate::event_loop::EventLoop::insert_timer)
/// used to `restart`/`pause`/`delete` the timer later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

/// A scheduled callback. Non-periodic timers are removed after firing once;
/// periodic timers are reinserted with `deadline = now + period`.
pub struct Timer {
    pub(crate) deadline: Instant,
    pub period: Option<Duration>,
    pub callback: Box<dyn FnMut(TimerParam) + Send>,
    pub param: TimerParam,
    pub name: &'static str,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("deadline", &self.deadline)
            .field("period", &self.period)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Timer {
    /// A one-shot timer firing after `delay`.
    #[must_use]
    pub fn once(
        name: &'static str,
        delay: Duration,
        param: TimerParam,
        callback: impl FnMut(TimerParam) + Send + 'static,
    ) -> Self {
        Self {
            deadline: crate::clock::after(delay),
            period: None,
            callback: Box::new(callback),
            param,
            name,
        }
    }

    /// A periodic timer first firing after `period`, then every `period`
    /// thereafter.
    #[must_use]
    pub fn periodic(
        name: &'static str,
        period: Duration,
        param: TimerParam,
        callback: impl FnMut(TimerParam) + Send + 'static,
    ) -> Self {
        Self {
            deadline: crate::clock::after(period),
            period: Some(period),
            callback: Box::new(callback),
            param,
            name,
        }
    }

    /// A watchdog: a named, non-periodic timer — sugar over [`Timer::once`]
    /// for the common "fire if nobody pets me" use case.
    #[must_use]
    pub fn watchdog(
        name: &'static str,
        timeout: Duration,
        on_fire: impl FnMut(TimerParam) + Send + 'static,
    ) -> Self {
        Self::once(name, timeout, 0, on_fire)
    }

    #[must_use]
    pub fn is_periodic(&self) -> bool { self.period.is_some() }
}
