//! Monotonic time and deadline arithmetic.
//!
//! Everything in the kernel schedules against [`std::time::Instant`]; there
//! is no wall-clock concept here on purpose, since timer ordering only ever
//! needs to compare deadlines to each other and to `now()`.

use std::time::{Duration, Instant};

/// `now() + 60s` caps how long a loop iteration will sleep with no timer
/// pending, per the main-loop algorithm.
pub const MAX_IDLE_SLEEP: Duration = Duration::from_secs(60);

#[must_use]
pub fn now() -> Instant { Instant::now() }

/// A point in time far enough out that a timer reinserted with this deadline
/// is effectively disabled without being deleted (used by `pause_timer`).
#[must_use]
pub fn forever() -> Instant {
    now() + Duration::from_secs(365 * 24 * 60 * 60)
}

/// Saturating deadline helper: `deadline - now`, clamped to zero instead of
/// panicking when `deadline` has already passed.
#[must_use]
pub fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(now())
}

#[must_use]
pub fn after(duration: Duration) -> Instant { now() + duration }
