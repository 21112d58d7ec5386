//! Process-wide unique session ids.
//!
//! Ported from the source's `getUniqueId()`: an atomic counter that skips
//! the value that would wrap to zero, since zero is reserved to mean "no
//! reply expected" everywhere a session id is threaded through the system.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

/// A non-zero 32-bit session id. `None` (not `SessionId(0)`) is how "no
/// session" is represented at the type level; `0` still appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(NonZeroU32);

impl SessionId {
    #[must_use]
    pub fn get(self) -> u32 { self.0.get() }

    /// Reconstructs a `SessionId` from a wire value, returning `None` for
    /// the reserved `0`.
    #[must_use]
    pub fn from_wire(value: u32) -> Option<Self> { NonZeroU32::new(value).map(Self) }

    #[must_use]
    pub fn to_wire(opt: Option<Self>) -> u32 { opt.map_or(0, SessionId::get) }
}

/// Monotonically increasing, process-wide, never-zero session id generator.
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    counter: AtomicU32,
}

impl SessionIdGenerator {
    #[must_use]
    pub const fn new() -> Self { Self { counter: AtomicU32::new(0) } }

    /// Returns the next unique id, thread-safe, skipping zero on wraparound.
    pub fn next(&self) -> SessionId {
        loop {
            let id = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if let Some(id) = NonZeroU32::new(id) {
                return SessionId(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_nonzero() {
        let gen = SessionIdGenerator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            let id = gen.next();
            assert_ne!(id.get(), 0);
            assert!(seen.insert(id.get()), "session id repeated: {}", id.get());
        }
    }

    #[test]
    fn wire_roundtrip_preserves_none() {
        assert_eq!(SessionId::from_wire(0), None);
        assert_eq!(SessionId::to_wire(None), 0);
        let id = SessionIdGenerator::new().next();
        assert_eq!(SessionId::from_wire(SessionId::to_wire(Some(id))), Some(id));
    }
}
