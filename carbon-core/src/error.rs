//! Error taxonomy shared by every Carbon crate.
//!
//! Mirrors the *kinds* in the design's error table rather than platform
//! errno values: callers match on [`CarbonErrorKind`], not on an OS number.

use std::fmt;

/// One entry per row of the error-kind table. `Ok` is represented by
/// `Result::Ok`, so this enum only ever appears on the `Err` side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarbonErrorKind {
    /// Malformed input or wrong state for the requested operation.
    Invalid,
    /// All workers occupied, or the operation is already running.
    Busy,
    /// Deadline exceeded waiting for a reply or connection.
    TimedOut,
    /// Cancelled via an explicit `stop`/breaker.
    Canceled,
    /// The operation needs a live connection that doesn't exist.
    NotConnected,
    /// Socket or file I/O failure.
    Io,
    /// Allocation failed.
    NoMem,
    /// RID or receiver not found.
    NotFound,
    /// Duplicate registration.
    AlreadyExists,
}

impl CarbonErrorKind {
    /// Wire representation used whenever a reply event encodes its result as
    /// a signed `nparam`: `0` is reserved for success (`Result::Ok`), so
    /// kinds start at `1`.
    #[must_use]
    pub fn wire_code(self) -> i64 {
        match self {
            Self::Invalid => 1,
            Self::Busy => 2,
            Self::TimedOut => 3,
            Self::Canceled => 4,
            Self::NotConnected => 5,
            Self::Io => 6,
            Self::NoMem => 7,
            Self::NotFound => 8,
            Self::AlreadyExists => 9,
        }
    }

    /// Inverse of [`wire_code`](Self::wire_code). Unrecognized codes
    /// (including `0`, which callers should already have handled as
    /// success) fall back to `Invalid` rather than panicking.
    #[must_use]
    pub fn from_wire_code(code: i64) -> Self {
        match code {
            2 => Self::Busy,
            3 => Self::TimedOut,
            4 => Self::Canceled,
            5 => Self::NotConnected,
            6 => Self::Io,
            7 => Self::NoMem,
            8 => Self::NotFound,
            9 => Self::AlreadyExists,
            _ => Self::Invalid,
        }
    }
}

impl fmt::Display for CarbonErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Invalid => "invalid",
            Self::Busy => "busy",
            Self::TimedOut => "timed out",
            Self::Canceled => "canceled",
            Self::NotConnected => "not connected",
            Self::Io => "io error",
            Self::NoMem => "out of memory",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
        };
        f.write_str(s)
    }
}

/// Carbon's common error type. Carries a [`CarbonErrorKind`], a message, and
/// an optional numeric detail (e.g. a raw child exit code) for callers that
/// want to report more than the kind alone.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}: {message}")]
pub struct CarbonError {
    pub kind: CarbonErrorKind,
    pub message: String,
    /// Extra numeric context, when the failure has one (exit codes, errno).
    pub detail: Option<i64>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CarbonError {
    #[must_use]
    pub fn new(kind: CarbonErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), detail: None, source: None }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: i64) -> Self {
        self.detail = Some(detail);
        self
    }

    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::new(CarbonErrorKind::Io, message).with_source(source)
    }

    #[must_use]
    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(CarbonErrorKind::TimedOut, message)
    }

    #[must_use]
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(CarbonErrorKind::Busy, message)
    }
}

pub type CarbonResult<T> = Result<T, CarbonError>;
