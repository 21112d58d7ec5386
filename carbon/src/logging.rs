//! Optional rolling-file log sink, for the one demo (`minimal_app`) that
//! shows it; every other demo just calls `tracing_subscriber::fmt::init()`
//! directly, matching how little ceremony the original's `logger_init`
//! needs for a console-only run.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

/// Installs a daily-rolling file appender under `dir` alongside the default
/// stdout subscriber. The returned guard must be kept alive for the
/// duration of the process — dropping it flushes and stops the background
/// writer thread.
#[must_use]
pub fn init_file_logging(dir: impl AsRef<std::path::Path>, file_prefix: &str) -> WorkerGuard {
    let appender = rolling::daily(dir, file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt().with_writer(writer).with_ansi(false).init();
    guard
}
