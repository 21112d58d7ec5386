//! Binds one [`EventLoop`] to a dedicated OS thread.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{CarbonError, CarbonErrorKind, CarbonResult};
use crate::event_loop::EventLoop;
use crate::sync::lock;

/// Runs one [`EventLoop`] on its own thread, with a bootstrap handshake so
/// [`start`](Self::start) only returns once the thread is actually running
/// (or reports why it couldn't spawn).
pub struct LoopThread {
    name: String,
    event_loop: Arc<EventLoop>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LoopThread {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), event_loop: Arc::new(EventLoop::new()), handle: Mutex::new(None) }
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    #[must_use]
    pub fn event_loop(&self) -> &Arc<EventLoop> { &self.event_loop }

    pub fn is_running(&self) -> bool { lock(&self.handle).is_some() }

    /// Spawns the dedicated thread and blocks until it has acknowledged
    /// startup. Receivers registered before this call are valid once it
    /// returns.
    pub fn start(&self) -> CarbonResult<()> {
        let mut handle_guard = lock(&self.handle);
        if handle_guard.is_some() {
            return Err(CarbonError::new(CarbonErrorKind::AlreadyExists, format!("loop thread '{}' already running", self.name)));
        }

        self.event_loop.reset_for_restart();

        let (ack_tx, ack_rx) = mpsc::sync_channel::<()>(0);
        let event_loop = self.event_loop.clone();
        let name = self.name.clone();
        let thread_name = name.clone();

        let spawned = thread::Builder::new().name(thread_name).spawn(move || {
            let _ = ack_tx.send(());
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| event_loop.run()));
            if result.is_err() {
                tracing::error!(loop_name = %name, "event loop thread panicked");
            }
        });

        match spawned {
            Ok(handle) => {
                let name = &self.name;
                ack_rx.recv().map_err(|_| {
                    CarbonError::new(CarbonErrorKind::Io, format!("loop thread '{name}' died before bootstrap ack"))
                })?;
                *handle_guard = Some(handle);
                tracing::info!(loop_name = %name, "loop thread started");
                Ok(())
            }
            Err(source) => Err(CarbonError::io(format!("failed to spawn loop thread '{}'", self.name), source)),
        }
    }

    /// Stops the loop (waking any attached sync waiter with `Gone`), joins
    /// the thread, and resets internal state so `start` can be called
    /// again.
    pub fn stop(&self) {
        self.event_loop.stop();
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        tracing::info!(loop_name = %self.name, "loop thread stopped");
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_and_restart() {
        let lt = LoopThread::new("test-loop");
        lt.start().unwrap();
        assert!(lt.is_running());
        lt.stop();
        assert!(!lt.is_running());

        // Restartable.
        lt.start().unwrap();
        assert!(lt.is_running());
        lt.stop();
    }

    #[test]
    fn double_start_is_rejected() {
        let lt = LoopThread::new("test-loop-2");
        lt.start().unwrap();
        assert!(lt.start().is_err());
        lt.stop();
    }
}
