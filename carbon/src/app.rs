//! Process lifecycle glue: the `SIGINT`/`SIGTERM`/`SIGHUP`/`SIGUSR1`/`SIGUSR2`
//! signal watcher, exit-code bookkeeping, and the `appSendEvent`-style free
//! functions the original exposes off a process-wide singleton.
//!
//! Grounded on `signal_server.{h,cpp}` and `embed/application.h` /
//! `unix/application.h`: the original installs `sigaction` handlers directly
//! and polls a bitmask on a dedicated thread. `signal-hook`'s `Signals`
//! iterator is the safe, idiomatic replacement — it still runs on its own
//! thread, it just owns the self-pipe instead of a hand-rolled one.

use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;

use carbon_core::{Event, EventLoop, EventType, Receiver, ReceiverId, Target};

/// Installs `std::panic::set_hook` so a panic on any thread logs a captured
/// backtrace at `error!` before the default hook runs. The unix original
/// handles `SIGSEGV`/`SIGBUS`/`SIGILL` by dumping a backtrace and exiting;
/// catching those signals from a handler is unsound once memory is already
/// corrupted, so this only covers what a Rust process can safely observe —
/// a panic. Call once, near the start of `main`.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!(%info, "panic\n{backtrace}");
    }));
}

/// Receiver that claims the four system events for [`Application`]: `QUIT`
/// sets the exit code and stops the loop, the rest are logged. Overrides
/// `handle_default` directly (rather than `handle`) since the base
/// `Receiver::handle_default` only swallows these events without acting on
/// them.
struct AppReceiver {
    exit_state: Arc<ExitState>,
}

impl Receiver for AppReceiver {
    fn handle(&self, _event: &Event) -> bool { false }

    fn handle_default(&self, event: &Event) -> bool {
        match event.type_ {
            EventType::QUIT => {
                self.exit_state.set_exit_code(event.nparam as i32);
                self.exit_state.event_loop.stop();
                true
            }
            EventType::HUP => {
                tracing::debug!("signal_server: SIGHUP detected");
                true
            }
            EventType::USR1 => {
                tracing::debug!("signal_server: SIGUSR1 detected");
                true
            }
            EventType::USR2 => {
                tracing::debug!("signal_server: SIGUSR2 detected");
                true
            }
            _ => false,
        }
    }
}

/// The piece of [`Application`]'s state [`AppReceiver`] needs — split out so
/// the receiver can be built and registered before the `ReceiverId` it will
/// live at is known, rather than the other way around.
struct ExitState {
    event_loop: Arc<EventLoop>,
    exit_code: AtomicI32,
}

impl ExitState {
    /// First non-zero code wins — matches `setExitCode` in
    /// `embed/application.h`, not the "last wins" prose elsewhere; see
    /// DESIGN.md.
    fn set_exit_code(&self, code: i32) {
        let _ = self.exit_code.compare_exchange(0, code, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Binds a running [`EventLoop`] to the process's signal handling and
/// exit-code bookkeeping. One per process, analogous to the original's
/// `g_pApp` singleton, but held by the caller rather than stashed in a
/// global.
pub struct Application {
    exit_state: Arc<ExitState>,
    receiver_id: ReceiverId,
    stopped: Arc<AtomicBool>,
    signal_thread: Mutex<Option<JoinHandle<()>>>,
    signals_handle: signal_hook::iterator::Handle,
}

impl Application {
    /// Registers the receiver that claims `QUIT`/`HUP`/`USR1`/`USR2` on
    /// `event_loop` and starts the signal watcher thread. `event_loop`
    /// should already be running (e.g. via `LoopThread::start`).
    pub fn start(event_loop: Arc<EventLoop>) -> std::io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1, SIGUSR2])?;
        let signals_handle = signals.handle();

        let exit_state = Arc::new(ExitState { event_loop: event_loop.clone(), exit_code: AtomicI32::new(0) });
        let receiver = Arc::new(AppReceiver { exit_state: exit_state.clone() });
        let receiver_id = event_loop.register_receiver(receiver);

        let stopped = Arc::new(AtomicBool::new(false));
        let thread_stopped = stopped.clone();
        let thread_loop = event_loop;
        let signal_thread = thread::Builder::new()
            .name("carbon-signal-server".to_string())
            .spawn(move || {
                tracing::info!("signal server starting");
                for signal in &mut signals {
                    if thread_stopped.load(Ordering::Acquire) {
                        break;
                    }
                    let event_type = match signal {
                        SIGHUP => EventType::HUP,
                        SIGUSR1 => EventType::USR1,
                        SIGUSR2 => EventType::USR2,
                        SIGINT | SIGTERM => EventType::QUIT,
                        _ => continue,
                    };
                    thread_loop.send_event(Event::new(event_type, Target::Multicast));
                    if thread_stopped.load(Ordering::Acquire) {
                        break;
                    }
                }
                tracing::info!("signal server stopped");
            })?;

        Ok(Self { exit_state, receiver_id, stopped, signal_thread: Mutex::new(Some(signal_thread)), signals_handle })
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 { self.exit_state.exit_code.load(Ordering::Acquire) }

    #[must_use]
    pub fn receiver_id(&self) -> ReceiverId { self.receiver_id }

    /// Sets the exit code directly, first-non-zero-wins, without going
    /// through the event loop. Equivalent to posting `EventType::QUIT` to
    /// this application's own receiver, minus the round trip.
    pub fn stop_application(&self, code: i32) {
        self.exit_state.set_exit_code(code);
        self.exit_state.event_loop.stop();
    }

    /// Stops the watcher thread: `Handle::close` unblocks the `Signals`
    /// iterator (mirroring `CSignalServer::stop`'s `pthread_kill(..,
    /// SIGQUIT)`, which exists for the same reason — the original's poll
    /// loop sleeps, this one blocks in the iterator, both need a nudge to
    /// notice `stopped`).
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.signals_handle.close();
        if let Some(handle) = self.signal_thread.lock().expect("signal thread handle poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Application {
    fn drop(&mut self) { self.stop(); }
}
