//! Worker thread: a plain OS thread posts events into the app's event loop
//! every 2 seconds until the app stops.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use carbon::app::Application;
use carbon_core::{Event, EventType, LoopThread, Receiver, Target};

const EV_TEST: EventType = EventType::user(0x8001);
const EVENT_INTERVAL: Duration = Duration::from_secs(2);

struct ReceiverModule;

impl Receiver for ReceiverModule {
    fn handle(&self, event: &Event) -> bool {
        if event.type_ == EV_TEST {
            tracing::info!(pparam = event.pparam, nparam = event.nparam, "Received Test event");
            true
        } else {
            false
        }
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let loop_thread = LoopThread::new("thread-app");
    loop_thread.start().expect("failed to start event loop");
    let event_loop = loop_thread.event_loop();

    let receiver_id = event_loop.register_receiver(Arc::new(ReceiverModule));
    let app = Application::start(event_loop.clone())?;

    let stopping = Arc::new(AtomicBool::new(false));
    let worker_stopping = stopping.clone();
    let worker_loop = event_loop.clone();
    let worker = thread::Builder::new().name("worker".to_string()).spawn(move || {
        let sequence = AtomicI64::new(0);
        while !worker_stopping.load(Ordering::Acquire) {
            tracing::info!("thread: *** sending Test event ***");
            let n = sequence.fetch_add(1, Ordering::Relaxed);
            worker_loop.send_event(Event::new(EV_TEST, Target::Receiver(receiver_id)).with_pparam(0x1122).with_nparam(n));
            thread::sleep(EVENT_INTERVAL);
        }
    })?;

    tracing::info!("Send SIGTERM (or press Ctrl-C) to terminate...");
    while !event_loop.is_done() {
        std::thread::sleep(Duration::from_millis(100));
    }

    stopping.store(true, Ordering::Release);
    let _ = worker.join();

    let code = app.exit_code();
    app.stop();
    loop_thread.stop();
    std::process::exit(code);
}
