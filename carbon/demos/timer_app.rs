//! Periodic timer app: fires a test event every 2 seconds.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use carbon::app::Application;
use carbon_core::{Event, EventType, LoopThread, Receiver, Target, Timer};

const EV_TEST: EventType = EventType::user(0x8001);
const TIMER_INTERVAL: Duration = Duration::from_secs(2);

struct ReceiverModule;

impl Receiver for ReceiverModule {
    fn handle(&self, event: &Event) -> bool {
        if event.type_ == EV_TEST {
            tracing::info!(pparam = event.pparam, nparam = event.nparam, "Test event received");
            true
        } else {
            false
        }
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let loop_thread = LoopThread::new("timer-app");
    loop_thread.start().expect("failed to start event loop");
    let event_loop = loop_thread.event_loop();

    let receiver_id = event_loop.register_receiver(Arc::new(ReceiverModule));
    let app = Application::start(event_loop.clone())?;

    let sequence = Arc::new(AtomicI64::new(0));
    let timer_loop = event_loop.clone();
    event_loop.insert_timer(Timer::periodic("test-timer", TIMER_INTERVAL, 0, move |_| {
        tracing::info!("Sending Test event...");
        let n = sequence.fetch_add(1, Ordering::Relaxed);
        timer_loop.send_event(Event::new(EV_TEST, Target::Receiver(receiver_id)).with_pparam(0x1122).with_nparam(n));
    }));

    tracing::info!("Send SIGTERM (or press Ctrl-C) to terminate...");
    while !event_loop.is_done() {
        std::thread::sleep(Duration::from_millis(100));
    }

    let code = app.exit_code();
    app.stop();
    loop_thread.stop();
    std::process::exit(code);
}
