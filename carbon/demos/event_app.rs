//! Event send/receive: registers a receiver module, sends it a custom event
//! within the same loop, and logs what arrives.

use std::sync::Arc;

use carbon::app::Application;
use carbon_core::{Event, EventType, LoopThread, Receiver, Target};

const EV_TEST: EventType = EventType::user(0x8001);

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

    let loop_thread = LoopThread::new("event-app");
    loop_thread.start().expect("failed to start event loop");
    let event_loop = loop_thread.event_loop();

    let receiver_id = event_loop.register_receiver(Arc::new(ReceiverModule));
    let app = Application::start(event_loop.clone())?;

    tracing::info!("Sending Test event...");
    event_loop.send_event(Event::new(EV_TEST, Target::Receiver(receiver_id)).with_pparam(0x1122).with_nparam(0xEE55));

    tracing::info!("Send SIGTERM (or press Ctrl-C) to terminate...");
    while !event_loop.is_done() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    let code = app.exit_code();
    app.stop();
    loop_thread.stop();
    std::process::exit(code);
}
