//! Remote event sending client: sends one test event to the receiver demo
//! and waits for its reply, then exits with code 333.

use std::sync::Arc;

use carbon::app::Application;
use carbon_core::{Event, EventPayload, EventType, LoopThread, Receiver, Target};
use carbon_remote::{init_remote_event_service, RemoteEvent, RemoteEventServiceConfig};

const RECV_RID: &str = "carbon.example.remote_event.recv";
const SEND_RID: &str = "carbon.example.remote_event.send";

const EV_R_TEST: u32 = 0x8001;
const EV_R_TEST_REPLY: u32 = 0x8002;

struct ReplyReceiver {
    app: Arc<Application>,
}

impl Receiver for ReplyReceiver {
    fn handle(&self, event: &Event) -> bool {
        if event.type_ != EventType(EV_R_TEST_REPLY) {
            return false;
        }
        let payload = match &event.payload {
            EventPayload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            EventPayload::None => String::new(),
        };
        tracing::info!(payload, "[app] remote event reply has been received");
        self.app.stop_application(333);
        true
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let loop_thread = LoopThread::new("remote-event-send-app");
    loop_thread.start().expect("failed to start event loop");
    let event_loop = loop_thread.event_loop();

    let app = Arc::new(Application::start(event_loop.clone())?);
    let reply_receiver_id = event_loop.register_receiver(Arc::new(ReplyReceiver { app: app.clone() }));

    let service = init_remote_event_service(SEND_RID, event_loop.clone(), reply_receiver_id, RemoteEventServiceConfig::default())
        .expect("failed to start remote event service");

    let session_id = std::process::id();
    let ev = RemoteEvent {
        event_type: EV_R_TEST,
        pparam: 0,
        nparam: 0,
        session_id,
        reply_rid: String::new(),
        payload: b"Example payload data.".to_vec(),
    };
    service
        .send_remote_event(ev, RECV_RID, Target::Receiver(reply_receiver_id), Some(session_id))
        .expect("failed to send remote event");

    tracing::info!("Send SIGTERM (or press Ctrl-C) to terminate...");
    while !event_loop.is_done() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    let code = app.exit_code();
    service.stop();
    app.stop();
    loop_thread.stop();
    std::process::exit(code);
}
