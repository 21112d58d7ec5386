//! Remote event receive server: replies to the first 3 test events it gets,
//! then exits with code 222.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use carbon::app::Application;
use carbon_core::{Event, EventPayload, EventType, LoopThread, Receiver, ReceiverId, Target};
use carbon_remote::{init_remote_event_service, RemoteEvent, RemoteEventService, RemoteEventServiceConfig};

const SEND_RID: &str = "carbon.example.remote_event.send";
const RECV_RID: &str = "carbon.example.remote_event.recv";

const EV_R_TEST: u32 = 0x8001;
const EV_R_TEST_REPLY: u32 = 0x8002;

const MAX_EVENTS: u32 = 3;

struct ReceiverModule {
    app: Arc<Application>,
    service: Mutex<Option<Arc<RemoteEventService>>>,
    event_count: AtomicU32,
}

impl ReceiverModule {
    fn reply_to(&self, ev: &Event) {
        let Some(service) = self.service.lock().expect("service slot poisoned").clone() else {
            tracing::error!("[app] reply requested before remote event service is ready");
            return;
        };
        let session_id = ev.session_id.map_or(0, |s| s.get());
        let reply = RemoteEvent {
            event_type: EV_R_TEST_REPLY,
            pparam: 0,
            nparam: 0,
            session_id,
            reply_rid: String::new(),
            payload: b"Reply payload data.".to_vec(),
        };
        if let Err(e) = service.send_remote_event(reply, SEND_RID, Target::Multicast, None) {
            tracing::error!(error = %e, "[app] failed to send reply event");
        }
    }
}

impl Receiver for ReceiverModule {
    fn handle(&self, event: &Event) -> bool {
        if event.type_ != EventType(EV_R_TEST) {
            return false;
        }

        let payload = match &event.payload {
            EventPayload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            EventPayload::None => String::new(),
        };
        tracing::info!(payload, "[app] remote event has been received");
        self.reply_to(event);

        if self.event_count.fetch_add(1, Ordering::AcqRel) + 1 >= MAX_EVENTS {
            self.app.stop_application(222);
        }
        true
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let loop_thread = LoopThread::new("remote-event-recv-app");
    loop_thread.start().expect("failed to start event loop");
    let event_loop = loop_thread.event_loop();

    let app = Arc::new(Application::start(event_loop.clone())?);
    let receiver = Arc::new(ReceiverModule { app: app.clone(), service: Mutex::new(None), event_count: AtomicU32::new(0) });
    let receiver_id: ReceiverId = event_loop.register_receiver(receiver.clone());

    let service = Arc::new(
        init_remote_event_service(RECV_RID, event_loop.clone(), receiver_id, RemoteEventServiceConfig::default())
            .expect("failed to start remote event service"),
    );
    *receiver.service.lock().expect("service slot poisoned") = Some(service.clone());

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
