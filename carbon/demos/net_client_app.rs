//! Network client: holds one persistent connection open across three
//! send-then-recv verbs against a small local echo server, then exits.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use carbon::app::Application;
use carbon_core::{Event, EventPayload, LoopThread, Receiver, Target};
use carbon_net::{Endpoint, NetClient, EVENT_NET_CLIENT_DONE};

const MAX_VERBS: u32 = 3;

struct ReplyReceiver {
    app: Arc<Application>,
    count: AtomicU32,
}

impl Receiver for ReplyReceiver {
    fn handle(&self, event: &Event) -> bool {
        if event.type_ != EVENT_NET_CLIENT_DONE {
            return false;
        }

        let payload = match &event.payload {
            EventPayload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            EventPayload::None => String::new(),
        };
        tracing::info!(result = event.nparam, payload, "[app] net client verb completed");

        if self.count.fetch_add(1, Ordering::AcqRel) + 1 >= MAX_VERBS {
            self.app.stop_application(0);
        }
        true
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = thread::Builder::new().name("echo-server".to_string()).spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut buf = [0u8; 256];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    })?;

    let loop_thread = LoopThread::new("net-client-app");
    loop_thread.start().expect("failed to start event loop");
    let event_loop = loop_thread.event_loop();

    let app = Arc::new(Application::start(event_loop.clone())?);
    let receiver_id =
        event_loop.register_receiver(Arc::new(ReplyReceiver { app: app.clone(), count: AtomicU32::new(0) }));

    let client = NetClient::new("net-client-app-client", Endpoint::Tcp(addr), Default::default())
        .expect("failed to start net client");

    for i in 0..MAX_VERBS {
        let payload = format!("verb {i}").into_bytes();
        client.io(payload, event_loop.clone(), Target::Receiver(receiver_id), None);
    }

    tracing::info!("Send SIGTERM (or press Ctrl-C) to terminate...");
    while !event_loop.is_done() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    let code = app.exit_code();
    client.stop();
    app.stop();
    loop_thread.stop();
    drop(server);
    std::process::exit(code);
}
