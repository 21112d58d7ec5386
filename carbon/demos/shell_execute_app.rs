//! Shell-execute client: runs a command through the `carbon-shell` daemon
//! and prints its exit status and captured stdout.

use carbon_core::{EventPayload, LoopThread};
use carbon_remote::{init_remote_event_service, RemoteEvent, RemoteEventServiceConfig};
use carbon_shell::{EVENT_SHELL_EXECUTE, SHELL_EXECUTE_RID};

const SHELL_EXECUTE_EXAMPLE_RID: &str = "carbon.example.shell_execute";
const PROGRAM: &str = "ls -al /tmp";

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let loop_thread = LoopThread::new("shell-execute-app");
    loop_thread.start().expect("failed to start event loop");
    let event_loop = loop_thread.event_loop();

    let receiver_id = event_loop.register_receiver(std::sync::Arc::new(DiscardReceiver));
    let service = init_remote_event_service(
        SHELL_EXECUTE_EXAMPLE_RID,
        event_loop.clone(),
        receiver_id,
        RemoteEventServiceConfig::default(),
    )
    .expect("failed to start remote event service");

    tracing::info!(program = PROGRAM, "[app] RUNNING external program...");
    let request = RemoteEvent {
        event_type: EVENT_SHELL_EXECUTE,
        pparam: 0,
        nparam: 0,
        session_id: 0,
        reply_rid: String::new(),
        payload: PROGRAM.as_bytes().to_vec(),
    };

    match service.send_remote_event_sync(request, SHELL_EXECUTE_RID) {
        Ok(reply) => {
            let output = match &reply.payload {
                EventPayload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                EventPayload::None => String::new(),
            };
            tracing::info!(retcode = reply.pparam, result = reply.nparam, output, "[app] result");
        }
        Err(e) => tracing::error!(error = %e, "[app] shell-exec request failed"),
    }

    service.stop();
    loop_thread.stop();
    Ok(())
}

struct DiscardReceiver;

impl carbon_core::Receiver for DiscardReceiver {
    fn handle(&self, _event: &carbon_core::Event) -> bool { true }
}
