//! The remote-event gateway (§4.6): a listening UNIX-domain socket at
//! `{root}/{rid}` that decodes inbound VEP containers into `RemoteEvent`s and
//! re-injects them into the owning process's main loop, plus an outbound
//! path built on `carbon_net::Connector`.

use std::collections::HashMap;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use carbon_core::{
    sync_call, CarbonError, CarbonResult, Event, EventLoop, EventType, ReceiverId, SessionId,
    SessionIdGenerator, SyncOutcome, SyncWaiter, Target,
};
use carbon_net::{Conn, Connector, Endpoint};

use crate::config::RemoteEventServiceConfig;
use crate::remote_event::RemoteEvent;
use crate::vep::Container;

/// Accept-loop poll interval while idle. The original blocks inside
/// `accept()`; this port uses a nonblocking listener polled at this cadence
/// instead, so `stop()` can interrupt it without a self-pipe plumbed through
/// `UnixListener` (std exposes no cancellable accept).
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(8);
const MAX_INBOUND_CONTAINER: usize = crate::vep::MAX_CONTAINER_LEN;

struct Inner {
    own_rid: String,
    socket_path: PathBuf,
    config: RemoteEventServiceConfig,
    connector: Connector,
    parent_loop: Arc<EventLoop>,
    parent_receiver: ReceiverId,
    ids: SessionIdGenerator,
    /// Routes a reply's `session_id` back to whichever local receiver the
    /// original `send_remote_event` call named, since the wire format (§6.1)
    /// carries no receiver field of its own — only `session_id` survives the
    /// round trip. See DESIGN.md for the rationale.
    pending_replies: Mutex<HashMap<u32, Target>>,
}

/// A process's remote-event gateway: the listener plus the outbound
/// connector. Construct via [`init_remote_event_service`]; a process has at
/// most one of these (the original models it as a singleton, `g_pRemoteEventService`).
pub struct RemoteEventService {
    inner: Arc<Inner>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl RemoteEventService {
    #[must_use]
    pub fn own_rid(&self) -> &str { &self.inner.own_rid }

    #[must_use]
    pub fn socket_path(&self) -> &std::path::Path { &self.inner.socket_path }

    /// Sends `ev` to `{root}/{dst_rid}`. `ev.reply_rid` is overwritten with
    /// this service's own rid regardless of what the caller set, so the
    /// remote side always has a valid return address. Fire-and-forget: never
    /// blocks. If `reply_receiver` is not `Target::Multicast` and `ev`
    /// carries a session id, a matching inbound reply is routed there
    /// instead of to the parent receiver.
    pub fn send_remote_event(
        &self,
        mut ev: RemoteEvent,
        dst_rid: &str,
        reply_receiver: Target,
        session_id: Option<u32>,
    ) -> CarbonResult<()> {
        ev.reply_rid = self.inner.own_rid.clone();
        if let Some(id) = session_id {
            ev.session_id = id;
        }
        if ev.session_id != 0 && !matches!(reply_receiver, Target::Multicast) {
            self.inner.pending_replies.lock().expect("pending replies poisoned").insert(ev.session_id, reply_receiver);
        }

        let container = ev.to_container()?;
        let wire = container.encode()?;
        let dst_socket = self.inner.config.socket_path(dst_rid);
        self.inner.connector.send(
            Endpoint::Unix(dst_socket),
            wire,
            self.inner.parent_loop.clone(),
            Target::Multicast,
            None,
        )
    }

    /// Synchronous variant built on the sync bridge: posts `ev` to `dst_rid`
    /// and blocks for its `…_REPLY` (matched by session id) up to the
    /// connector's sync budget. If the peer never listens, the connector's
    /// own send still completes locally (fire-and-forget succeeds) and this
    /// call times out waiting for a reply that will never arrive, matching
    /// §8 scenario 6.
    pub fn send_remote_event_sync(&self, mut ev: RemoteEvent, dst_rid: &str) -> CarbonResult<Event> {
        let session_id = self.inner.ids.next();
        ev.session_id = session_id.get();
        ev.reply_rid = self.inner.own_rid.clone();

        let waiter = ReplyWaiter { session_id };
        let container = ev.to_container()?;
        let wire = container.encode()?;
        let dst_socket = self.inner.config.socket_path(dst_rid);
        let connector = &self.inner.connector;
        let parent_loop = self.inner.parent_loop.clone();

        sync_call(
            &self.inner.parent_loop,
            waiter,
            move || connector.send(Endpoint::Unix(dst_socket), wire, parent_loop, Target::Multicast, Some(session_id)),
            self.inner.config.connector.sync_budget(),
        )
    }

    /// Stops the accept loop and joins it. The outbound connector's worker
    /// pool is dropped along with this value.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.accept_thread.lock().expect("accept thread handle poisoned").take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_file(&self.inner.socket_path);
    }
}

impl Drop for RemoteEventService {
    fn drop(&mut self) { self.stop(); }
}

struct ReplyWaiter {
    session_id: SessionId,
}

impl SyncWaiter for ReplyWaiter {
    fn session_id(&self) -> SessionId { self.session_id }

    fn process_sync_event(&mut self, reply: Event) -> SyncOutcome { SyncOutcome::Value(Box::new(reply)) }
}

/// Creates the socket root, unlinks a stale socket at `{root}/{own_rid}`,
/// and starts the accept loop plus an outbound connector sized per
/// `config`. `parent` receives every inbound event that doesn't match a
/// pending reply's session id, per §4.6's "addressed process's main loop".
pub fn init_remote_event_service(
    own_rid: impl Into<String>,
    parent_loop: Arc<EventLoop>,
    parent: ReceiverId,
    config: RemoteEventServiceConfig,
) -> CarbonResult<RemoteEventService> {
    let own_rid = own_rid.into();
    let socket_path = config.socket_path(&own_rid);

    tracing::info!(rid = %own_rid, path = %socket_path.display(), "initialising remote event service");
    carbon_net::prepare_unix_socket_path(&socket_path)?;

    let connector = Connector::new(config.connector)?;
    let listener = UnixListener::bind(&socket_path)
        .map_err(|e| CarbonError::io(format!("failed to bind remote event socket {}", socket_path.display()), e))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| CarbonError::io("failed to set remote event listener nonblocking", e))?;

    let inner = Arc::new(Inner {
        own_rid,
        socket_path,
        config,
        connector,
        parent_loop,
        parent_receiver: parent,
        ids: SessionIdGenerator::new(),
        pending_replies: Mutex::new(HashMap::new()),
    });

    let stopped = Arc::new(AtomicBool::new(false));
    let accept_inner = inner.clone();
    let accept_stopped = stopped.clone();
    let accept_thread = thread::Builder::new()
        .name(format!("carbon-remote-accept-{}", accept_inner.own_rid))
        .spawn(move || accept_loop(listener, accept_inner, accept_stopped))
        .map_err(|e| CarbonError::io("failed to spawn remote event accept thread", e))?;

    Ok(RemoteEventService { inner, accept_thread: Mutex::new(Some(accept_thread)), stopped })
}

fn accept_loop(listener: UnixListener, inner: Arc<Inner>, stopped: Arc<AtomicBool>) {
    tracing::info!(rid = %inner.own_rid, "remote event accept loop starting");
    while !stopped.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let inner = inner.clone();
                thread::spawn(move || handle_connection(stream, &inner));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                tracing::error!(rid = %inner.own_rid, error = %e, "remote event accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    tracing::info!(rid = %inner.own_rid, "remote event accept loop stopped");
}

fn handle_connection(stream: UnixStream, inner: &Inner) {
    if let Err(e) = stream.set_read_timeout(Some(CONNECTION_READ_TIMEOUT)) {
        tracing::warn!(error = %e, "failed to set read timeout on inbound remote event connection");
    }
    let mut conn = Conn::Unix(stream);
    let bytes = match carbon_net::endpoint::read_capped(&mut conn, MAX_INBOUND_CONTAINER) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(error = %e, "dropping inbound remote event connection: read failed");
            return;
        }
    };

    let container = match Container::decode(&bytes) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(kind = %e.kind, message = %e.message, "dropping malformed inbound container");
            return;
        }
    };
    let remote_event = match RemoteEvent::from_container(&container) {
        Ok(ev) => ev,
        Err(e) => {
            tracing::warn!(kind = %e.kind, message = %e.message, "dropping unparseable remote event");
            return;
        }
    };

    dispatch_inbound(inner, remote_event);
}

fn dispatch_inbound(inner: &Inner, remote: RemoteEvent) {
    let target = if remote.session_id != 0 {
        let mut pending = inner.pending_replies.lock().expect("pending replies poisoned");
        pending.remove(&remote.session_id)
    } else {
        None
    };
    let target = target.unwrap_or(Target::Receiver(inner.parent_receiver));

    let mut ev = Event::new(EventType(remote.event_type), target)
        .with_pparam(remote.pparam as usize)
        .with_nparam(remote.nparam as i64)
        .with_payload(remote.payload);
    if let Some(sid) = SessionId::from_wire(remote.session_id) {
        ev = ev.with_session(sid);
    }
    inner.parent_loop.send_event(ev);
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_core::Receiver;
    use std::sync::atomic::AtomicUsize;

    struct RecordingReceiver {
        last_event_type: AtomicUsize,
        count: AtomicUsize,
    }

    impl Receiver for RecordingReceiver {
        fn handle(&self, event: &Event) -> bool {
            self.last_event_type.store(event.type_.0 as usize, Ordering::SeqCst);
            self.count.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn test_config(dir: &std::path::Path) -> RemoteEventServiceConfig {
        RemoteEventServiceConfig {
            root_path: dir.to_path_buf(),
            connector: carbon_net::ConnectorConfig {
                pool_size: 2,
                connect_timeout: Duration::from_millis(500),
                send_timeout: Duration::from_millis(500),
                recv_timeout: Duration::from_millis(500),
            },
        }
    }

    #[test]
    fn delivers_an_inbound_event_to_the_parent_receiver() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();

        let recv_loop = Arc::new(EventLoop::new());
        let receiver = Arc::new(RecordingReceiver { last_event_type: AtomicUsize::new(0), count: AtomicUsize::new(0) });
        let receiver_id = recv_loop.register_receiver(receiver.clone());
        let run_handle = {
            let lp = recv_loop.clone();
            thread::spawn(move || lp.run())
        };

        let service =
            init_remote_event_service("carbon.test.recv", recv_loop.clone(), receiver_id, test_config(dir)).unwrap();

        let sender_loop = Arc::new(EventLoop::new());
        let sender = RemoteEventService {
            inner: Arc::new(Inner {
                own_rid: "carbon.test.send".to_string(),
                socket_path: dir.join("carbon.test.send"),
                config: test_config(dir),
                connector: Connector::with_default_config().unwrap(),
                parent_loop: sender_loop,
                parent_receiver: receiver_id,
                ids: SessionIdGenerator::new(),
                pending_replies: Mutex::new(HashMap::new()),
            }),
            accept_thread: Mutex::new(None),
            stopped: Arc::new(AtomicBool::new(true)),
        };

        let ev = RemoteEvent {
            event_type: 0x8001,
            pparam: 0,
            nparam: 0,
            session_id: 0,
            reply_rid: String::new(),
            payload: b"hello".to_vec(),
        };
        sender.send_remote_event(ev, "carbon.test.recv", Target::Multicast, None).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while receiver.count.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(receiver.count.load(Ordering::SeqCst), 1);
        assert_eq!(receiver.last_event_type.load(Ordering::SeqCst), 0x8001);

        service.stop();
        recv_loop.stop();
        run_handle.join().unwrap();
    }
}
