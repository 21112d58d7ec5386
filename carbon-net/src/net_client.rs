//! Persistent single-connection client: unlike [`Connector`](crate::connector::Connector),
//! which opens and closes a connection per request, a `NetClient` holds one
//! connection open across a FIFO queue of verbs (send, or send-then-recv),
//! reconnecting on demand when idle or after a failure.

use std::collections::VecDeque;
use std::io::Write as _;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use carbon_core::{
    CarbonError, CarbonErrorKind, CarbonResult, Event, EventLoop, EventType, LoopThread, Receiver,
    SessionId, Target,
};

use crate::connector::ConnectorConfig;
use crate::endpoint::{connect, read_capped, Conn, Endpoint};

pub const EVENT_NET_CLIENT_DONE: EventType = EventType(0x1003);
const EVENT_DRAIN: EventType = EventType(0x1004);
const MAX_REPLY_LEN: usize = 32 * 1024;

/// Mirrors the design's state diagram. `Sending`/`Receiving`/`Io` collapse
/// into the single in-flight states below since this port drives the
/// connection from one dedicated worker thread rather than a non-blocking
/// state machine stepped by socket readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetClientState {
    Idle = 0,
    Connecting = 1,
    Connected = 2,
    Sending = 3,
    Receiving = 4,
    Disconnecting = 5,
}

impl NetClientState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Sending,
            4 => Self::Receiving,
            5 => Self::Disconnecting,
            _ => Self::Idle,
        }
    }
}

struct Verb {
    payload: Vec<u8>,
    want_reply: bool,
    caller_loop: Arc<EventLoop>,
    reply_to: Target,
    session_id: Option<SessionId>,
}

struct Inner {
    conn: Option<Conn>,
    queue: VecDeque<Verb>,
}

fn post_reply(caller_loop: &EventLoop, reply_to: Target, session_id: Option<SessionId>, result: CarbonResult<Vec<u8>>) {
    let mut ev = Event::new(EVENT_NET_CLIENT_DONE, reply_to);
    if let Some(sid) = session_id {
        ev = ev.with_session(sid);
    }
    ev = match result {
        Ok(bytes) => ev.with_nparam(0).with_payload(bytes),
        Err(err) => {
            tracing::warn!(kind = %err.kind, message = %err.message, "net client verb failed");
            ev.with_nparam(-err.kind.wire_code()).with_payload(err.message.into_bytes())
        }
    };
    caller_loop.send_event(ev);
}

struct DrainReceiver {
    endpoint: Endpoint,
    config: ConnectorConfig,
    inner: Arc<Mutex<Inner>>,
    state: Arc<AtomicU8>,
}

impl DrainReceiver {
    fn ensure_connected(&self, guard: &mut Inner) -> CarbonResult<()> {
        if guard.conn.is_some() {
            return Ok(());
        }
        self.state.store(NetClientState::Connecting as u8, Ordering::Release);
        let conn = connect(&self.endpoint, self.config.connect_timeout)?;
        self.state.store(NetClientState::Connected as u8, Ordering::Release);
        guard.conn = Some(conn);
        Ok(())
    }

    fn run_verb(&self, guard: &mut Inner, verb: &Verb) -> CarbonResult<Vec<u8>> {
        self.ensure_connected(guard)?;
        let conn = guard.conn.as_mut().expect("just connected");

        self.state.store(NetClientState::Sending as u8, Ordering::Release);
        conn.set_write_timeout(Some(self.config.send_timeout))
            .map_err(|e| CarbonError::io("failed to set send timeout", e))?;
        conn.write_all(&verb.payload)
            .map_err(|e| CarbonError::io(format!("send to {} failed", self.endpoint), e))?;

        if !verb.want_reply {
            self.state.store(NetClientState::Connected as u8, Ordering::Release);
            return Ok(Vec::new());
        }

        self.state.store(NetClientState::Receiving as u8, Ordering::Release);
        conn.set_read_timeout(Some(self.config.recv_timeout))
            .map_err(|e| CarbonError::io("failed to set recv timeout", e))?;
        let reply = read_capped(conn, MAX_REPLY_LEN)
            .map_err(|e| CarbonError::io(format!("recv from {} failed", self.endpoint), e))?;
        self.state.store(NetClientState::Connected as u8, Ordering::Release);
        Ok(reply)
    }
}

impl Receiver for DrainReceiver {
    fn handle(&self, _event: &Event) -> bool {
        loop {
            let mut guard = self.inner.lock().expect("net client queue poisoned");
            let Some(verb) = guard.queue.pop_front() else { break };

            let result = self.run_verb(&mut guard, &verb);
            if result.is_err() {
                self.state.store(NetClientState::Disconnecting as u8, Ordering::Release);
                guard.conn = None;
                self.state.store(NetClientState::Idle as u8, Ordering::Release);
            }
            drop(guard);
            post_reply(&verb.caller_loop, verb.reply_to, verb.session_id, result);
        }
        true
    }
}

/// A persistent client bound to one endpoint, draining its verb queue on a
/// dedicated worker thread.
pub struct NetClient {
    loop_thread: LoopThread,
    inner: Arc<Mutex<Inner>>,
    state: Arc<AtomicU8>,
}

impl NetClient {
    pub fn new(name: impl Into<String>, endpoint: Endpoint, config: ConnectorConfig) -> CarbonResult<Self> {
        let inner = Arc::new(Mutex::new(Inner { conn: None, queue: VecDeque::new() }));
        let state = Arc::new(AtomicU8::new(NetClientState::Idle as u8));
        let loop_thread = LoopThread::new(name);
        let receiver = Arc::new(DrainReceiver {
            endpoint,
            config,
            inner: inner.clone(),
            state: state.clone(),
        });
        loop_thread.event_loop().register_receiver(receiver);
        loop_thread.start()?;
        Ok(Self { loop_thread, inner, state })
    }

    #[must_use]
    pub fn state(&self) -> NetClientState { NetClientState::from_u8(self.state.load(Ordering::Acquire)) }

    fn enqueue(&self, verb: Verb) {
        self.inner.lock().expect("net client queue poisoned").queue.push_back(verb);
        self.loop_thread.event_loop().send_event(Event::new(EVENT_DRAIN, Target::Multicast));
    }

    /// Queues a fire-and-forget send; completion is posted to `caller_loop`
    /// as `EVENT_NET_CLIENT_DONE` once this verb reaches the front of the
    /// queue and is processed.
    pub fn send(&self, payload: Vec<u8>, caller_loop: Arc<EventLoop>, reply_to: Target, session_id: Option<SessionId>) {
        self.enqueue(Verb { payload, want_reply: false, caller_loop, reply_to, session_id });
    }

    /// Queues a send-then-recv verb.
    pub fn io(&self, payload: Vec<u8>, caller_loop: Arc<EventLoop>, reply_to: Target, session_id: Option<SessionId>) {
        self.enqueue(Verb { payload, want_reply: true, caller_loop, reply_to, session_id });
    }

    /// Drops the live connection, if any, without disturbing the queue — the
    /// next verb reconnects on demand.
    pub fn disconnect(&self) {
        self.state.store(NetClientState::Disconnecting as u8, Ordering::Release);
        self.inner.lock().expect("net client queue poisoned").conn = None;
        self.state.store(NetClientState::Idle as u8, Ordering::Release);
    }

    pub fn stop(&self) { self.loop_thread.stop(); }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        if self.loop_thread.is_running() {
            self.loop_thread.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn test_config() -> ConnectorConfig {
        ConnectorConfig {
            pool_size: 1,
            connect_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_millis(500),
            recv_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn reuses_one_connection_across_several_verbs() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let accepted_server = accepted.clone();
        let server = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                accepted_server.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 64];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let _ = stream.write_all(&buf[..n]);
                        }
                    }
                }
            }
        });

        let client = NetClient::new("test-net-client", Endpoint::Tcp(addr), test_config()).unwrap();
        let lp = Arc::new(EventLoop::new());
        let lp_run = lp.clone();
        let handle = thread::spawn(move || lp_run.run());

        struct Capture(Arc<Mutex<Vec<Vec<u8>>>>);
        impl Receiver for Capture {
            fn handle(&self, ev: &Event) -> bool {
                if let carbon_core::EventPayload::Bytes(b) = &ev.payload {
                    self.0.lock().unwrap().push(b.clone());
                }
                true
            }
        }
        let replies = Arc::new(Mutex::new(Vec::new()));
        let id = lp.register_receiver(Arc::new(Capture(replies.clone())));

        for i in 0..3u8 {
            client.io(vec![i], lp.clone(), Target::Receiver(id), None);
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while replies.lock().unwrap().len() < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(replies.lock().unwrap().len(), 3);
        assert_eq!(accepted.load(Ordering::SeqCst), 1, "all three verbs should share one connection");

        client.stop();
        lp.stop();
        handle.join().unwrap();
        drop(client);
        server.join().unwrap();
    }
}
