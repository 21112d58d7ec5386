//! Fixed-size pool of worker loops, each running one connect-send-\[recv\]-
//! close transaction per request. Every slot is a dedicated [`LoopThread`];
//! a request is rejected with `Busy` the instant the pool is exhausted
//! rather than queued, so callers feel backpressure immediately instead of
//! piling up latency behind a FIFO.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use carbon_core::{
    sync_call, CarbonError, CarbonErrorKind, CarbonResult, Event, EventLoop, EventPayload,
    EventType, LoopThread, Receiver, SessionId, SessionIdGenerator, SyncOutcome, SyncWaiter,
    Target,
};

use crate::endpoint::{connect, read_capped, Endpoint};

/// Posted back to the caller's loop when a worker finishes a request.
/// `nparam == 0` means success; otherwise it is the negated wire code of a
/// [`CarbonErrorKind`] and the payload (if any) carries the UTF-8 error
/// message.
pub const EVENT_CONNECTOR_DONE: EventType = EventType(0x1001);

const EVENT_WORK: EventType = EventType(0x1000);
const MAX_REPLY_LEN: usize = 32 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ConnectorConfig {
    pub pool_size: usize,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            pool_size: 100,
            connect_timeout: Duration::from_secs(8),
            send_timeout: Duration::from_secs(4),
            recv_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectorConfig {
    /// Overall budget for a blocking call through the sync bridge: every
    /// phase's timeout plus a safety pad, so `sync_call`'s own deadline is
    /// never what actually trips first.
    #[must_use]
    pub fn sync_budget(&self) -> Duration {
        self.connect_timeout + self.send_timeout + self.recv_timeout + Duration::from_secs(30)
    }
}

struct Job {
    endpoint: Endpoint,
    payload: Vec<u8>,
    want_reply: bool,
    caller_loop: Arc<EventLoop>,
    reply_to: Target,
    session_id: Option<SessionId>,
}

fn execute(job: &Job, config: &ConnectorConfig) -> CarbonResult<Vec<u8>> {
    let mut conn = connect(&job.endpoint, config.connect_timeout)?;
    conn.set_write_timeout(Some(config.send_timeout))
        .map_err(|e| CarbonError::io("failed to set send timeout", e))?;
    std::io::Write::write_all(&mut conn, &job.payload)
        .map_err(|e| CarbonError::io(format!("send to {} failed", job.endpoint), e))?;

    if !job.want_reply {
        return Ok(Vec::new());
    }

    let _ = conn.shutdown_write();
    conn.set_read_timeout(Some(config.recv_timeout))
        .map_err(|e| CarbonError::io("failed to set recv timeout", e))?;
    read_capped(&mut conn, MAX_REPLY_LEN)
        .map_err(|e| CarbonError::io(format!("recv from {} failed", job.endpoint), e))
}

fn post_reply(caller_loop: &EventLoop, reply_to: Target, session_id: Option<SessionId>, result: CarbonResult<Vec<u8>>) {
    let mut ev = Event::new(EVENT_CONNECTOR_DONE, reply_to);
    if let Some(sid) = session_id {
        ev = ev.with_session(sid);
    }
    ev = match result {
        Ok(bytes) => ev.with_nparam(0).with_payload(bytes),
        Err(err) => {
            tracing::warn!(kind = %err.kind, message = %err.message, "connector job failed");
            ev.with_nparam(-err.kind.wire_code()).with_payload(err.message.into_bytes())
        }
    };
    caller_loop.send_event(ev);
}

struct WorkerSlot {
    pending: Mutex<Option<Job>>,
}

struct JobReceiver {
    slot: Arc<WorkerSlot>,
    busy: Arc<AtomicBool>,
    config: ConnectorConfig,
}

impl Receiver for JobReceiver {
    fn handle(&self, _event: &Event) -> bool {
        let job = self.slot.pending.lock().expect("connector worker slot poisoned").take();
        if let Some(job) = job {
            let caller_loop = job.caller_loop.clone();
            let reply_to = job.reply_to;
            let session_id = job.session_id;
            let result = execute(&job, &self.config);
            post_reply(&caller_loop, reply_to, session_id, result);
        }
        self.busy.store(false, Ordering::Release);
        true
    }
}

struct PoolWorker {
    loop_thread: LoopThread,
    slot: Arc<WorkerSlot>,
    busy: Arc<AtomicBool>,
}

/// The worker pool. One per process is typical; `RemoteEventService` and
/// anything else issuing outbound socket traffic shares it.
pub struct Connector {
    config: ConnectorConfig,
    workers: Vec<PoolWorker>,
    ids: SessionIdGenerator,
}

impl Connector {
    pub fn new(config: ConnectorConfig) -> CarbonResult<Self> {
        let mut workers = Vec::with_capacity(config.pool_size);
        for idx in 0..config.pool_size {
            let loop_thread = LoopThread::new(format!("carbon-net-worker-{idx}"));
            let slot = Arc::new(WorkerSlot { pending: Mutex::new(None) });
            let busy = Arc::new(AtomicBool::new(false));
            let receiver = Arc::new(JobReceiver { slot: slot.clone(), busy: busy.clone(), config });
            loop_thread.event_loop().register_receiver(receiver);
            loop_thread.start()?;
            workers.push(PoolWorker { loop_thread, slot, busy });
        }
        Ok(Self { config, workers, ids: SessionIdGenerator::new() })
    }

    pub fn with_default_config() -> CarbonResult<Self> { Self::new(ConnectorConfig::default()) }

    #[must_use]
    pub fn config(&self) -> &ConnectorConfig { &self.config }

    fn claim_worker(&self) -> Option<&PoolWorker> {
        self.workers
            .iter()
            .find(|w| w.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok())
    }

    fn dispatch(
        &self,
        endpoint: Endpoint,
        payload: Vec<u8>,
        want_reply: bool,
        caller_loop: Arc<EventLoop>,
        reply_to: Target,
        session_id: Option<SessionId>,
    ) -> CarbonResult<()> {
        let worker = self.claim_worker().ok_or_else(|| {
            CarbonError::busy(format!("connector pool exhausted ({} workers)", self.workers.len()))
        })?;
        *worker.slot.pending.lock().expect("connector worker slot poisoned") =
            Some(Job { endpoint, payload, want_reply, caller_loop, reply_to, session_id });
        worker.loop_thread.event_loop().send_event(Event::new(EVENT_WORK, Target::Multicast));
        Ok(())
    }

    /// Fire-and-forget: connect, send, close. Completion (success or
    /// failure) is posted to `caller_loop` as `EVENT_CONNECTOR_DONE`;
    /// never blocks.
    pub fn send(
        &self,
        endpoint: Endpoint,
        payload: Vec<u8>,
        caller_loop: Arc<EventLoop>,
        reply_to: Target,
        session_id: Option<SessionId>,
    ) -> CarbonResult<()> {
        self.dispatch(endpoint, payload, false, caller_loop, reply_to, session_id)
    }

    /// Connect, send, receive until the peer closes its write half (or the
    /// recv timeout elapses), then close. Completion is posted the same way
    /// as [`send`](Self::send).
    pub fn io(
        &self,
        endpoint: Endpoint,
        payload: Vec<u8>,
        caller_loop: Arc<EventLoop>,
        reply_to: Target,
        session_id: Option<SessionId>,
    ) -> CarbonResult<()> {
        self.dispatch(endpoint, payload, true, caller_loop, reply_to, session_id)
    }

    /// Blocking variant of [`send`](Self::send), via the sync bridge.
    /// `event_loop` must be the loop `event_loop.run()` is executing on the
    /// calling thread (or one otherwise being pumped), exactly like
    /// [`carbon_core::sync_call`].
    pub fn send_sync(&self, event_loop: &Arc<EventLoop>, endpoint: Endpoint, payload: Vec<u8>) -> CarbonResult<()> {
        self.call_sync(event_loop, endpoint, payload, false).map(|_| ())
    }

    /// Blocking variant of [`io`](Self::io).
    pub fn io_sync(&self, event_loop: &Arc<EventLoop>, endpoint: Endpoint, payload: Vec<u8>) -> CarbonResult<Vec<u8>> {
        self.call_sync(event_loop, endpoint, payload, true)
    }

    fn call_sync(
        &self,
        event_loop: &Arc<EventLoop>,
        endpoint: Endpoint,
        payload: Vec<u8>,
        want_reply: bool,
    ) -> CarbonResult<Vec<u8>> {
        let session_id = self.ids.next();
        let waiter = ReplyWaiter { session_id };
        let caller_loop = event_loop.clone();
        let timeout = self.config.sync_budget();

        let outcome: Result<Vec<u8>, CarbonError> = sync_call(
            event_loop,
            waiter,
            || self.dispatch(endpoint, payload, want_reply, caller_loop, Target::Multicast, Some(session_id)),
            timeout,
        )?;
        outcome
    }
}

struct ReplyWaiter {
    session_id: SessionId,
}

impl SyncWaiter for ReplyWaiter {
    fn session_id(&self) -> SessionId { self.session_id }

    fn process_sync_event(&mut self, reply: Event) -> SyncOutcome {
        let bytes = match reply.payload {
            EventPayload::Bytes(b) => b,
            EventPayload::None => Vec::new(),
        };
        let outcome: Result<Vec<u8>, CarbonError> = if reply.nparam == 0 {
            Ok(bytes)
        } else {
            let kind = CarbonErrorKind::from_wire_code(-reply.nparam);
            let message = String::from_utf8(bytes).unwrap_or_else(|_| kind.to_string());
            Err(CarbonError::new(kind, message))
        };
        SyncOutcome::Value(Box::new(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::thread;

    fn echo_server() -> (SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).ok();
                stream.write_all(b"echo:").ok();
                stream.write_all(&buf).ok();
            }
        });
        (addr, handle)
    }

    fn test_config() -> ConnectorConfig {
        ConnectorConfig {
            pool_size: 2,
            connect_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_millis(500),
            recv_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn io_sync_round_trips_through_echo_server() {
        let (addr, server) = echo_server();
        let connector = Connector::new(test_config()).unwrap();
        let lp = Arc::new(EventLoop::new());
        let lp_thread = lp.clone();
        let run_handle = thread::spawn(move || lp_thread.run());

        let reply = connector.io_sync(&lp, Endpoint::Tcp(addr), b"hi".to_vec()).unwrap();
        assert_eq!(reply, b"echo:hi");

        lp.stop();
        run_handle.join().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn pool_exhaustion_fails_fast_with_busy() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts the connection but never writes a reply, so the single
        // worker sits blocked in recv for the whole recv_timeout.
        let server = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_millis(400));
                drop(stream);
            }
        });

        let config = ConnectorConfig {
            pool_size: 1,
            connect_timeout: Duration::from_millis(300),
            send_timeout: Duration::from_millis(300),
            recv_timeout: Duration::from_millis(300),
        };
        let connector = Connector::new(config).unwrap();
        let lp = Arc::new(EventLoop::new());

        connector
            .io(Endpoint::Tcp(addr), b"first".to_vec(), lp.clone(), Target::Multicast, None)
            .unwrap();
        thread::sleep(Duration::from_millis(30)); // let the worker claim and block on connect/send

        let second = connector.io(Endpoint::Tcp(addr), b"second".to_vec(), lp.clone(), Target::Multicast, None);
        assert!(matches!(second, Err(e) if e.kind == CarbonErrorKind::Busy));

        server.join().unwrap();
    }
}
