//! End-to-end scenarios 4 and 5 from the design: sync bridge happy path and
//! timeout, exercised against a real `EventLoop` on a real thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use carbon_core::{
    sync_call, CarbonErrorKind, Event, EventType, EventLoop, Receiver, SessionIdGenerator,
    SyncOutcome, SyncWaiter, Target,
};

struct NeverSeesReply {
    calls: Arc<AtomicUsize>,
}
impl Receiver for NeverSeesReply {
    fn handle(&self, _event: &Event) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}

struct StatusWaiter {
    session_id: carbon_core::SessionId,
}
impl SyncWaiter for StatusWaiter {
    fn session_id(&self) -> carbon_core::SessionId { self.session_id }
    fn process_sync_event(&mut self, reply: Event) -> SyncOutcome {
        SyncOutcome::Value(Box::new(reply.nparam))
    }
}

#[test]
fn sync_bridge_happy_path_does_not_reach_receiver() {
    let lp = Arc::new(EventLoop::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let receiver = Arc::new(NeverSeesReply { calls: calls.clone() });
    let _id = lp.register_receiver(receiver);

    let lp_thread = lp.clone();
    let handle = thread::spawn(move || lp_thread.run());

    let ids = SessionIdGenerator::new();
    let session_id = ids.next();

    let worker_loop = lp.clone();
    let start = Instant::now();
    let result: Result<i64, _> = sync_call(
        &lp,
        StatusWaiter { session_id },
        || {
            // Simulate a worker replying 50ms later, on another thread,
            // exactly as the connector/net-client would.
            let worker_loop = worker_loop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                worker_loop.send_event(
                    Event::new(EventType::user(0x9001), Target::Multicast)
                        .with_session(session_id)
                        .with_nparam(0), // OK
                );
            });
            Ok(())
        },
        Duration::from_millis(100),
    );

    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(result.unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "reply must never reach process()");

    lp.stop();
    handle.join().unwrap();
}

#[test]
fn sync_bridge_timeout_does_not_block_other_traffic() {
    let lp = Arc::new(EventLoop::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let receiver = Arc::new(NeverSeesReply { calls: calls.clone() });
    let id = lp.register_receiver(receiver);

    let lp_thread = lp.clone();
    let handle = thread::spawn(move || lp_thread.run());

    // Unrelated event posted concurrently with the sync wait below.
    let unrelated_loop = lp.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        unrelated_loop.send_event(Event::new(EventType::user(0x9002), Target::Multicast).to(id));
    });

    let ids = SessionIdGenerator::new();
    let session_id = ids.next();
    let start = Instant::now();
    let result: Result<i64, _> =
        sync_call(&lp, StatusWaiter { session_id }, || Ok(()), Duration::from_millis(300));

    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_millis(320), "took {elapsed:?}");
    let err = result.unwrap_err();
    assert_eq!(err.kind, CarbonErrorKind::TimedOut);

    // The unrelated event should still have gone through to the receiver.
    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline && calls.load(Ordering::SeqCst) == 0 {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    lp.stop();
    handle.join().unwrap();
}
