//! The event loop: timer wheel, event FIFO, receiver set, and the sync
//! bridge's attachment point, all on one thread.
//!
//! See the crate-level docs for the iteration algorithm; this module is the
//! literal implementation of it.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::clock;
use crate::event::{Event, Target};
use crate::receiver::{Receiver, ReceiverId};
use crate::sync::{lock, wait_while_timeout};
use crate::sync_waiter::{SyncOutcome, SyncWaiter};
use crate::timer::{Timer, TimerId, TimerParam};

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    timer: Timer,
    id: TimerId,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

#[derive(Default)]
struct LoopState {
    timers: BinaryHeap<Reverse<TimerEntry>>,
    events: VecDeque<Event>,
    receivers: Vec<Option<Arc<dyn Receiver>>>,
    free_slots: Vec<usize>,
    /// Index of the receiver currently inside `process`, if any. Exposed for
    /// tests; `unregister_receiver` clears the affected slot regardless of
    /// this value — the slot going `None` is what actually prevents a
    /// stale dispatch, this field is bookkeeping for the "cursor" the
    /// design calls out.
    cursor: Option<usize>,
}

struct AttachedWaiter {
    session_id: crate::ids::SessionId,
    waiter: Box<dyn SyncWaiter>,
    reply: Option<Event>,
}

#[derive(Default)]
struct SyncState {
    attached: Option<AttachedWaiter>,
}

/// Single-threaded event dispatcher. Create one per dedicated thread (see
/// [`LoopThread`](crate::loop_thread::LoopThread)), share it via `Arc` with
/// anything that needs to post events or register receivers on it.
pub struct EventLoop {
    state: Mutex<LoopState>,
    main_cond: Condvar,
    sync_state: Mutex<SyncState>,
    sync_cond: Condvar,
    done: AtomicBool,
    next_timer_id: AtomicU64,
    idle_hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("done", &self.done.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for EventLoop {
    fn default() -> Self { Self::new() }
}

impl EventLoop {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState::default()),
            main_cond: Condvar::new(),
            sync_state: Mutex::new(SyncState::default()),
            sync_cond: Condvar::new(),
            done: AtomicBool::new(false),
            next_timer_id: AtomicU64::new(1),
            idle_hook: Mutex::new(None),
        }
    }

    /// Installs the no-op-by-default idle hook invoked when a dispatch pass
    /// processes no timers and no events.
    pub fn set_idle_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *lock(&self.idle_hook) = Some(Box::new(hook));
    }

    // ---- event queue -------------------------------------------------

    /// Enqueues `ev`. Never blocks. Dropped (with a log line) if the loop
    /// has been told to stop. If `ev.session_id` matches a currently
    /// attached [`SyncWaiter`], the event is handed directly to the waiter
    /// instead of being queued, and the sync condvar is signalled.
    pub fn send_event(&self, ev: Event) {
        if self.done.load(Ordering::Acquire) {
            tracing::debug!(desc = ev.desc, "send_event after stop, dropping");
            return;
        }

        if let Some(session_id) = ev.session_id {
            let mut sync_guard = lock(&self.sync_state);
            if let Some(attached) = sync_guard.attached.as_mut() {
                if attached.session_id == session_id {
                    attached.reply = Some(ev);
                    drop(sync_guard);
                    self.sync_cond.notify_all();
                    return;
                }
            }
        }

        let mut guard = lock(&self.state);
        guard.events.push_back(ev);
        drop(guard);
        self.main_cond.notify_all();
    }

    /// `send_event` after redirecting `ev` to `receiver`.
    pub fn send_event_to(&self, ev: Event, receiver: ReceiverId) {
        self.send_event(ev.to(receiver));
    }

    // ---- timers --------------------------------------------------------

    pub fn insert_timer(&self, timer: Timer) -> TimerId {
        let id = TimerId(self.next_timer_id.fetch_add(1, Ordering::Relaxed));
        let entry = TimerEntry { deadline: timer.deadline, seq: id.0, timer, id };
        let mut guard = lock(&self.state);
        guard.timers.push(Reverse(entry));
        drop(guard);
        self.main_cond.notify_all();
        id
    }

    pub fn restart_timer(&self, id: TimerId) -> bool {
        let mut guard = lock(&self.state);
        let Some(mut entry) = Self::remove_timer(&mut guard, id) else { return false };
        let period = entry.timer.period.unwrap_or_default();
        entry.deadline = clock::now() + period;
        guard.timers.push(Reverse(entry));
        drop(guard);
        self.main_cond.notify_all();
        true
    }

    /// Disables `id` without deleting it, by pushing its deadline to
    /// [`clock::forever`].
    pub fn pause_timer(&self, id: TimerId) -> bool {
        let mut guard = lock(&self.state);
        let Some(mut entry) = Self::remove_timer(&mut guard, id) else { return false };
        entry.deadline = clock::forever();
        guard.timers.push(Reverse(entry));
        drop(guard);
        self.main_cond.notify_all();
        true
    }

    pub fn delete_timer(&self, id: TimerId) -> bool {
        let mut guard = lock(&self.state);
        Self::remove_timer(&mut guard, id).is_some()
    }

    fn remove_timer(state: &mut LoopState, id: TimerId) -> Option<TimerEntry> {
        let items: Vec<Reverse<TimerEntry>> = state.timers.drain().collect();
        let mut found = None;
        for Reverse(entry) in items {
            if entry.id == id {
                found = Some(entry);
            } else {
                state.timers.push(Reverse(entry));
            }
        }
        found
    }

    // ---- receivers -------------------------------------------------

    pub fn register_receiver(&self, receiver: Arc<dyn Receiver>) -> ReceiverId {
        let mut guard = lock(&self.state);
        let idx = if let Some(slot) = guard.free_slots.pop() {
            guard.receivers[slot] = Some(receiver);
            slot
        } else {
            guard.receivers.push(Some(receiver));
            guard.receivers.len() - 1
        };
        ReceiverId(idx)
    }

    /// Removes `id` from the receiver set. Safe to call from inside that
    /// receiver's own `process` callback (the loop dispatches by re-reading
    /// the slot on each index, so a `None` slot is simply skipped if it was
    /// not yet reached).
    pub fn unregister_receiver(&self, id: ReceiverId) {
        let mut guard = lock(&self.state);
        if let Some(slot) = guard.receivers.get_mut(id.0) {
            *slot = None;
            guard.free_slots.push(id.0);
            if guard.cursor == Some(id.0) {
                guard.cursor = None;
            }
        }
    }

    // ---- sync bridge -------------------------------------------------

    /// Attaches `waiter` as the loop's single sync waiter. Panics if one is
    /// already attached — the bridge contract guarantees this never
    /// happens in practice (see [`sync_call`](crate::sync_bridge::sync_call)).
    pub fn attach_sync(&self, waiter: Box<dyn SyncWaiter>) {
        let mut guard = lock(&self.sync_state);
        assert!(guard.attached.is_none(), "attach_sync: a SyncWaiter is already attached");
        let session_id = waiter.session_id();
        guard.attached = Some(AttachedWaiter { session_id, waiter, reply: None });
    }

    pub fn detach_sync(&self) {
        lock(&self.sync_state).attached = None;
    }

    /// Blocks until either the attached waiter's reply arrives, the loop
    /// stops, or `timeout` elapses. Checks the waiter's slot directly
    /// (rather than only the condvar wake) so a reply delivered before this
    /// call is still observed.
    pub fn wait_sync(&self, timeout: Duration) -> SyncOutcome {
        let guard = lock(&self.sync_state);
        let done = &self.done;
        let (mut guard, _timed_out) = wait_while_timeout(&self.sync_cond, guard, timeout, |s| {
            !done.load(Ordering::Acquire)
                && s.attached.as_ref().is_some_and(|a| a.reply.is_none())
        });

        let Some(attached) = guard.attached.as_mut() else {
            return SyncOutcome::Gone;
        };
        if let Some(reply) = attached.reply.take() {
            return attached.waiter.process_sync_event(reply);
        }
        if done.load(Ordering::Acquire) {
            return SyncOutcome::Gone;
        }
        SyncOutcome::TimedOut
    }

    // ---- run / stop -------------------------------------------------

    pub fn notify(&self) { self.main_cond.notify_all(); }

    pub fn is_done(&self) -> bool { self.done.load(Ordering::Acquire) }

    /// Clears the stopped flag so a fresh `run()` call can restart this
    /// loop. Only meant to be called by
    /// [`LoopThread::start`](crate::loop_thread::LoopThread::start) after a
    /// prior `stop`/join — never while `run()` might still be executing.
    pub(crate) fn reset_for_restart(&self) { self.done.store(false, Ordering::Release); }

    /// Stops the loop: marks it done, wakes both condvars (so a blocked
    /// `wait_sync` returns `Gone` instead of hanging), and drops any events
    /// still queued, with a log line — pending work is never carried across
    /// a restart.
    pub fn stop(&self) {
        self.done.store(true, Ordering::Release);
        let dropped = {
            let mut guard = lock(&self.state);
            let n = guard.events.len();
            guard.events.clear();
            n
        };
        if dropped > 0 {
            tracing::info!(dropped, "event loop stopping, dropped pending events");
        }
        self.main_cond.notify_all();
        self.sync_cond.notify_all();
    }

    /// Runs the dispatch loop until `stop()` is called. Intended to be the
    /// body of a dedicated thread (see [`LoopThread`](crate::loop_thread::LoopThread)).
    pub fn run(&self) {
        tracing::info!("event loop starting");
        while !self.is_done() {
            self.dispatch_once();
            if self.is_done() {
                break;
            }

            let sleep_until = self.next_wake_deadline();
            let guard = lock(&self.state);
            if !guard.events.is_empty() {
                // Work arrived mid-pass; go around again without sleeping
                // (prevents live-lock of self-feeding receivers by leaving
                // it for the next iteration, but also prevents sleeping
                // through already-pending work).
                continue;
            }
            let timeout = clock::remaining(sleep_until);
            let _ = self.main_cond.wait_timeout(guard, timeout).expect("poisoned");
        }
        tracing::info!("event loop stopped");
    }

    fn next_wake_deadline(&self) -> Instant {
        let guard = lock(&self.state);
        let earliest_timer = guard.timers.peek().map(|Reverse(t)| t.deadline);
        drop(guard);
        let idle_cap = clock::after(clock::MAX_IDLE_SLEEP);
        earliest_timer.map_or(idle_cap, |d| d.min(idle_cap))
    }

    fn dispatch_once(&self) {
        let now = clock::now();
        self.fire_due_timers(now);

        // Snapshot taken strictly after the timer pass; events created at
        // or after this instant are left for the next iteration (strict
        // `<`, not `<=`, to avoid live-lock per the design's open question).
        let cutoff = clock::now();
        let dispatched_any = self.drain_events(cutoff);

        if !dispatched_any {
            if let Some(hook) = lock(&self.idle_hook).as_ref() {
                hook();
            }
        }
    }

    fn fire_due_timers(&self, now: Instant) {
        loop {
            let due = {
                let mut guard = lock(&self.state);
                let is_due = matches!(guard.timers.peek(), Some(Reverse(t)) if t.deadline <= now);
                if is_due { guard.timers.pop().map(|Reverse(e)| e) } else { None }
            };
            let Some(mut entry) = due else { break };
            let param = entry.timer.param;
            (entry.timer.callback)(param);
            if let Some(period) = entry.timer.period {
                entry.deadline = now + period;
                lock(&self.state).timers.push(Reverse(entry));
            }
        }
    }

    fn drain_events(&self, cutoff: Instant) -> bool {
        let mut dispatched_any = false;
        loop {
            let ev = {
                let mut guard = lock(&self.state);
                let is_ready = matches!(guard.events.front(), Some(e) if e.created_at < cutoff);
                if is_ready { guard.events.pop_front() } else { None }
            };
            let Some(ev) = ev else { break };
            dispatched_any = true;
            self.dispatch_event(ev);
        }
        dispatched_any
    }

    fn dispatch_event(&self, ev: Event) {
        match ev.receiver {
            Target::Receiver(id) => {
                let receiver = {
                    let mut guard = lock(&self.state);
                    guard.cursor = Some(id.0);
                    guard.receivers.get(id.0).and_then(Clone::clone)
                };
                if let Some(r) = receiver {
                    r.process(&ev);
                } else {
                    tracing::debug!(desc = ev.desc, "receiver gone before dispatch, dropping");
                }
                lock(&self.state).cursor = None;
            }
            Target::Multicast => {
                let len = lock(&self.state).receivers.len();
                let mut idx = 0;
                while idx < len {
                    let receiver = {
                        let mut guard = lock(&self.state);
                        guard.cursor = Some(idx);
                        guard.receivers.get(idx).and_then(Clone::clone)
                    };
                    if let Some(r) = receiver {
                        r.process(&ev);
                    }
                    lock(&self.state).cursor = None;
                    idx += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventType};
    use std::sync::atomic::AtomicI64;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct Recorder {
        calls: AtomicI64,
        last_nparam: AtomicI64,
    }
    impl Receiver for Recorder {
        fn handle(&self, event: &Event) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_nparam.store(event.nparam, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn single_event_delivery() {
        let lp = Arc::new(EventLoop::new());
        let recorder = Arc::new(Recorder { calls: AtomicI64::new(0), last_nparam: AtomicI64::new(0) });
        let id = lp.register_receiver(recorder.clone());

        let lp_thread = lp.clone();
        let handle = thread::spawn(move || lp_thread.run());

        lp.send_event(Event::new(EventType::user(0x8001), Target::Multicast).to(id).with_nparam(7));

        let deadline = clock::after(Duration::from_millis(100));
        while clock::now() < deadline && recorder.calls.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.last_nparam.load(Ordering::SeqCst), 7);

        lp.stop();
        handle.join().unwrap();
    }

    #[test]
    fn periodic_timer_fires_several_times() {
        let lp = Arc::new(EventLoop::new());
        let recorder = Arc::new(Recorder { calls: AtomicI64::new(0), last_nparam: AtomicI64::new(0) });
        let id = lp.register_receiver(recorder.clone());

        let lp_for_timer = lp.clone();
        lp.insert_timer(Timer::periodic("tick", Duration::from_millis(200), 0, move |_| {
            lp_for_timer.send_event(Event::new(EventType::user(0x8002), Target::Multicast).to(id));
        }));

        let lp_thread = lp.clone();
        let handle = thread::spawn(move || lp_thread.run());

        thread::sleep(Duration::from_millis(1000));
        lp.stop();
        handle.join().unwrap();

        let n = recorder.calls.load(Ordering::SeqCst);
        assert!((4..=6).contains(&n), "expected 4-6 ticks, got {n}");
    }

    struct MulticastProbe {
        name: &'static str,
        calls: Arc<std::sync::Mutex<Vec<&'static str>>>,
        unregister_on_call: Option<(Arc<EventLoop>, ReceiverId)>,
    }
    impl Receiver for MulticastProbe {
        fn handle(&self, _event: &Event) -> bool {
            self.calls.lock().unwrap().push(self.name);
            if let Some((loop_, id)) = &self.unregister_on_call {
                loop_.unregister_receiver(*id);
            }
            true
        }
    }

    #[test]
    fn self_unregister_mid_multicast_dispatch() {
        let lp = Arc::new(EventLoop::new());
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));

        let r1 = Arc::new(MulticastProbe { name: "r1", calls: calls.clone(), unregister_on_call: None });
        let id1 = lp.register_receiver(r1);

        // Register r3 first so we can capture its id before r2.
        let r3 = Arc::new(MulticastProbe { name: "r3", calls: calls.clone(), unregister_on_call: None });
        let id3 = lp.register_receiver(r3);

        let r2 = Arc::new(MulticastProbe {
            name: "r2",
            calls: calls.clone(),
            unregister_on_call: Some((lp.clone(), id3)),
        });
        let _id2 = lp.register_receiver(r2);

        let _ = id1;
        let lp_thread = lp.clone();
        let handle = thread::spawn(move || lp_thread.run());

        lp.send_event(Event::new(EventType::user(0x8003), Target::Multicast));

        thread::sleep(Duration::from_millis(100));
        lp.stop();
        handle.join().unwrap();

        let seen = calls.lock().unwrap().clone();
        assert!(seen.contains(&"r1"));
        assert!(seen.contains(&"r2"));
        assert!(!seen.contains(&"r3"), "r3 should have been unregistered before it was reached");
    }
}
