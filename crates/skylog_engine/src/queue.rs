//! Thread-safe FIFO of pending sync contexts.

use crate::stop::StopSignal;
use parking_lot::{Condvar, Mutex};
use skylog_protocol::Event;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Durable log line callback; fire-and-forget, must not block.
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

/// One enqueue call's bundle: the events to sync plus the tags and log
/// callback that travel with them.
#[derive(Clone)]
pub struct SyncContext {
    /// Events in enqueue order.
    pub events: Vec<Event>,
    /// Log callback invoked with submission summaries.
    pub log: LogFn,
    /// Game version tag for the whole bundle.
    pub game_version: String,
    /// Game build tag for the whole bundle.
    pub game_build: String,
}

impl SyncContext {
    /// Creates a context.
    pub fn new(
        events: Vec<Event>,
        log: LogFn,
        game_version: impl Into<String>,
        game_build: impl Into<String>,
    ) -> Self {
        Self {
            events,
            log,
            game_version: game_version.into(),
            game_build: game_build.into(),
        }
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("events", &self.events.len())
            .field("game_version", &self.game_version)
            .field("game_build", &self.game_build)
            .finish()
    }
}

/// Thread-safe FIFO of pending sync contexts.
///
/// Producers push from foreground threads; a single worker consumes.
/// All waits are bounded and re-check the stop signal on every wakeup.
#[derive(Default)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<SyncContext>>,
    signal: Condvar,
}

impl OutboundQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a context and signals the worker.
    pub fn push_back(&self, context: SyncContext) {
        self.items.lock().push_back(context);
        self.signal.notify_all();
    }

    /// Prepends a context, used to return the unsent remainder of an
    /// oversized bundle without losing its place in line.
    pub fn push_front(&self, context: SyncContext) {
        self.items.lock().push_front(context);
        self.signal.notify_all();
    }

    /// Returns the number of queued contexts.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true when no context is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wakes every blocked waiter so it can re-check the stop signal.
    pub fn wake(&self) {
        self.signal.notify_all();
    }

    /// Removes and returns every queued context.
    ///
    /// Stop does not clear the queue; residual items either reach the
    /// next worker run or are drained explicitly with this method.
    pub fn drain(&self) -> Vec<SyncContext> {
        self.items.lock().drain(..).collect()
    }

    /// Waits up to `timeout` for a context, popping the front one.
    ///
    /// Returns `None` when the wait elapses or the stop signal fires.
    pub fn wait_pop(&self, timeout: Duration, stop: &StopSignal) -> Option<SyncContext> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();

        loop {
            if stop.is_stopped() {
                return None;
            }
            if let Some(context) = items.pop_front() {
                return Some(context);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let _ = self.signal.wait_for(&mut items, deadline - now);
        }
    }

    /// Pops the front context only when `accept` approves it.
    pub fn pop_when(&self, accept: impl FnOnce(&SyncContext) -> bool) -> Option<SyncContext> {
        let mut items = self.items.lock();
        if items.front().is_some_and(|front| accept(front)) {
            items.pop_front()
        } else {
            None
        }
    }

    /// Waits up to `timeout` for the queue to become non-empty.
    ///
    /// Returns true when a context is available.
    pub fn wait_for_more(&self, timeout: Duration, stop: &StopSignal) -> bool {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();

        loop {
            if !items.is_empty() {
                return true;
            }
            if stop.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = self.signal.wait_for(&mut items, deadline - now);
        }
    }

    /// Clears the worker's started flag, but only while the queue is
    /// empty. Returns true when the worker may retire.
    ///
    /// Holding the queue lock across the flag store closes the race
    /// with a producer that pushes between the worker's last pop and
    /// its retirement.
    pub fn retire_if_empty(&self, started: &AtomicBool) -> bool {
        let items = self.items.lock();
        if items.is_empty() {
            started.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::thread;

    fn context(kinds: &[&str]) -> SyncContext {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let events = kinds
            .iter()
            .map(|k| Event::new(*k, ts, "JAMESON"))
            .collect();
        SyncContext::new(events, Arc::new(|_| {}), "4.1", "r309")
    }

    #[test]
    fn fifo_order() {
        let queue = OutboundQueue::new();
        queue.push_back(context(&["Jump"]));
        queue.push_back(context(&["Scan"]));

        let stop = StopSignal::new();
        let first = queue.wait_pop(Duration::from_millis(10), &stop).unwrap();
        let second = queue.wait_pop(Duration::from_millis(10), &stop).unwrap();
        assert_eq!(first.events[0].kind.name(), "Jump");
        assert_eq!(second.events[0].kind.name(), "Scan");
    }

    #[test]
    fn push_front_takes_priority() {
        let queue = OutboundQueue::new();
        queue.push_back(context(&["Scan"]));
        queue.push_front(context(&["Jump"]));

        let stop = StopSignal::new();
        let first = queue.wait_pop(Duration::from_millis(10), &stop).unwrap();
        assert_eq!(first.events[0].kind.name(), "Jump");
    }

    #[test]
    fn wait_pop_times_out_empty() {
        let queue = OutboundQueue::new();
        let stop = StopSignal::new();
        assert!(queue.wait_pop(Duration::from_millis(10), &stop).is_none());
    }

    #[test]
    fn wait_pop_wakes_on_push() {
        let queue = Arc::new(OutboundQueue::new());
        let stop = Arc::new(StopSignal::new());

        let consumer_queue = Arc::clone(&queue);
        let consumer_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            consumer_queue.wait_pop(Duration::from_secs(30), &consumer_stop)
        });

        thread::sleep(Duration::from_millis(20));
        queue.push_back(context(&["Jump"]));

        let popped = handle.join().unwrap();
        assert!(popped.is_some());
    }

    #[test]
    fn wait_pop_observes_stop() {
        let queue = Arc::new(OutboundQueue::new());
        let stop = Arc::new(StopSignal::new());

        let consumer_queue = Arc::clone(&queue);
        let consumer_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let popped = consumer_queue.wait_pop(Duration::from_secs(30), &consumer_stop);
            (popped.is_none(), start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        stop.trigger();
        queue.wake();

        let (was_none, elapsed) = handle.join().unwrap();
        assert!(was_none);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn pop_when_gates_on_front() {
        let queue = OutboundQueue::new();
        queue.push_back(context(&["Jump"]));

        assert!(queue.pop_when(|c| c.events[0].kind.name() == "Scan").is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_when(|c| c.events[0].kind.name() == "Jump").is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn retire_only_when_empty() {
        let queue = OutboundQueue::new();
        let started = AtomicBool::new(true);

        queue.push_back(context(&["Jump"]));
        assert!(!queue.retire_if_empty(&started));
        assert!(started.load(Ordering::Acquire));

        let stop = StopSignal::new();
        queue.wait_pop(Duration::from_millis(10), &stop);
        assert!(queue.retire_if_empty(&started));
        assert!(!started.load(Ordering::Acquire));
    }
}
