//! Cooperative stop signal.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A one-shot cooperative stop signal.
///
/// Worker and poller loops observe the signal at every loop head and at
/// every blocking wait, so cancellation completes within one wait
/// granularity. Once triggered the signal stays set; a restarted loop
/// needs a fresh signal.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the signal, waking every blocked waiter.
    pub fn trigger(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }

    /// Returns true once the signal has been triggered.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleeps up to `timeout`, returning early when the signal fires.
    ///
    /// Returns true when the signal is (or becomes) triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();

        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if self.condvar.wait_for(&mut stopped, deadline - now).timed_out() {
                break;
            }
        }

        *stopped
    }
}
