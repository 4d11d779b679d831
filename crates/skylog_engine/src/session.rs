//! Session façade tying the outbound and inbound paths together.

use crate::config::SyncConfig;
use crate::discard::DiscardPolicy;
use crate::endpoint::RemoteEndpoint;
use crate::poller::{InboundPoller, PollerState, StatusFn};
use crate::queue::{LogFn, OutboundQueue, SyncContext};
use crate::stop::StopSignal;
use crate::store::{CheckpointStore, EventStore};
use crate::worker::{OutboundWorker, SyncStats, WorkerState};
use parking_lot::Mutex;
use skylog_protocol::Event;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::warn;

/// One sync session: a single producer queue with its consumer worker,
/// plus one independent inbound poller, sharing a discard policy and a
/// stop signal.
///
/// Sessions own their state explicitly; nothing is global. Independent
/// sessions share no queue or discard state. A stopped session stays
/// stopped; create a fresh one to resume syncing. The queue keeps any
/// residual contexts (see [`SyncSession::drain_queue`]).
pub struct SyncSession<E, S, C> {
    queue: Arc<OutboundQueue>,
    stop: Arc<StopSignal>,
    worker_started: Arc<AtomicBool>,
    worker: Arc<OutboundWorker<E, S>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    poller: Mutex<Option<Arc<InboundPoller<E, S, C>>>>,
    poller_handle: Mutex<Option<JoinHandle<()>>>,
    config: SyncConfig,
    endpoint: Arc<E>,
    store: Arc<S>,
    checkpoints: Arc<C>,
}

impl<E, S, C> SyncSession<E, S, C>
where
    E: RemoteEndpoint + 'static,
    S: EventStore + 'static,
    C: CheckpointStore + 'static,
{
    /// Creates a session over the given collaborators.
    pub fn new(config: SyncConfig, endpoint: Arc<E>, store: Arc<S>, checkpoints: Arc<C>) -> Self {
        let queue = Arc::new(OutboundQueue::new());
        let stop = Arc::new(StopSignal::new());
        let worker_started = Arc::new(AtomicBool::new(false));
        let discard = Arc::new(DiscardPolicy::new(config.discard_refresh));

        let worker = Arc::new(OutboundWorker::new(
            config.clone(),
            Arc::clone(&queue),
            discard,
            Arc::clone(&endpoint),
            Arc::clone(&store),
            Arc::clone(&stop),
            Arc::clone(&worker_started),
        ));

        Self {
            queue,
            stop,
            worker_started,
            worker,
            worker_handle: Mutex::new(None),
            poller: Mutex::new(None),
            poller_handle: Mutex::new(None),
            config,
            endpoint,
            store,
            checkpoints,
        }
    }

    /// Appends events to the outbound queue and makes sure the worker
    /// is running. Starting the worker is idempotent: the atomic start
    /// flag guarantees a single worker instance per session.
    pub fn enqueue(
        &self,
        events: Vec<Event>,
        log: LogFn,
        game_version: impl Into<String>,
        game_build: impl Into<String>,
    ) {
        self.queue
            .push_back(SyncContext::new(events, log, game_version, game_build));
        self.ensure_worker();
    }

    fn ensure_worker(&self) {
        if self
            .worker_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let worker = Arc::clone(&self.worker);
        match std::thread::Builder::new()
            .name("skylog-outbound".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => *self.worker_handle.lock() = Some(handle),
            Err(err) => {
                self.worker_started.store(false, Ordering::Release);
                warn!(%err, "failed to spawn outbound worker");
            }
        }
    }

    /// Starts the inbound poller for this session's profile. Repeated
    /// calls are no-ops.
    pub fn start_poller(&self, status: Option<StatusFn>) {
        let mut poller_slot = self.poller.lock();
        if poller_slot.is_some() {
            return;
        }

        let mut poller = InboundPoller::new(
            self.config.clone(),
            Arc::clone(&self.endpoint),
            Arc::clone(&self.store),
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.stop),
        );
        if let Some(status) = status {
            poller = poller.with_status(status);
        }
        let poller = Arc::new(poller);

        let runner = Arc::clone(&poller);
        match std::thread::Builder::new()
            .name("skylog-inbound".into())
            .spawn(move || runner.run())
        {
            Ok(handle) => {
                *poller_slot = Some(poller);
                *self.poller_handle.lock() = Some(handle);
            }
            Err(err) => warn!(%err, "failed to spawn inbound poller"),
        }
    }

    /// Triggers the cooperative stop signal and wakes every blocked
    /// wait. The queue keeps its residual contexts.
    pub fn stop(&self) {
        self.stop.trigger();
        self.queue.wake();
    }

    /// Waits for the worker and poller threads to exit.
    pub fn join(&self) {
        if let Some(handle) = self.worker_handle.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.poller_handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Returns the worker's current state.
    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Returns the poller's current state, if one was started.
    pub fn poller_state(&self) -> Option<PollerState> {
        self.poller.lock().as_ref().map(|p| p.state())
    }

    /// Returns a snapshot of the outbound counters.
    pub fn stats(&self) -> SyncStats {
        self.worker.stats()
    }

    /// Returns the number of queued contexts.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Removes and returns every queued context.
    pub fn drain_queue(&self) -> Vec<SyncContext> {
        self.queue.drain()
    }
}
