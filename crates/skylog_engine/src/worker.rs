//! Outbound worker: batches, holds, retries and commits queued events.

use crate::config::{Credentials, SyncConfig};
use crate::discard::{is_held, DiscardPolicy};
use crate::endpoint::RemoteEndpoint;
use crate::error::{SyncError, SyncResult};
use crate::queue::{OutboundQueue, SyncContext};
use crate::stop::StopSignal;
use crate::store::EventStore;
use parking_lot::RwLock;
use skylog_protocol::{Event, SubmitOutcome};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, warn};

/// The current state of the outbound worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No worker running; the next enqueue starts one.
    Idle,
    /// Processing queued contexts.
    Running,
    /// Queue empty, waiting a bounded time for more work.
    Draining,
    /// The stop signal fired.
    Stopped,
}

impl WorkerState {
    /// Returns true while the worker loop is alive.
    pub fn is_active(&self) -> bool {
        matches!(self, WorkerState::Running | WorkerState::Draining)
    }
}

/// Counters describing outbound progress.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Batches submitted successfully.
    pub batches_submitted: u64,
    /// Events confirmed synced.
    pub events_synced: u64,
    /// Events suppressed by the beta rule.
    pub events_suppressed: u64,
    /// Batches dropped after exhausting the retry budget.
    pub batches_dropped: u64,
    /// Failed submission attempts.
    pub retries: u64,
    /// Last error message, if any.
    pub last_error: Option<String>,
}

/// The single background consumer of the outbound queue.
///
/// One instance runs per session, guarded by the session's atomic start
/// flag. The worker drains the queue into policy-filtered batches,
/// submits them with bounded retry, and commits confirmed outcomes to
/// the local store. It never panics on remote failure; every error path
/// ends in a log line and a state flag.
pub struct OutboundWorker<E, S> {
    config: SyncConfig,
    queue: Arc<OutboundQueue>,
    discard: Arc<DiscardPolicy>,
    endpoint: Arc<E>,
    store: Arc<S>,
    stop: Arc<StopSignal>,
    started: Arc<AtomicBool>,
    state: RwLock<WorkerState>,
    stats: RwLock<SyncStats>,
}

impl<E: RemoteEndpoint, S: EventStore> OutboundWorker<E, S> {
    /// Creates a worker over shared session state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SyncConfig,
        queue: Arc<OutboundQueue>,
        discard: Arc<DiscardPolicy>,
        endpoint: Arc<E>,
        store: Arc<S>,
        stop: Arc<StopSignal>,
        started: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            queue,
            discard,
            endpoint,
            store,
            stop,
            started,
            state: RwLock::new(WorkerState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.write() = state;
    }

    /// Runs the worker loop until the queue drains past the idle wait
    /// or the stop signal fires.
    pub fn run(&self) {
        loop {
            if self.stop.is_stopped() {
                break;
            }

            if self.discard.is_stale() {
                self.discard.refresh_from(self.endpoint.as_ref());
            }

            let Some(context) = self.next_context() else {
                break;
            };

            self.set_state(WorkerState::Running);
            self.process(context);

            // Politeness delay between batches regardless of outcome.
            if self.stop.wait_timeout(self.config.batch_spacing) {
                break;
            }
        }

        let stopped = self.stop.is_stopped();
        self.set_state(if stopped {
            WorkerState::Stopped
        } else {
            WorkerState::Idle
        });
        debug!(stopped, "outbound worker exiting");
    }

    /// Waits for the next context, retiring the worker when the idle
    /// wait elapses on an empty queue.
    fn next_context(&self) -> Option<SyncContext> {
        loop {
            self.set_state(WorkerState::Draining);
            if let Some(context) = self.queue.wait_pop(self.config.idle_wait, &self.stop) {
                return Some(context);
            }
            if self.stop.is_stopped() {
                return None;
            }
            if self.queue.retire_if_empty(&self.started) {
                return None;
            }
            // A producer slipped in between the timeout and retirement.
        }
    }

    fn process(&self, context: SyncContext) {
        if context.events.is_empty() {
            return;
        }

        if self.discard.suppresses(&context.events) {
            self.suppress(&context);
            return;
        }

        // A held leading kind waits for a companion event so related
        // updates coalesce into one submission.
        if is_held(&context.events[0].kind) {
            self.queue.wait_for_more(self.config.hold_wait, &self.stop);
            if self.stop.is_stopped() {
                self.queue.push_front(context);
                return;
            }
        }

        let batch = self.assemble(&context);
        if batch.is_empty() {
            return;
        }

        let Some(credentials) = self.config.credentials.clone() else {
            // No credentials: skip the cycle before any network call.
            debug!("no credentials, skipping batch");
            return;
        };

        match self.submit_with_retry(&batch, &credentials, &context) {
            Ok(outcomes) => self.commit(&batch, &outcomes, &context),
            Err(err) => {
                let mut stats = self.stats.write();
                stats.batches_dropped += 1;
                stats.last_error = Some(err.to_string());
                drop(stats);
                warn!(%err, events = batch.len(), "dropping batch");
                (context.log)(&format!("sync gave up on {} events: {err}", batch.len()));
            }
        }
    }

    /// Marks a beta context synced locally without transmission.
    fn suppress(&self, context: &SyncContext) {
        let ids: Vec<_> = context.events.iter().map(|e| e.id).collect();
        let result = self.store.write(&mut |w| {
            for id in &ids {
                w.mark_synced(*id)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                self.stats.write().events_suppressed += ids.len() as u64;
                debug!(events = ids.len(), "suppressed beta context");
            }
            Err(err) => warn!(%err, "failed to mark suppressed events"),
        }
    }

    /// Builds one batch starting from the leading context, extending
    /// from the queue while compatible.
    fn assemble(&self, leading: &SyncContext) -> Vec<Event> {
        let limit = self.config.batch_limit;
        let mut batch: Vec<Event> = leading
            .events
            .iter()
            .filter(|e| !self.discard.should_discard(e))
            .cloned()
            .collect();

        // An oversized bundle is split; the remainder keeps its place
        // at the head of the queue.
        if batch.len() > limit {
            let remainder = batch.split_off(limit);
            self.queue.push_front(SyncContext::new(
                remainder,
                Arc::clone(&leading.log),
                leading.game_version.clone(),
                leading.game_build.clone(),
            ));
            return batch;
        }

        let Some(first) = batch.first().cloned() else {
            return batch;
        };

        let mut closed = false;
        while !closed && batch.len() < limit {
            let space = limit - batch.len();
            let discard = Arc::clone(&self.discard);
            let popped = self.queue.pop_when(|next| {
                extension_fits(next, leading, &first, &discard, space)
            });

            let Some(next) = popped else { break };
            for event in next.events {
                if discard.should_discard(&event) {
                    continue;
                }
                if is_held(&event.kind) {
                    closed = true;
                }
                batch.push(event);
            }
        }

        batch
    }

    /// Submits with the configured retry budget, waiting the backoff
    /// ladder between attempts.
    fn submit_with_retry(
        &self,
        batch: &[Event],
        credentials: &Credentials,
        context: &SyncContext,
    ) -> SyncResult<Vec<SubmitOutcome>> {
        let policy = &self.config.retry;

        for attempt in 1..=policy.max_attempts {
            if self.stop.is_stopped() {
                return Err(SyncError::Stopped);
            }

            let failure = match self.endpoint.submit_batch(
                batch,
                credentials,
                &self.config.client_version,
                &context.game_version,
                &context.game_build,
            ) {
                Ok(outcomes) if outcomes.len() != batch.len() => SyncError::MalformedResponse(
                    format!("{} outcomes for {} events", outcomes.len(), batch.len()),
                ),
                Ok(outcomes) => match outcomes.iter().position(|o| !o.counts_synced()) {
                    None => return Ok(outcomes),
                    Some(i) if outcomes[i].is_rate_limited() => SyncError::RateLimited,
                    Some(i) => SyncError::transport_retryable(format!(
                        "remote rejected event with status {}",
                        outcomes[i].status
                    )),
                },
                Err(err) => err,
            };

            warn!(attempt, %failure, "batch submission failed");
            self.stats.write().retries += 1;

            if !failure.is_retryable() {
                return Err(failure);
            }
            if self.stop.wait_timeout(policy.delay_for_attempt(attempt)) {
                return Err(SyncError::Stopped);
            }
        }

        Err(SyncError::RetryBudgetExhausted {
            attempts: policy.max_attempts,
        })
    }

    /// Commits a confirmed submission: flips sync flags atomically and
    /// reports the summary through the context's logger.
    fn commit(&self, batch: &[Event], outcomes: &[SubmitOutcome], context: &SyncContext) {
        let result = self.store.write(&mut |w| {
            for (event, outcome) in batch.iter().zip(outcomes) {
                w.mark_synced(event.id)?;
                if let Some(first_discovery) = outcome.first_discovery {
                    w.set_first_discovery(event.id, first_discovery)?;
                }
            }
            Ok(())
        });

        if let Err(err) = result {
            warn!(%err, "failed to commit sync flags");
            self.stats.write().last_error = Some(err.to_string());
            return;
        }

        for (event, outcome) in batch.iter().zip(outcomes) {
            if outcome.is_soft_failure() {
                warn!(event = %event.id, "remote soft failure, counted synced");
            }
        }

        let mut stats = self.stats.write();
        stats.batches_submitted += 1;
        stats.events_synced += batch.len() as u64;
        drop(stats);

        (context.log)(&format!("synced {} events", batch.len()));
    }
}

/// Decides whether the queue's front context may extend the current
/// batch: matching tags, same (profile, origin) as the first batched
/// event, not beta-suppressed, enough room after discard filtering, and
/// any held kind only in the final slot.
fn extension_fits(
    next: &SyncContext,
    leading: &SyncContext,
    first: &Event,
    discard: &DiscardPolicy,
    space: usize,
) -> bool {
    if next.events.is_empty()
        || next.game_version != leading.game_version
        || next.game_build != leading.game_build
        || discard.suppresses(&next.events)
    {
        return false;
    }

    let kept: Vec<&Event> = next
        .events
        .iter()
        .filter(|e| !discard.should_discard(e))
        .collect();
    if kept.len() > space {
        return false;
    }

    if !kept
        .iter()
        .all(|e| e.profile == first.profile && e.origin == first.origin)
    {
        return false;
    }

    // A held kind may only occupy the last slot.
    !kept
        .iter()
        .rev()
        .skip(1)
        .any(|e| is_held(&e.kind))
}
