//! Inbound poller: windowed remote queries, adaptive pacing,
//! reconciliation and checkpoint advancement.

use crate::config::SyncConfig;
use crate::endpoint::RemoteEndpoint;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::reconcile;
use crate::stop::StopSignal;
use crate::store::{CheckpointStore, EventStore, NewEventRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use skylog_protocol::{EventKind, RateLimitInfo, RemoteWindowResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ephemeral status callback; fire-and-forget, must not block.
pub type StatusFn = Arc<dyn Fn(&str) + Send + Sync>;

/// The current state of the inbound poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Not started.
    Idle,
    /// Sleeping until the next cycle.
    Waiting,
    /// A window query is in flight.
    Querying,
    /// The stop signal fired.
    Stopped,
}

impl PollerState {
    /// Returns true while the poller loop is alive.
    pub fn is_active(&self) -> bool {
        matches!(self, PollerState::Waiting | PollerState::Querying)
    }
}

/// Computes the delay before the next poll cycle.
///
/// With quota pressure (remaining below half the limit) the remaining
/// reset time is spread across the remaining quota, floored at one
/// second. Otherwise the base cadence applies.
pub fn next_poll_delay(rate: Option<&RateLimitInfo>, cadence: Duration) -> Duration {
    match rate {
        Some(info) if info.remaining * 2 < info.limit => {
            let spread = info.reset_seconds as f64 / f64::from(info.limit - info.remaining);
            Duration::from_secs_f64(spread.max(1.0))
        }
        _ => cadence,
    }
}

/// The single background poller of the inbound path.
///
/// One instance runs per profile. Each cycle sleeps a computed delay,
/// then queries the next remote window once the checkpoint lags far
/// enough behind, reconciles the results against local candidates and
/// advances the persisted checkpoint. All failures are contained: the
/// checkpoint never regresses and the loop never crashes.
pub struct InboundPoller<E, S, C> {
    config: SyncConfig,
    endpoint: Arc<E>,
    store: Arc<S>,
    checkpoints: Arc<C>,
    stop: Arc<StopSignal>,
    status: Option<StatusFn>,
    state: RwLock<PollerState>,
}

impl<E: RemoteEndpoint, S: EventStore, C: CheckpointStore> InboundPoller<E, S, C> {
    /// Creates a poller over shared session state.
    pub fn new(
        config: SyncConfig,
        endpoint: Arc<E>,
        store: Arc<S>,
        checkpoints: Arc<C>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            config,
            endpoint,
            store,
            checkpoints,
            stop,
            status: None,
            state: RwLock::new(PollerState::Idle),
        }
    }

    /// Attaches the ephemeral status callback.
    #[must_use]
    pub fn with_status(mut self, status: StatusFn) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> PollerState {
        *self.state.read()
    }

    fn set_state(&self, state: PollerState) {
        *self.state.write() = state;
    }

    /// Runs the poll loop until the stop signal fires.
    pub fn run(&self) {
        let profile = self.config.profile.clone();
        let window = to_chrono(self.config.poll_window);
        let gate = to_chrono(self.config.poll_gate);

        let mut checkpoint = match self.checkpoints.load(&profile) {
            Ok(Some(persisted)) => persisted,
            Ok(None) => self.default_checkpoint(),
            Err(err) => {
                warn!(%err, "failed to load checkpoint, starting fresh");
                self.default_checkpoint()
            }
        };

        let mut delay = self.config.poll_cadence;
        let mut catch_up_inserts = 0usize;

        loop {
            self.set_state(PollerState::Waiting);
            if self.stop.wait_timeout(delay) {
                break;
            }

            let Some(credentials) = self.config.credentials.clone() else {
                continue;
            };

            let now = Utc::now();
            if now - checkpoint < gate {
                continue;
            }

            let window_end = checkpoint + window;
            self.set_state(PollerState::Querying);

            match self
                .endpoint
                .query_window(&credentials, Some(checkpoint), window_end)
            {
                Ok(result) => match self.apply(&result) {
                    Ok(inserted) => {
                        catch_up_inserts += inserted;

                        // Forward progress even on an empty window.
                        checkpoint = window_end;
                        let caught_up = window_end > now;
                        if caught_up {
                            checkpoint = now;
                        }
                        if let Err(err) = self.checkpoints.save(&profile, checkpoint) {
                            warn!(%err, "failed to persist checkpoint");
                        }

                        if caught_up {
                            if catch_up_inserts > 0 {
                                self.notify(&format!(
                                    "{catch_up_inserts} new flight records from remote"
                                ));
                            }
                            catch_up_inserts = 0;
                        }

                        delay = next_poll_delay(result.rate_limit.as_ref(), self.config.poll_cadence);
                    }
                    Err(err) => {
                        // Skip without advancing; the same window is
                        // re-queried next cycle.
                        warn!(%err, "failed to apply remote window");
                    }
                },
                Err(SyncError::RateLimited) => {
                    debug!("rate limited, skipping cycle");
                }
                Err(err) => {
                    warn!(%err, "window query failed, skipping cycle");
                }
            }
        }

        self.set_state(PollerState::Stopped);
        debug!("inbound poller exiting");
    }

    fn default_checkpoint(&self) -> DateTime<Utc> {
        self.config
            .initial_checkpoint
            .unwrap_or_else(|| Utc::now() - to_chrono(self.config.poll_window))
    }

    /// Reconciles one window and persists the outcome in a single unit
    /// of work. Returns the number of inserted records.
    fn apply(&self, result: &RemoteWindowResult) -> SyncResult<usize> {
        let overlap = to_chrono(self.config.reconcile_overlap);
        let kind = EventKind::new("Jump");

        let candidates = self.store.events_in_range(
            &self.config.profile,
            &kind,
            result.window_start - overlap,
            result.window_end + overlap,
        )?;

        let outcome = reconcile(&result.events, &candidates);
        debug!(
            remote = result.events.len(),
            matched = outcome.matched,
            inserts = outcome.inserts.len(),
            "reconciled remote window"
        );

        if outcome.inserts.is_empty() && outcome.discovery_updates.is_empty() {
            return Ok(0);
        }

        let profile = self.config.profile.clone();
        let inserted = outcome.inserts.len();

        self.store.write(&mut |w| {
            for (id, first_discovery) in &outcome.discovery_updates {
                w.set_first_discovery(*id, *first_discovery)?;
            }
            for record in &outcome.inserts {
                // Position data is remote-sourced when the raw record
                // carried no coordinates of its own.
                let remote_sourced =
                    record.coordinates.is_some() && record.payload.get("coordinates").is_none();
                w.insert_event(NewEventRecord {
                    profile: profile.clone(),
                    kind: kind.clone(),
                    timestamp: record.timestamp,
                    system_name: record.system_name.clone(),
                    coordinates: record.coordinates,
                    coordinates_remote_sourced: remote_sourced,
                    system_address: record.system_address,
                    first_discovery: record.first_discovery,
                    payload: record.payload.clone(),
                })?;
            }
            Ok(())
        })?;

        Ok(inserted)
    }

    fn notify(&self, message: &str) {
        if let Some(status) = &self.status {
            status(message);
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::endpoint::MockEndpoint;
    use crate::store::{MemoryCheckpointStore, MemoryEventStore};
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use skylog_protocol::{Event, RemoteEvent};
    use std::thread;

    fn fast_config() -> SyncConfig {
        SyncConfig::new("JAMESON")
            .with_credentials(Credentials::new("JAMESON", "k3y"))
            .with_poll_cadence(Duration::from_millis(2))
            .with_poll_gate(Duration::ZERO)
            .with_poll_window(Duration::from_secs(600))
    }

    struct Harness {
        endpoint: Arc<MockEndpoint>,
        store: Arc<MemoryEventStore>,
        checkpoints: Arc<MemoryCheckpointStore>,
        stop: Arc<StopSignal>,
        poller: Arc<InboundPoller<MockEndpoint, MemoryEventStore, MemoryCheckpointStore>>,
    }

    fn harness(config: SyncConfig) -> Harness {
        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MemoryEventStore::new());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let stop = Arc::new(StopSignal::new());
        let poller = Arc::new(InboundPoller::new(
            config,
            Arc::clone(&endpoint),
            Arc::clone(&store),
            Arc::clone(&checkpoints),
            Arc::clone(&stop),
        ));
        Harness {
            endpoint,
            store,
            checkpoints,
            stop,
            poller,
        }
    }

    fn run_for(h: &Harness, duration: Duration) {
        let poller = Arc::clone(&h.poller);
        let handle = thread::spawn(move || poller.run());
        thread::sleep(duration);
        h.stop.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn rate_limit_pacing_formula() {
        let cadence = Duration::from_secs(1);

        // Scenario: remaining 90 of 360, reset in 878 s -> ~3252 ms.
        let pressured = RateLimitInfo::new(360, 90, 878);
        let delay = next_poll_delay(Some(&pressured), cadence);
        assert!(delay >= Duration::from_millis(3251));
        assert!(delay <= Duration::from_millis(3253));

        // Healthy quota keeps the base cadence.
        let healthy = RateLimitInfo::new(360, 300, 878);
        assert_eq!(next_poll_delay(Some(&healthy), cadence), cadence);

        // Exactly half is not yet pressure.
        let half = RateLimitInfo::new(360, 180, 878);
        assert_eq!(next_poll_delay(Some(&half), cadence), cadence);

        // Missing headers keep the base cadence.
        assert_eq!(next_poll_delay(None, cadence), cadence);

        // The computed delay never drops below one second.
        let floor = RateLimitInfo::new(100, 10, 10);
        assert_eq!(
            next_poll_delay(Some(&floor), cadence),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn empty_window_advances_checkpoint_by_full_window() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let h = harness(fast_config().with_initial_checkpoint(start));

        run_for(&h, Duration::from_millis(40));

        let requests = h.endpoint.window_requests();
        assert!(!requests.is_empty());
        assert_eq!(
            requests[0],
            (Some(start), start + chrono::Duration::seconds(600))
        );

        // Even with zero results every cycle, the checkpoint moved.
        let persisted = h.checkpoints.load("JAMESON").unwrap().unwrap();
        assert!(persisted >= start + chrono::Duration::seconds(600));
    }

    #[test]
    fn checkpoint_is_monotone_across_error_cycles() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let h = harness(fast_config().with_initial_checkpoint(start));
        h.endpoint
            .push_window_response(Err(SyncError::transport_retryable("down")));
        h.endpoint.push_window_response(Err(SyncError::RateLimited));

        run_for(&h, Duration::from_millis(40));

        // The first two cycles failed; later defaults succeeded. The
        // persisted checkpoint only ever moved forward from `start`.
        let persisted = h.checkpoints.load("JAMESON").unwrap().unwrap();
        assert!(persisted > start);
        let requests = h.endpoint.window_requests();
        for pair in requests.windows(2) {
            assert!(pair[1].0.unwrap() >= pair[0].0.unwrap());
        }
    }

    #[test]
    fn rate_limited_cycle_does_not_advance() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let h = harness(fast_config().with_initial_checkpoint(start));
        for _ in 0..100 {
            h.endpoint.push_window_response(Err(SyncError::RateLimited));
        }

        run_for(&h, Duration::from_millis(30));

        assert!(h.checkpoints.load("JAMESON").unwrap().is_none());
        assert!(!h.endpoint.window_requests().is_empty());
    }

    #[test]
    fn missing_credentials_never_queries() {
        let mut config = fast_config();
        config.credentials = None;
        let h = harness(config);

        run_for(&h, Duration::from_millis(20));

        assert!(h.endpoint.window_requests().is_empty());
        assert_eq!(h.poller.state(), PollerState::Stopped);
    }

    #[test]
    fn fuzzy_match_updates_discovery_instead_of_inserting() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let visit = start + chrono::Duration::seconds(60);

        let local = Event::new("Jump", visit, "JAMESON").with_system("Achenar");
        let id = local.id;

        let h = harness(fast_config().with_initial_checkpoint(start));
        h.store.seed(local);

        let remote = RemoteEvent::new("Achenar", visit + chrono::Duration::hours(1))
            .with_first_discovery(true);
        h.endpoint.push_window_response(Ok(RemoteWindowResult::new(
            vec![remote],
            start,
            start + chrono::Duration::seconds(600),
        )));

        run_for(&h, Duration::from_millis(40));

        assert_eq!(h.store.all_events().len(), 1);
        assert_eq!(h.store.event(id).unwrap().first_discovery, Some(true));
    }

    #[test]
    fn unmatched_remote_event_is_inserted() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let h = harness(fast_config().with_initial_checkpoint(start));

        let remote = RemoteEvent::new("Maia", start + chrono::Duration::seconds(120))
            .with_coordinates([-81.78, -149.44, -343.38]);
        h.endpoint.push_window_response(Ok(RemoteWindowResult::new(
            vec![remote],
            start,
            start + chrono::Duration::seconds(600),
        )));

        run_for(&h, Duration::from_millis(40));

        let events = h.store.all_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].system_name.as_deref(), Some("Maia"));
        assert_eq!(events[0].profile, "JAMESON");
        assert!(events[0].synced);
        assert!(events[0].coordinates_remote_sourced);
    }

    #[test]
    fn catch_up_notifies_once() {
        // Three 600 s windows behind "now", so the loop catches up
        // within a few cycles.
        let start = Utc::now() - chrono::Duration::minutes(30);
        let notifications: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notifications);

        let endpoint = Arc::new(MockEndpoint::new());
        let store = Arc::new(MemoryEventStore::new());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let stop = Arc::new(StopSignal::new());
        let poller = Arc::new(
            InboundPoller::new(
                fast_config().with_initial_checkpoint(start),
                Arc::clone(&endpoint),
                Arc::clone(&store),
                Arc::clone(&checkpoints),
                Arc::clone(&stop),
            )
            .with_status(Arc::new(move |line: &str| sink.lock().push(line.into()))),
        );

        let remote = RemoteEvent::new("Maia", start + chrono::Duration::seconds(30));
        endpoint.push_window_response(Ok(RemoteWindowResult::new(
            vec![remote],
            start,
            start + chrono::Duration::seconds(600),
        )));

        let runner = Arc::clone(&poller);
        let handle = thread::spawn(move || runner.run());
        thread::sleep(Duration::from_millis(60));
        stop.trigger();
        handle.join().unwrap();

        // The insert happened while catching up through old windows;
        // exactly one notification fired when the stream reached "now".
        let lines = notifications.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("1 new flight record"));
    }
}
