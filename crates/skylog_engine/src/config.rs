//! Configuration for the sync engine.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Remote service credentials for one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Profile name as registered with the remote service.
    pub name: String,
    /// API key issued by the remote service.
    pub api_key: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
        }
    }
}

/// Configuration for one sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Owning profile name.
    pub profile: String,
    /// Remote credentials; without them every network cycle is skipped.
    pub credentials: Option<Credentials>,
    /// Client identification sent with every submission.
    pub client_version: String,
    /// Maximum events per submitted batch.
    pub batch_limit: usize,
    /// How long a held leading event waits for a companion.
    pub hold_wait: Duration,
    /// How long the worker drains an empty queue before going idle.
    pub idle_wait: Duration,
    /// Politeness delay between batches, regardless of outcome.
    pub batch_spacing: Duration,
    /// Minimum checkpoint lag before the poller issues a query.
    pub poll_gate: Duration,
    /// Length of the requested inbound window.
    pub poll_window: Duration,
    /// Base cadence between poll cycles when no quota pressure applies.
    pub poll_cadence: Duration,
    /// Candidate overlap applied on both sides of the reconciled window.
    pub reconcile_overlap: Duration,
    /// Maximum age of the remote discard set before it is refreshed.
    pub discard_refresh: Duration,
    /// Checkpoint to assume for a profile with no persisted checkpoint.
    pub initial_checkpoint: Option<DateTime<Utc>>,
    /// Retry policy for batch submission.
    pub retry: RetryPolicy,
}

impl SyncConfig {
    /// Creates a configuration with production timings.
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            credentials: None,
            client_version: concat!("skylog ", env!("CARGO_PKG_VERSION")).into(),
            batch_limit: 200,
            hold_wait: Duration::from_secs(20),
            idle_wait: Duration::from_secs(120),
            batch_spacing: Duration::from_millis(100),
            poll_gate: Duration::from_secs(15 * 60),
            poll_window: Duration::from_secs(7 * 24 * 60 * 60),
            poll_cadence: Duration::from_secs(1),
            reconcile_overlap: Duration::from_secs(24 * 60 * 60),
            discard_refresh: Duration::from_secs(120 * 60),
            initial_checkpoint: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the batch size limit.
    #[must_use]
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Sets the hold wait.
    #[must_use]
    pub fn with_hold_wait(mut self, wait: Duration) -> Self {
        self.hold_wait = wait;
        self
    }

    /// Sets the idle drain wait.
    #[must_use]
    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    /// Sets the politeness delay between batches.
    #[must_use]
    pub fn with_batch_spacing(mut self, spacing: Duration) -> Self {
        self.batch_spacing = spacing;
        self
    }

    /// Sets the poll gate.
    #[must_use]
    pub fn with_poll_gate(mut self, gate: Duration) -> Self {
        self.poll_gate = gate;
        self
    }

    /// Sets the poll window length.
    #[must_use]
    pub fn with_poll_window(mut self, window: Duration) -> Self {
        self.poll_window = window;
        self
    }

    /// Sets the base poll cadence.
    #[must_use]
    pub fn with_poll_cadence(mut self, cadence: Duration) -> Self {
        self.poll_cadence = cadence;
        self
    }

    /// Sets the checkpoint assumed for a fresh profile.
    #[must_use]
    pub fn with_initial_checkpoint(mut self, checkpoint: DateTime<Utc>) -> Self {
        self.initial_checkpoint = Some(checkpoint);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Retry policy for batch submission.
///
/// The policy is a pure description: `delay_for_attempt` has no side
/// effects and no randomness, so the exact backoff ladder is testable.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of submission attempts per batch.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Multiplier applied per subsequent failure.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            cap,
        }
    }

    /// Creates a policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            cap: Duration::ZERO,
        }
    }

    /// Returns the delay to wait after the given failed attempt
    /// (1-indexed). Attempt 0 yields no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = self.initial_delay.as_secs_f64()
            * self.multiplier.powi(attempt.saturating_sub(1) as i32);

        Duration::from_secs_f64(delay.min(self.cap.as_secs_f64()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(30),
            multiplier: 2.0,
            cap: Duration::from_secs(8 * 60),
        }
    }
}
