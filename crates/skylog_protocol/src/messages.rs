//! Envelope types exchanged with the remote sync endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-event result of a batch submission.
///
/// Status bands follow the remote convention: 100–199 success/info,
/// 429 rate-limited, 500 server-side soft failure (the event is counted
/// as synced but the condition is logged), anything else is a hard
/// failure for the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    /// Status code for this event.
    pub status: u16,
    /// Human-readable detail, when the remote provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when the remote confirms creation of the referenced system,
    /// crediting (or revoking) first discovery for the submitting profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_discovery: Option<bool>,
}

impl SubmitOutcome {
    /// Creates a plain success outcome.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: 100,
            message: None,
            first_discovery: None,
        }
    }

    /// Creates a success outcome carrying a first-discovery confirmation.
    #[must_use]
    pub fn discovered(first_discovery: bool) -> Self {
        Self {
            status: 100,
            message: None,
            first_discovery: Some(first_discovery),
        }
    }

    /// Creates an outcome with an explicit status code.
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            message: None,
            first_discovery: None,
        }
    }

    /// Returns true for the 100–199 success/info band.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (100..=199).contains(&self.status)
    }

    /// Returns true when the remote rate-limited this event.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Returns true for a server-side soft failure.
    #[must_use]
    pub fn is_soft_failure(&self) -> bool {
        self.status == 500
    }

    /// Returns true when the event counts as synced locally.
    ///
    /// Soft failures count: the remote accepted the submission but could
    /// not fully process it, and resubmitting would not help.
    #[must_use]
    pub fn counts_synced(&self) -> bool {
        self.is_success() || self.is_soft_failure()
    }
}

/// Remote-advertised quota state returned with a window query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    /// Total requests allowed in the current window.
    pub limit: u32,
    /// Requests remaining in the current window.
    pub remaining: u32,
    /// Seconds until the window resets.
    pub reset_seconds: u64,
}

impl RateLimitInfo {
    /// Creates rate-limit metadata.
    #[must_use]
    pub const fn new(limit: u32, remaining: u32, reset_seconds: u64) -> Self {
        Self {
            limit,
            remaining,
            reset_seconds,
        }
    }
}

/// A flight record returned by a remote window query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    /// Star system name.
    pub system_name: String,
    /// UTC timestamp of the visit.
    pub timestamp: DateTime<Utc>,
    /// Whether the remote credits this profile with first discovery.
    #[serde(default)]
    pub first_discovery: bool,
    /// Galactic coordinates, when the remote knows them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[f64; 3]>,
    /// 64-bit system address, when the remote knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_address: Option<u64>,
    /// Raw remote payload.
    pub payload: serde_json::Value,
}

impl RemoteEvent {
    /// Creates a remote event with no derived fields.
    pub fn new(system_name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            system_name: system_name.into(),
            timestamp,
            first_discovery: false,
            coordinates: None,
            system_address: None,
            payload: serde_json::Value::Null,
        }
    }

    /// Sets the first-discovery credit.
    #[must_use]
    pub fn with_first_discovery(mut self, first_discovery: bool) -> Self {
        self.first_discovery = first_discovery;
        self
    }

    /// Sets the galactic coordinates.
    #[must_use]
    pub fn with_coordinates(mut self, coordinates: [f64; 3]) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    /// Sets the raw payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// The result of a remote window query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteWindowResult {
    /// Flight records inside the window, oldest first.
    pub events: Vec<RemoteEvent>,
    /// Start of the window the server actually answered for.
    pub window_start: DateTime<Utc>,
    /// End of the window the server actually answered for.
    pub window_end: DateTime<Utc>,
    /// Quota state, when the server advertises it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
}

impl RemoteWindowResult {
    /// Creates a window result.
    pub fn new(
        events: Vec<RemoteEvent>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        Self {
            events,
            window_start,
            window_end,
            rate_limit: None,
        }
    }

    /// Creates an empty window result.
    pub fn empty(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), window_start, window_end)
    }

    /// Attaches rate-limit metadata.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitInfo) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}
