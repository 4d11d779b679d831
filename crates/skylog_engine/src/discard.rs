//! Outbound event filtering: discard set, hold set, beta suppression.

use crate::endpoint::RemoteEndpoint;
use parking_lot::Mutex;
use skylog_protocol::{Event, EventKind};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Event kinds never transmitted, compiled in.
///
/// These carry no location or progression data the remote service wants;
/// the remote tier extends this list at runtime.
const PERMANENT_DISCARDS: &[&str] = &[
    "Fileheader",
    "Shutdown",
    "Music",
    "ReceiveText",
    "SendText",
];

/// Event kinds whose flush is delayed so a trailing related event can
/// coalesce into the same submission. A docked status is held the same
/// way even though it is not listed here.
const HOLD_KINDS: &[&str] = &["StartJump", "Undocked"];

/// Returns true when the kind should wait for a companion event before
/// its batch is flushed.
pub fn is_held(kind: &EventKind) -> bool {
    kind.is_docked() || HOLD_KINDS.contains(&kind.name())
}

/// Event-kind exclusion policy for the outbound path.
///
/// Membership is the union of the compiled-in permanent tier and a
/// remote-refreshed tier. Kind names are matched case-insensitively
/// because the remote list is not guaranteed to preserve case.
pub struct DiscardPolicy {
    remote: Mutex<HashSet<String>>,
    refreshed_at: Mutex<Option<Instant>>,
    refresh_interval: Duration,
}

impl DiscardPolicy {
    /// Creates a policy whose remote tier is refreshed at most once per
    /// `refresh_interval`.
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            remote: Mutex::new(HashSet::new()),
            refreshed_at: Mutex::new(None),
            refresh_interval,
        }
    }

    /// Returns true when the event must not be transmitted.
    pub fn should_discard(&self, event: &Event) -> bool {
        let name = event.kind.name();
        if PERMANENT_DISCARDS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(name))
        {
            return true;
        }
        self.remote.lock().contains(&name.to_ascii_lowercase())
    }

    /// Business rule: a context containing any beta-client or beta-save
    /// event is suppressed entirely (dropped without transmission but
    /// marked synced locally).
    pub fn suppresses(&self, events: &[Event]) -> bool {
        events.iter().any(|e| e.beta)
    }

    /// Returns true when the remote tier has never been fetched or the
    /// last refresh attempt is older than the refresh interval.
    pub fn is_stale(&self) -> bool {
        match *self.refreshed_at.lock() {
            Some(at) => at.elapsed() >= self.refresh_interval,
            None => true,
        }
    }

    /// Refreshes the remote tier from the endpoint.
    ///
    /// Failures leave the prior set in force. Both outcomes count as a
    /// refresh attempt, so a failing endpoint is re-asked at most once
    /// per refresh interval.
    pub fn refresh_from(&self, endpoint: &dyn RemoteEndpoint) {
        match endpoint.fetch_discard_list() {
            Ok(kinds) => {
                debug!(count = kinds.len(), "refreshed remote discard set");
                *self.remote.lock() = kinds
                    .into_iter()
                    .map(|k| k.to_ascii_lowercase())
                    .collect();
            }
            Err(err) => {
                warn!(%err, "discard list refresh failed, keeping prior set");
            }
        }
        *self.refreshed_at.lock() = Some(Instant::now());
    }
}
