//! Local journal event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a journal event.
///
/// Event IDs are immutable and assigned at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a fresh random event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt:{}", self.0)
    }
}

/// Where an event entered the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventOrigin {
    /// Read from the player journal on disk.
    Journal,
    /// Imported from an external source (manual entry, third-party tool).
    External,
}

/// The kind of a journal event, identified by its wire name.
///
/// Kind names are case-preserving; comparisons are exact. Policy layers
/// that accept remote-supplied name lists normalize case themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKind(String);

impl EventKind {
    /// Creates a kind from its wire name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the wire name of this kind.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns true for completed hyperspace jumps, the kind the inbound
    /// path reconciles against remote flight records.
    #[must_use]
    pub fn is_jump(&self) -> bool {
        self.0 == "Jump"
    }

    /// Returns true for the docked-status kind.
    #[must_use]
    pub fn is_docked(&self) -> bool {
        self.0 == "Docked"
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A single journal event as stored locally.
///
/// The identity fields (`id`, `timestamp`, `kind`, `origin`, `profile`)
/// are immutable after ingest; `synced` and `first_discovery` are the
/// mutable sync-state flags the engine maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Immutable event ID.
    pub id: EventId,
    /// UTC timestamp from the journal line.
    pub timestamp: DateTime<Utc>,
    /// Event kind.
    pub kind: EventKind,
    /// Where the event entered the store.
    pub origin: EventOrigin,
    /// Owning profile name.
    pub profile: String,
    /// Whether the event has been confirmed by the remote service.
    pub synced: bool,
    /// Whether the event was produced by a beta client or beta save.
    #[serde(default)]
    pub beta: bool,
    /// Star system name, when the event carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    /// Galactic coordinates, when known locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[f64; 3]>,
    /// Whether the position data came from the remote service rather
    /// than the original journal record.
    #[serde(default)]
    pub coordinates_remote_sourced: bool,
    /// 64-bit system address, when the event carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_address: Option<u64>,
    /// First-discovery credit, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_discovery: Option<bool>,
    /// Raw journal payload.
    pub payload: serde_json::Value,
}

impl Event {
    /// Creates a pending event with no derived fields.
    pub fn new(
        kind: impl Into<EventKind>,
        timestamp: DateTime<Utc>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            timestamp,
            kind: kind.into(),
            origin: EventOrigin::Journal,
            profile: profile.into(),
            synced: false,
            beta: false,
            system_name: None,
            coordinates: None,
            coordinates_remote_sourced: false,
            system_address: None,
            first_discovery: None,
            payload: serde_json::Value::Null,
        }
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: EventOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the system name.
    #[must_use]
    pub fn with_system(mut self, name: impl Into<String>) -> Self {
        self.system_name = Some(name.into());
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

    /// Marks the event as produced by a beta client or beta save.
    #[must_use]
    pub fn with_beta(mut self, beta: bool) -> Self {
        self.beta = beta;
        self
    }
}
