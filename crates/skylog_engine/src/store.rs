//! Local event store and checkpoint contracts.
//!
//! The storage engine itself is external; the sync engine consumes it
//! through these traits. `MemoryEventStore` and `MemoryCheckpointStore`
//! are reference implementations used by the test suites.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use skylog_protocol::{Event, EventId, EventKind, EventOrigin};
use std::collections::HashMap;

/// A new event row to insert during reconciliation.
#[derive(Debug, Clone)]
pub struct NewEventRecord {
    /// Owning profile.
    pub profile: String,
    /// Event kind.
    pub kind: EventKind,
    /// UTC timestamp.
    pub timestamp: DateTime<Utc>,
    /// Star system name.
    pub system_name: String,
    /// Galactic coordinates, when the remote knows them.
    pub coordinates: Option<[f64; 3]>,
    /// Whether the position data came from the remote rather than the
    /// original journal record.
    pub coordinates_remote_sourced: bool,
    /// 64-bit system address.
    pub system_address: Option<u64>,
    /// First-discovery credit.
    pub first_discovery: bool,
    /// Raw payload.
    pub payload: serde_json::Value,
}

/// Mutating operations available inside a transactional unit of work.
pub trait StoreWriter {
    /// Flips the sync-state flag of an existing event to synced.
    fn mark_synced(&mut self, id: EventId) -> StoreResult<()>;

    /// Updates the first-discovery flag of an existing event.
    fn set_first_discovery(&mut self, id: EventId, first_discovery: bool) -> StoreResult<()>;

    /// Inserts a new event row.
    fn insert_event(&mut self, record: NewEventRecord) -> StoreResult<()>;
}

/// The local event store contract consumed by the sync engine.
pub trait EventStore: Send + Sync {
    /// Runs a transactional unit of work.
    ///
    /// Every mutation inside `unit` commits atomically when it returns
    /// `Ok`; any `Err` rolls the whole unit back.
    fn write(
        &self,
        unit: &mut dyn FnMut(&mut dyn StoreWriter) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Loads events of one kind for one profile inside `[from, to]`,
    /// time-ordered.
    fn events_in_range(
        &self,
        profile: &str,
        kind: &EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>>;
}

/// Persisted inbound checkpoint, one value per profile.
pub trait CheckpointStore: Send + Sync {
    /// Loads the checkpoint for a profile, if any.
    fn load(&self, profile: &str) -> StoreResult<Option<DateTime<Utc>>>;

    /// Persists the checkpoint for a profile.
    fn save(&self, profile: &str, checkpoint: DateTime<Utc>) -> StoreResult<()>;
}

/// An in-memory event store for testing.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing event, bypassing the transactional wrapper.
    pub fn seed(&self, event: Event) {
        let mut events = self.events.lock();
        events.push(event);
        events.sort_by_key(|e| e.timestamp);
    }

    /// Returns a snapshot of every stored event.
    pub fn all_events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Looks up one event by ID.
    pub fn event(&self, id: EventId) -> Option<Event> {
        self.events.lock().iter().find(|e| e.id == id).cloned()
    }

    /// Returns the number of events still pending sync.
    pub fn pending_count(&self) -> usize {
        self.events.lock().iter().filter(|e| !e.synced).count()
    }
}

struct MemoryWriter {
    staged: Vec<Event>,
}

impl MemoryWriter {
    fn find_mut(&mut self, id: EventId) -> StoreResult<&mut Event> {
        self.staged
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::UnknownEvent(id.to_string()))
    }
}

impl StoreWriter for MemoryWriter {
    fn mark_synced(&mut self, id: EventId) -> StoreResult<()> {
        self.find_mut(id)?.synced = true;
        Ok(())
    }

    fn set_first_discovery(&mut self, id: EventId, first_discovery: bool) -> StoreResult<()> {
        self.find_mut(id)?.first_discovery = Some(first_discovery);
        Ok(())
    }

    fn insert_event(&mut self, record: NewEventRecord) -> StoreResult<()> {
        let mut event = Event::new(record.kind, record.timestamp, record.profile)
            .with_origin(EventOrigin::External)
            .with_system(record.system_name)
            .with_payload(record.payload);
        event.coordinates = record.coordinates;
        event.coordinates_remote_sourced = record.coordinates_remote_sourced;
        event.system_address = record.system_address;
        event.first_discovery = Some(record.first_discovery);
        // Remote-sourced rows are already known to the remote.
        event.synced = true;

        self.staged.push(event);
        Ok(())
    }
}

impl EventStore for MemoryEventStore {
    fn write(
        &self,
        unit: &mut dyn FnMut(&mut dyn StoreWriter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut events = self.events.lock();
        let mut writer = MemoryWriter {
            staged: events.clone(),
        };

        unit(&mut writer)?;

        writer.staged.sort_by_key(|e| e.timestamp);
        *events = writer.staged;
        Ok(())
    }

    fn events_in_range(
        &self,
        profile: &str,
        kind: &EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>> {
        let mut matches: Vec<Event> = self
            .events
            .lock()
            .iter()
            .filter(|e| {
                e.profile == profile
                    && &e.kind == kind
                    && e.timestamp >= from
                    && e.timestamp <= to
            })
            .cloned()
            .collect();
        matches.sort_by_key(|e| e.timestamp);
        Ok(matches)
    }
}

/// An in-memory checkpoint store for testing.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty checkpoint store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, profile: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.checkpoints.lock().get(profile).copied())
    }

    fn save(&self, profile: &str, checkpoint: DateTime<Utc>) -> StoreResult<()> {
        self.checkpoints.lock().insert(profile.into(), checkpoint);
        Ok(())
    }
}
