//! # Skylog Sync Engine
//!
//! Bidirectional journal synchronization between a local event store
//! and a remote exploration service.
//!
//! This crate provides:
//! - Outbound queue and background worker (batching, hold coalescing,
//!   retry with exponential backoff)
//! - Discard policy (compiled-in + remote-refreshed exclusion sets)
//! - Inbound poller (windowed queries, adaptive rate-limit pacing,
//!   checkpoint advancement)
//! - Timestamp-fuzzy reconciliation tolerant of daylight-saving drift
//! - Store and endpoint trait contracts with in-memory reference
//!   implementations for tests
//!
//! ## Architecture
//!
//! A [`SyncSession`] owns one producer queue with a single consumer
//! worker, plus one independent inbound poller. Both loops observe a
//! shared [`StopSignal`] at every suspension point.
//!
//! ## Key Invariants
//!
//! - Events for one profile reach the remote in enqueue order
//! - A batch never exceeds 200 events or mixes profile/build/version
//! - The inbound checkpoint never regresses
//! - An event is marked synced only after a confirmed submission
//!   covering it (beta suppression is the single deliberate exception)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod discard;
mod endpoint;
mod error;
mod poller;
mod queue;
mod reconcile;
mod session;
mod stop;
mod store;
mod worker;

pub use config::{Credentials, RetryPolicy, SyncConfig};
pub use discard::{is_held, DiscardPolicy};
pub use endpoint::{MockEndpoint, RecordedSubmission, RemoteEndpoint};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use poller::{next_poll_delay, InboundPoller, PollerState, StatusFn};
pub use queue::{LogFn, OutboundQueue, SyncContext};
pub use reconcile::{reconcile, ReconcileOutcome};
pub use session::SyncSession;
pub use stop::StopSignal;
pub use store::{
    CheckpointStore, EventStore, MemoryCheckpointStore, MemoryEventStore, NewEventRecord,
    StoreWriter,
};
pub use worker::{OutboundWorker, SyncStats, WorkerState};
