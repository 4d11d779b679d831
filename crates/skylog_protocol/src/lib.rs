//! # Skylog Sync Protocol
//!
//! Wire types and JSON envelope for the skylog sync engine.
//!
//! This crate provides:
//! - `Event`: a local journal event with sync state
//! - `EventKind` / `EventOrigin`: event classification
//! - `SubmitOutcome`: per-event result of a batch submission
//! - `RemoteEvent` / `RemoteWindowResult`: records returned by a window query
//! - `RateLimitInfo`: remote-advertised quota state
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod event;
mod messages;

pub use event::{Event, EventId, EventKind, EventOrigin};
pub use messages::{RateLimitInfo, RemoteEvent, RemoteWindowResult, SubmitOutcome};
