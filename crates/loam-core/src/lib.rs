//! loam-core - Offline-first synchronization engine for structured notes
//!
//! The client edits locally first: every mutation is applied to in-memory
//! state before any network round-trip, unsent edits are queued durably
//! across restarts, replays happen once connectivity returns, and
//! server-detected collisions surface to the user for an explicit choice.
//! Peer edits arrive over a realtime channel and merge into open documents
//! without discarding in-flight local keystrokes.

pub mod cache;
pub mod coalesce;
pub mod error;
pub mod models;
pub mod realtime;
pub mod remote;
pub mod store;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
pub use store::NoteStore;
