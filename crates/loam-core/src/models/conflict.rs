//! Conflict snapshots awaiting user resolution

use serde::{Deserialize, Serialize};

use super::Note;

/// Ephemeral local/remote pair recorded when the server reports a collision
///
/// `local` is the client's version at the moment the collision was detected;
/// `remote` is the server's authoritative pre-write snapshot, i.e. what the
/// client's write overrode. The entry lives only in memory and is dropped
/// once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub local: Note,
    pub remote: Note,
    /// Detection timestamp (unix ms)
    pub detected_at: i64,
}

/// User-facing resolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Discard local intent and adopt the server's version
    UseRemote,
    /// Re-submit the local version against the server's current timestamp
    KeepLocal,
}
