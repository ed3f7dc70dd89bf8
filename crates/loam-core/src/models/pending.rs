//! Durable pending-update records for the offline queue

use serde::{Deserialize, Serialize};

use super::{now_ms, GroupId, NoteId, NotePatch};

/// A durable record of an unsent partial edit
///
/// At most one record exists per note id. Later edits to the same note
/// collapse into the existing record via [`PendingUpdate::absorb`]: the
/// field set is merged with later values winning, while `base_updated_at`
/// stays pinned to the last server-confirmed timestamp so a replay still
/// trips the server's staleness check if the server moved on meanwhile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    pub note_id: NoteId,
    pub group_id: GroupId,
    pub patch: NotePatch,
    /// The `updated_at` the client believed current when the edit began
    pub base_updated_at: i64,
    /// Local queue timestamp (unix ms)
    pub queued_at: i64,
}

impl PendingUpdate {
    #[must_use]
    pub fn new(note_id: NoteId, group_id: GroupId, patch: NotePatch, base_updated_at: i64) -> Self {
        Self {
            note_id,
            group_id,
            patch,
            base_updated_at,
            queued_at: now_ms(),
        }
    }

    /// Collapse a later offline edit into this record
    pub fn absorb(&mut self, later: &NotePatch) {
        self.patch.absorb(later);
    }
}
