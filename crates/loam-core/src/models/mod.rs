//! Data model for loam

mod conflict;
mod note;
mod pending;
mod presence;

pub use conflict::{ConflictEntry, ConflictResolution};
pub use note::{AttachmentKind, AttachmentSummary, Group, GroupId, Note, NoteId, NotePatch};
pub use pending::PendingUpdate;
pub use presence::{Participant, UserId};

/// Current wall-clock time as unix milliseconds
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
