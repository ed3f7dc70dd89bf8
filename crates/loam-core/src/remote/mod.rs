//! Remote API client: the thin seam between the sync store and the network
//!
//! The sync store is generic over [`RemoteApi`] so tests can substitute a
//! scripted fake for the wire. [`http::HttpRemoteApi`] is the production
//! implementation.

mod http;

pub use http::HttpRemoteApi;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Group, GroupId, Note, NoteId, NotePatch};

/// Structured failures from the remote API
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Entity absent or not owned by the caller
    #[error("Not found: {0}")]
    NotFound(String),
    /// Request rejected as malformed
    #[error("Invalid request: {0}")]
    Validation(String),
    /// Server answered with a non-success status
    #[error("API error: {message} ({status})")]
    Api { status: u16, message: String },
    /// No network or no server response; triggers offline queueing
    #[error("Unreachable: {0}")]
    Unreachable(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Response to a note write
///
/// `conflict` is a flag on a *successful* response, never an error: the
/// write was committed last-writer-wins, and `previous` carries the
/// pre-write server snapshot iff the flag is set so the client can show
/// the user what the write overrode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReply {
    pub note: Note,
    #[serde(default)]
    pub conflict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Note>,
}

/// Query parameters for listing a group's notes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteQuery {
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for NoteQuery {
    fn default() -> Self {
        Self {
            search: None,
            page: 1,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// One page of a group's notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotesPage {
    pub notes: Vec<Note>,
    pub pagination: Pagination,
}

/// Network operations the sync engine depends on
#[allow(async_fn_in_trait)]
pub trait RemoteApi {
    /// `PATCH note/{id}` carrying the partial field set and the client's
    /// base timestamp for the server's staleness check
    async fn patch_note(
        &self,
        id: NoteId,
        patch: &NotePatch,
        base_updated_at: Option<i64>,
    ) -> RemoteResult<WriteReply>;

    /// `POST group/{id}/notes`
    async fn create_note(&self, group_id: GroupId, patch: &NotePatch) -> RemoteResult<Note>;

    /// `GET note/{id}`
    async fn fetch_note(&self, id: NoteId) -> RemoteResult<Note>;

    /// `GET group/{id}/notes?query=&page=&limit=`
    async fn list_notes(&self, group_id: GroupId, query: &NoteQuery) -> RemoteResult<NotesPage>;

    /// `DELETE note/{id}` (soft delete)
    async fn delete_note(&self, id: NoteId) -> RemoteResult<()>;

    /// `POST note/{id}/restore`
    async fn restore_note(&self, id: NoteId) -> RemoteResult<Note>;

    /// `GET groups`
    async fn list_groups(&self) -> RemoteResult<Vec<Group>>;
}
