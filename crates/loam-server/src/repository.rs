//! Note repository implementation

use libsql::{params, Connection, Row, Value};

use loam_core::models::{now_ms, GroupId, Note, NoteId, NotePatch, UserId};
use loam_core::remote::{NoteQuery, NotesPage, Pagination, WriteReply};

use crate::concurrency::is_stale;
use crate::error::{Error, Result};

/// Trait for server-side note storage operations (async)
///
/// Every operation is scoped to the owning user; a note owned by someone
/// else is indistinguishable from a missing one. Authorization itself is
/// an external collaborator.
#[allow(async_fn_in_trait)]
pub trait NoteRepository {
    /// Create a note in a group
    async fn create(&self, owner: UserId, group_id: GroupId, patch: &NotePatch) -> Result<Note>;

    /// Get a note by id
    async fn get(&self, owner: UserId, id: NoteId) -> Result<Option<Note>>;

    /// List a group's active notes, pinned first then newest, paginated
    async fn list(&self, owner: UserId, group_id: GroupId, query: &NoteQuery)
        -> Result<NotesPage>;

    /// Apply a partial edit last-writer-wins, running the
    /// optimistic-concurrency check against `client_base`
    async fn patch(
        &self,
        owner: UserId,
        id: NoteId,
        patch: &NotePatch,
        client_base: Option<i64>,
    ) -> Result<WriteReply>;

    /// Soft-delete a note
    async fn delete(&self, owner: UserId, id: NoteId) -> Result<()>;

    /// Clear a note's soft-delete timestamp
    async fn restore(&self, owner: UserId, id: NoteId) -> Result<Note>;
}

/// libSQL implementation of `NoteRepository`
pub struct LibSqlNoteRepository<'a> {
    conn: &'a Connection,
}

const NOTE_COLUMNS: &str =
    "id, group_id, title, content, plain_preview, is_pinned, deleted_at, created_at, updated_at, attachments";

impl<'a> LibSqlNoteRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a note from a database row
    fn parse_note(row: &Row) -> Result<Note> {
        let id: String = row.get(0)?;
        let group_id: String = row.get(1)?;
        let content: String = row.get(3)?;
        let attachments: String = row.get(9)?;
        let deleted_at = match row.get_value(6)? {
            Value::Integer(ts) => Some(ts),
            _ => None,
        };

        Ok(Note {
            id: id
                .parse()
                .map_err(|_| Error::InvalidInput(format!("invalid note id: {id}")))?,
            group_id: group_id
                .parse()
                .map_err(|_| Error::InvalidInput(format!("invalid group id: {group_id}")))?,
            title: row.get(2)?,
            content: serde_json::from_str(&content)?,
            plain_preview: row.get(4)?,
            is_pinned: row.get::<i32>(5)? != 0,
            deleted_at,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            attachments: serde_json::from_str(&attachments)?,
        })
    }

    async fn write_note(&self, owner: UserId, note: &Note) -> Result<()> {
        let deleted_at = note.deleted_at.map_or(Value::Null, Value::Integer);
        self.conn
            .execute(
                "INSERT OR REPLACE INTO notes
                 (id, group_id, owner_id, title, content, plain_preview, is_pinned,
                  deleted_at, created_at, updated_at, attachments)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    note.id.as_str(),
                    note.group_id.as_str(),
                    owner.as_str(),
                    note.title.clone(),
                    serde_json::to_string(&note.content)?,
                    note.plain_preview.clone(),
                    i32::from(note.is_pinned),
                    deleted_at,
                    note.created_at,
                    note.updated_at,
                    serde_json::to_string(&note.attachments)?
                ],
            )
            .await?;
        Ok(())
    }

    async fn count(
        &self,
        owner: UserId,
        group_id: GroupId,
        search: Option<&str>,
    ) -> Result<u64> {
        let mut rows = if let Some(search) = search {
            let pattern = format!("%{search}%");
            self.conn
                .query(
                    "SELECT COUNT(*) FROM notes
                     WHERE owner_id = ? AND group_id = ? AND deleted_at IS NULL
                       AND (title LIKE ? OR plain_preview LIKE ?)",
                    params![owner.as_str(), group_id.as_str(), pattern.clone(), pattern],
                )
                .await?
        } else {
            self.conn
                .query(
                    "SELECT COUNT(*) FROM notes
                     WHERE owner_id = ? AND group_id = ? AND deleted_at IS NULL",
                    params![owner.as_str(), group_id.as_str()],
                )
                .await?
        };

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl NoteRepository for LibSqlNoteRepository<'_> {
    async fn create(&self, owner: UserId, group_id: GroupId, patch: &NotePatch) -> Result<Note> {
        let mut note = Note::new(group_id, "");
        note.apply(patch);
        self.write_note(owner, &note).await?;
        Ok(note)
    }

    async fn get(&self, owner: UserId, id: NoteId) -> Result<Option<Note>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ? AND owner_id = ?"),
                params![id.as_str(), owner.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_note(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        owner: UserId,
        group_id: GroupId,
        query: &NoteQuery,
    ) -> Result<NotesPage> {
        let limit = query.limit.max(1);
        let page = query.page.max(1);
        let offset = i64::from(page - 1) * i64::from(limit);

        let mut rows = if let Some(search) = &query.search {
            let pattern = format!("%{search}%");
            self.conn
                .query(
                    &format!(
                        "SELECT {NOTE_COLUMNS} FROM notes
                         WHERE owner_id = ? AND group_id = ? AND deleted_at IS NULL
                           AND (title LIKE ? OR plain_preview LIKE ?)
                         ORDER BY is_pinned DESC, updated_at DESC
                         LIMIT ? OFFSET ?"
                    ),
                    params![
                        owner.as_str(),
                        group_id.as_str(),
                        pattern.clone(),
                        pattern,
                        i64::from(limit),
                        offset
                    ],
                )
                .await?
        } else {
            self.conn
                .query(
                    &format!(
                        "SELECT {NOTE_COLUMNS} FROM notes
                         WHERE owner_id = ? AND group_id = ? AND deleted_at IS NULL
                         ORDER BY is_pinned DESC, updated_at DESC
                         LIMIT ? OFFSET ?"
                    ),
                    params![
                        owner.as_str(),
                        group_id.as_str(),
                        i64::from(limit),
                        offset
                    ],
                )
                .await?
        };

        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(Self::parse_note(&row)?);
        }

        let total = self
            .count(owner, group_id, query.search.as_deref())
            .await?;
        let total_pages = u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);

        Ok(NotesPage {
            notes,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages,
            },
        })
    }

    async fn patch(
        &self,
        owner: UserId,
        id: NoteId,
        patch: &NotePatch,
        client_base: Option<i64>,
    ) -> Result<WriteReply> {
        let stored = self
            .get(owner, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let conflict = is_stale(stored.updated_at, client_base);
        let previous = conflict.then(|| stored.clone());
        if conflict {
            tracing::debug!(
                "Stale write for note {id}: client base {client_base:?} < stored {}",
                stored.updated_at
            );
        }

        // The write proceeds either way (last-writer-wins); updated_at
        // advances strictly so staleness stays observable
        let mut note = stored;
        note.apply(patch);
        note.updated_at = now_ms().max(note.updated_at + 1);
        self.write_note(owner, &note).await?;

        Ok(WriteReply {
            note,
            conflict,
            previous,
        })
    }

    async fn delete(&self, owner: UserId, id: NoteId) -> Result<()> {
        let now = now_ms();
        let rows = self
            .conn
            .execute(
                "UPDATE notes SET deleted_at = ? WHERE id = ? AND owner_id = ? AND deleted_at IS NULL",
                params![now, id.as_str(), owner.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn restore(&self, owner: UserId, id: NoteId) -> Result<Note> {
        let rows = self
            .conn
            .execute(
                "UPDATE notes SET deleted_at = NULL WHERE id = ? AND owner_id = ?",
                params![id.as_str(), owner.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get(owner, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
