//! Durable cache and pending-queue operations

use libsql::params;
use std::path::Path;

use crate::error::Result;
use crate::models::{Group, GroupId, Note, NoteId, PendingUpdate};

use super::Database;

/// Repository over the three durable tables: `groups`, `notes`, `pending`
pub struct LocalCache {
    db: Database,
}

impl LocalCache {
    /// Open the cache at the given filesystem path
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            db: Database::open(path).await?,
        })
    }

    /// Open an in-memory cache (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory().await?,
        })
    }

    /// Cache a batch of groups, replacing existing records by id
    pub async fn cache_groups(&self, groups: &[Group]) -> Result<()> {
        for group in groups {
            let data = serde_json::to_string(group)?;
            self.db
                .connection()
                .execute(
                    "INSERT OR REPLACE INTO groups (id, data) VALUES (?, ?)",
                    params![group.id.as_str(), data],
                )
                .await?;
        }
        Ok(())
    }

    /// Read back all cached groups
    pub async fn cached_groups(&self) -> Result<Vec<Group>> {
        let mut rows = self
            .db
            .connection()
            .query("SELECT data FROM groups ORDER BY id", ())
            .await?;

        let mut groups = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            groups.push(serde_json::from_str(&data)?);
        }
        Ok(groups)
    }

    /// Cache a batch of notes for a group, replacing existing records by id
    pub async fn cache_notes(&self, group_id: GroupId, notes: &[Note]) -> Result<()> {
        for note in notes {
            let data = serde_json::to_string(note)?;
            self.db
                .connection()
                .execute(
                    "INSERT OR REPLACE INTO notes (id, group_id, data) VALUES (?, ?, ?)",
                    params![note.id.as_str(), group_id.as_str(), data],
                )
                .await?;
        }
        Ok(())
    }

    /// Cache a single note
    pub async fn cache_note(&self, note: &Note) -> Result<()> {
        let data = serde_json::to_string(note)?;
        self.db
            .connection()
            .execute(
                "INSERT OR REPLACE INTO notes (id, group_id, data) VALUES (?, ?, ?)",
                params![note.id.as_str(), note.group_id.as_str(), data],
            )
            .await?;
        Ok(())
    }

    /// Read back all cached notes for a group
    pub async fn cached_notes(&self, group_id: GroupId) -> Result<Vec<Note>> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT data FROM notes WHERE group_id = ? ORDER BY id",
                params![group_id.as_str()],
            )
            .await?;

        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            notes.push(serde_json::from_str(&data)?);
        }
        Ok(notes)
    }

    /// Read back a single cached note
    pub async fn cached_note(&self, id: NoteId) -> Result<Option<Note>> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT data FROM notes WHERE id = ?",
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    /// Drop a note from the cache
    pub async fn remove_cached_note(&self, id: NoteId) -> Result<()> {
        self.db
            .connection()
            .execute("DELETE FROM notes WHERE id = ?", params![id.as_str()])
            .await?;
        Ok(())
    }

    /// Upsert a pending update; replaces any existing record for the note id
    pub async fn queue_pending(&self, update: &PendingUpdate) -> Result<()> {
        let data = serde_json::to_string(update)?;
        self.db
            .connection()
            .execute(
                "INSERT OR REPLACE INTO pending (note_id, group_id, data, queued_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    update.note_id.as_str(),
                    update.group_id.as_str(),
                    data,
                    update.queued_at
                ],
            )
            .await?;
        Ok(())
    }

    /// Fetch the pending update for a note, if any
    pub async fn pending_update(&self, note_id: NoteId) -> Result<Option<PendingUpdate>> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT data FROM pending WHERE note_id = ?",
                params![note_id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    /// All pending updates in queue order
    pub async fn pending_updates(&self) -> Result<Vec<PendingUpdate>> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT data FROM pending ORDER BY queued_at, note_id",
                (),
            )
            .await?;

        let mut updates = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            updates.push(serde_json::from_str(&data)?);
        }
        Ok(updates)
    }

    /// Delete the pending update for a note, if any
    pub async fn remove_pending(&self, note_id: NoteId) -> Result<()> {
        self.db
            .connection()
            .execute(
                "DELETE FROM pending WHERE note_id = ?",
                params![note_id.as_str()],
            )
            .await?;
        Ok(())
    }

    /// Collapse a later offline edit into the queue
    ///
    /// Creates the record when none exists; otherwise merges the patch
    /// field-wise (later values win) without advancing `base_updated_at`.
    pub async fn collapse_pending(&self, update: PendingUpdate) -> Result<PendingUpdate> {
        let merged = match self.pending_update(update.note_id).await? {
            Some(mut existing) => {
                existing.absorb(&update.patch);
                existing
            }
            None => update,
        };
        self.queue_pending(&merged).await?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotePatch;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> LocalCache {
        LocalCache::open_in_memory().await.unwrap()
    }

    fn sample_note(group_id: GroupId) -> Note {
        let mut note = Note::new(group_id, "Cached");
        note.content = json!({
            "type": "doc",
            "content": [{"type": "paragraph", "content": [{"type": "text", "text": "hi"}]}]
        });
        note.plain_preview = "hi".to_string();
        note
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_note_round_trip_preserves_nested_content() {
        let cache = setup().await;
        let group_id = GroupId::new();
        let note = sample_note(group_id);

        cache.cache_note(&note).await.unwrap();
        let read = cache.cached_note(note.id).await.unwrap().unwrap();

        assert_eq!(read, note);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cached_notes_scoped_to_group() {
        let cache = setup().await;
        let group_a = GroupId::new();
        let group_b = GroupId::new();

        cache
            .cache_notes(group_a, &[sample_note(group_a), sample_note(group_a)])
            .await
            .unwrap();
        cache
            .cache_notes(group_b, &[sample_note(group_b)])
            .await
            .unwrap();

        assert_eq!(cache.cached_notes(group_a).await.unwrap().len(), 2);
        assert_eq!(cache.cached_notes(group_b).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_collapse_pending_single_record_per_note() {
        let cache = setup().await;
        let note_id = NoteId::new();
        let group_id = GroupId::new();

        cache
            .collapse_pending(PendingUpdate::new(
                note_id,
                group_id,
                NotePatch {
                    title: Some("Draft".to_string()),
                    ..NotePatch::default()
                },
                1000,
            ))
            .await
            .unwrap();
        cache
            .collapse_pending(PendingUpdate::new(
                note_id,
                group_id,
                NotePatch {
                    title: Some("Final".to_string()),
                    is_pinned: Some(true),
                    ..NotePatch::default()
                },
                9999,
            ))
            .await
            .unwrap();

        let all = cache.pending_updates().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].base_updated_at, 1000);
        assert_eq!(all[0].patch.title.as_deref(), Some("Final"));
        assert_eq!(all[0].patch.is_pinned, Some(true));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_pending_is_idempotent() {
        let cache = setup().await;
        let note_id = NoteId::new();
        cache.remove_pending(note_id).await.unwrap();
        cache.remove_pending(note_id).await.unwrap();
        assert!(cache.pending_update(note_id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_groups_round_trip() {
        let cache = setup().await;
        let group = Group {
            id: GroupId::new(),
            name: "Work".to_string(),
            color: "#22d3ee".to_string(),
            position: 0,
            created_at: 1,
            updated_at: 1,
        };

        cache.cache_groups(std::slice::from_ref(&group)).await.unwrap();
        let read = cache.cached_groups().await.unwrap();
        assert_eq!(read, vec![group]);
    }
}
