//! Document sync store
//!
//! Owns the in-memory authoritative client state for notes and the
//! mutation protocol: optimistic local updates, the durable offline
//! queue, replay on reconnect, and explicit conflict resolution.
//!
//! Execution is single-threaded cooperative: methods take `&mut self`
//! and every map mutation between awaits is atomic from other tasks'
//! perspective. The suspension points are exactly the remote calls and
//! the durable-storage reads/writes.

use std::collections::HashMap;

use serde_json::Value;

use crate::cache::LocalCache;
use crate::coalesce::{EditCoalescer, SavePolicy};
use crate::error::{Error, Result};
use crate::models::{
    now_ms, ConflictEntry, ConflictResolution, Group, GroupId, Note, NoteId, NotePatch,
    Participant, PendingUpdate, UserId,
};
use crate::remote::{NoteQuery, RemoteApi, RemoteError, WriteReply};

/// Per-note sync state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Clean,
    /// Local edit applied, write in flight
    Dirty,
    /// Server reported a collision; awaiting user resolution
    Conflicted,
    /// Edit durably queued, awaiting connectivity
    QueuedOffline,
}

/// Result of a write that reached the server
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Server adopted the write cleanly
    Saved(Note),
    /// Server committed the write but flagged it stale; the pair awaits
    /// the user's choice
    Conflicted(ConflictEntry),
}

/// Result of a conflict resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Resolved(Note),
    /// Re-submission collided again; the old entry was replaced
    Conflicted(ConflictEntry),
    /// The conflict no longer existed (cleared by a racing sync cycle)
    AlreadyResolved,
}

/// Summary of one queue drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub conflicted: usize,
    /// Entries dropped on a definitive non-retryable server answer
    pub dropped: usize,
    /// Entries left queued because the server became unreachable mid-drain
    pub remaining: usize,
}

/// In-memory authoritative client state, wired to an injected remote
/// client and the persistent local cache
pub struct NoteStore<R> {
    remote: R,
    cache: LocalCache,
    policy: SavePolicy,
    coalescer: EditCoalescer,
    notes: HashMap<NoteId, Note>,
    conflicts: HashMap<NoteId, ConflictEntry>,
    presence: HashMap<NoteId, Vec<Participant>>,
    states: HashMap<NoteId, SyncState>,
}

impl<R: RemoteApi> NoteStore<R> {
    pub fn new(remote: R, cache: LocalCache) -> Self {
        Self::with_policy(remote, cache, SavePolicy::default())
    }

    pub fn with_policy(remote: R, cache: LocalCache, policy: SavePolicy) -> Self {
        Self {
            remote,
            cache,
            policy,
            coalescer: EditCoalescer::new(),
            notes: HashMap::new(),
            conflicts: HashMap::new(),
            presence: HashMap::new(),
            states: HashMap::new(),
        }
    }

    /// Apply a partial edit optimistically and attempt the remote write
    ///
    /// The merged record is visible to readers before the network round
    /// trip. On an unreachable server the edit is durably queued and
    /// [`Error::Unreachable`] is returned so the UI can use non-alarming
    /// messaging; [`Error::Storage`] means the queue itself could not be
    /// persisted and the edit lives only in memory.
    pub async fn update(&mut self, id: NoteId, patch: NotePatch) -> Result<SaveOutcome> {
        let existing = self.known_note(id).await?;
        let base = existing.updated_at;

        let mut local = existing.clone();
        local.apply(&patch);
        local.updated_at = now_ms();
        self.notes.insert(id, local.clone());
        self.states.insert(id, SyncState::Dirty);

        match self.remote.patch_note(id, &patch, Some(base)).await {
            Ok(reply) => Ok(self.adopt_reply(id, reply, local).await),
            Err(RemoteError::Unreachable(reason)) => {
                self.queue_offline(&local, patch, base).await?;
                Err(Error::Unreachable(reason))
            }
            Err(error) => {
                // The server refused the write outright, so readers must not
                // keep seeing the optimistic merge
                self.notes.insert(id, existing);
                self.states.insert(id, SyncState::Clean);
                Err(error.into())
            }
        }
    }

    /// Replay all durable pending updates in queue order
    ///
    /// Strictly sequential: never two in-flight writes for the same note
    /// id. An entry is removed only on a definitive server response; an
    /// unreachable server stops the drain and keeps the rest queued.
    pub async fn sync_pending(&mut self) -> Result<SyncReport> {
        let pending = self
            .cache
            .pending_updates()
            .await
            .map_err(|error| Error::Storage(error.to_string()))?;

        let total = pending.len();
        let mut report = SyncReport::default();

        for (index, entry) in pending.into_iter().enumerate() {
            let id = entry.note_id;
            match self
                .remote
                .patch_note(id, &entry.patch, Some(entry.base_updated_at))
                .await
            {
                Ok(reply) => {
                    let local = self.local_snapshot(id, &entry, &reply);
                    match self.adopt_reply(id, reply, local).await {
                        SaveOutcome::Saved(_) => report.synced += 1,
                        SaveOutcome::Conflicted(_) => report.conflicted += 1,
                    }
                }
                Err(RemoteError::Unreachable(reason)) => {
                    report.remaining = total - index;
                    tracing::debug!(
                        "Server still unreachable, keeping {} pending update(s): {reason}",
                        report.remaining
                    );
                    break;
                }
                Err(error) => {
                    // Definitive answer (not found, rejected input): retrying
                    // can never succeed, so the entry is dropped
                    tracing::warn!("Dropping pending update for note {id}: {error}");
                    if let Err(storage) = self.cache.remove_pending(id).await {
                        tracing::warn!("Failed to drop pending update for note {id}: {storage}");
                    }
                    report.dropped += 1;
                }
            }
        }

        if report != SyncReport::default() {
            tracing::info!(
                synced = report.synced,
                conflicted = report.conflicted,
                dropped = report.dropped,
                remaining = report.remaining,
                "Pending queue drained"
            );
        }
        Ok(report)
    }

    /// Refresh a group's notes from the server, falling back to the
    /// cached copies when unreachable (stale-but-available reads)
    pub async fn fetch_notes(&mut self, group_id: GroupId, query: &NoteQuery) -> Result<Vec<Note>> {
        match self.remote.list_notes(group_id, query).await {
            Ok(page) => {
                self.notes.retain(|_, note| note.group_id != group_id);
                for note in &page.notes {
                    self.notes.insert(note.id, note.clone());
                }
                if let Err(error) = self.cache.cache_notes(group_id, &page.notes).await {
                    tracing::warn!("Failed to cache notes for group {group_id}: {error}");
                }
                Ok(page.notes)
            }
            Err(RemoteError::Unreachable(reason)) => {
                let cached = self.cache.cached_notes(group_id).await.unwrap_or_default();
                if cached.is_empty() {
                    return Err(Error::Unreachable(reason));
                }
                tracing::debug!(
                    "Serving {} stale cached note(s) for group {group_id}",
                    cached.len()
                );
                for note in &cached {
                    // Don't clobber optimistic in-memory edits with stale rows
                    self.notes.entry(note.id).or_insert_with(|| note.clone());
                }
                Ok(cached)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Fetch a single note, falling back to the cache when unreachable
    pub async fn fetch_note(&mut self, id: NoteId) -> Result<Note> {
        match self.remote.fetch_note(id).await {
            Ok(note) => {
                if let Err(error) = self.cache.cache_note(&note).await {
                    tracing::warn!("Failed to cache note {id}: {error}");
                }
                self.notes.insert(id, note.clone());
                Ok(note)
            }
            Err(RemoteError::Unreachable(reason)) => {
                if let Some(note) = self.notes.get(&id) {
                    return Ok(note.clone());
                }
                match self.cache.cached_note(id).await {
                    Ok(Some(note)) => {
                        self.notes.insert(id, note.clone());
                        Ok(note)
                    }
                    _ => Err(Error::Unreachable(reason)),
                }
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Refresh the group list, falling back to cached groups when unreachable
    pub async fn fetch_groups(&mut self) -> Result<Vec<Group>> {
        match self.remote.list_groups().await {
            Ok(groups) => {
                if let Err(error) = self.cache.cache_groups(&groups).await {
                    tracing::warn!("Failed to cache groups: {error}");
                }
                Ok(groups)
            }
            Err(RemoteError::Unreachable(reason)) => {
                let cached = self.cache.cached_groups().await.unwrap_or_default();
                if cached.is_empty() {
                    Err(Error::Unreachable(reason))
                } else {
                    Ok(cached)
                }
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Create a note on the server and adopt it locally
    ///
    /// Creation is not queueable offline; only edits to existing notes are.
    pub async fn create_note(&mut self, group_id: GroupId, patch: NotePatch) -> Result<Note> {
        let note = self.remote.create_note(group_id, &patch).await?;
        if let Err(error) = self.cache.cache_note(&note).await {
            tracing::warn!("Failed to cache created note {}: {error}", note.id);
        }
        self.notes.insert(note.id, note.clone());
        Ok(note)
    }

    /// Soft-delete a note on the server and forget it locally
    pub async fn delete_note(&mut self, id: NoteId) -> Result<()> {
        self.remote.delete_note(id).await?;
        self.notes.remove(&id);
        self.conflicts.remove(&id);
        self.states.remove(&id);
        if let Err(error) = self.cache.remove_cached_note(id).await {
            tracing::warn!("Failed to evict cached note {id}: {error}");
        }
        if let Err(error) = self.cache.remove_pending(id).await {
            tracing::warn!("Failed to clear pending update for note {id}: {error}");
        }
        Ok(())
    }

    /// Restore a soft-deleted note
    pub async fn restore_note(&mut self, id: NoteId) -> Result<Note> {
        let note = self.remote.restore_note(id).await?;
        if let Err(error) = self.cache.cache_note(&note).await {
            tracing::warn!("Failed to cache restored note {id}: {error}");
        }
        self.notes.insert(id, note.clone());
        Ok(note)
    }

    /// Resolve a detected collision with an explicit user choice
    ///
    /// Idempotent: resolving an id with no outstanding conflict is a
    /// no-op, because a racing sync cycle may have cleared it first.
    pub async fn resolve_conflict(
        &mut self,
        id: NoteId,
        strategy: ConflictResolution,
    ) -> Result<ResolutionOutcome> {
        let Some(entry) = self.conflicts.remove(&id) else {
            return Ok(ResolutionOutcome::AlreadyResolved);
        };

        match strategy {
            ConflictResolution::UseRemote => {
                self.notes.insert(id, entry.remote.clone());
                if let Err(error) = self.cache.cache_note(&entry.remote).await {
                    tracing::warn!("Failed to cache resolved note {id}: {error}");
                }
                if let Err(error) = self.cache.remove_pending(id).await {
                    tracing::warn!("Failed to clear pending update for note {id}: {error}");
                }
                self.states.insert(id, SyncState::Clean);
                Ok(ResolutionOutcome::Resolved(entry.remote))
            }
            ConflictResolution::KeepLocal => {
                let patch = NotePatch::from_note(&entry.local);
                // Re-submit against the server's current timestamp, which is
                // the post-write note adopted when the conflict was recorded
                let base = self
                    .notes
                    .get(&id)
                    .map_or(entry.remote.updated_at, |note| note.updated_at);

                match self.remote.patch_note(id, &patch, Some(base)).await {
                    Ok(reply) => match self.adopt_reply(id, reply, entry.local.clone()).await {
                        SaveOutcome::Saved(note) => Ok(ResolutionOutcome::Resolved(note)),
                        SaveOutcome::Conflicted(renewed) => {
                            Ok(ResolutionOutcome::Conflicted(renewed))
                        }
                    },
                    Err(RemoteError::Unreachable(reason)) => {
                        // Keep the pair around so the user can retry once online
                        self.conflicts.insert(id, entry);
                        self.states.insert(id, SyncState::Conflicted);
                        Err(Error::Unreachable(reason))
                    }
                    Err(error) => {
                        self.conflicts.insert(id, entry);
                        self.states.insert(id, SyncState::Conflicted);
                        Err(error.into())
                    }
                }
            }
        }
    }

    /// Buffer a keystroke-granularity edit under the coalescing policy
    pub fn buffer_edit(&mut self, id: NoteId, patch: NotePatch, now: i64) {
        self.coalescer.record(id, patch, now);
    }

    /// Write out every buffered edit whose quiet period elapsed at `now`
    pub async fn flush_due(&mut self, now: i64) -> Vec<(NoteId, Result<SaveOutcome>)> {
        let due = self.coalescer.take_due(self.policy, now);
        let mut results = Vec::with_capacity(due.len());
        for (id, patch) in due {
            let outcome = self.update(id, patch).await;
            results.push((id, outcome));
        }
        results
    }

    /// Write out every buffered edit regardless of elapsed time
    pub async fn flush_all(&mut self) -> Vec<(NoteId, Result<SaveOutcome>)> {
        let due = self.coalescer.take_all();
        let mut results = Vec::with_capacity(due.len());
        for (id, patch) in due {
            let outcome = self.update(id, patch).await;
            results.push((id, outcome));
        }
        results
    }

    /// Merge an inbound realtime content broadcast into the in-memory note
    ///
    /// Structural identity with the current content means the broadcast is
    /// an echo and is ignored. A differing payload overwrites content,
    /// preview, and timestamp directly, with no conflict detection; this
    /// can clobber an unsent local edit in memory (the durable queue entry
    /// is unaffected and will still be replayed).
    pub fn apply_content_broadcast(
        &mut self,
        id: NoteId,
        content: &Value,
        plain_preview: Option<&str>,
        updated_at: Option<i64>,
    ) -> bool {
        let Some(note) = self.notes.get_mut(&id) else {
            return false;
        };
        if note.content == *content {
            return false;
        }
        if self.states.get(&id) == Some(&SyncState::QueuedOffline) {
            tracing::debug!("Realtime broadcast overwrote a queued offline edit for note {id}");
        }
        note.content = content.clone();
        if let Some(preview) = plain_preview {
            note.plain_preview = preview.to_string();
        }
        note.updated_at = updated_at.unwrap_or_else(now_ms);
        true
    }

    /// Merge an inbound metadata broadcast field-wise; content never rides
    /// a meta event
    pub fn apply_meta_broadcast(&mut self, id: NoteId, update: &NotePatch) -> bool {
        let Some(note) = self.notes.get_mut(&id) else {
            return false;
        };
        if let Some(title) = &update.title {
            note.title = title.clone();
        }
        if let Some(preview) = &update.plain_preview {
            note.plain_preview = preview.clone();
        }
        if let Some(pinned) = update.is_pinned {
            note.is_pinned = pinned;
        }
        true
    }

    /// Add or refresh a participant in a note's presence set
    pub fn presence_join(&mut self, note_id: NoteId, participant: Participant) {
        let entries = self.presence.entry(note_id).or_default();
        entries.retain(|entry| entry.user_id != participant.user_id);
        entries.push(participant);
    }

    /// Remove a participant from a note's presence set
    pub fn presence_leave(&mut self, note_id: NoteId, user_id: UserId) {
        if let Some(entries) = self.presence.get_mut(&note_id) {
            entries.retain(|entry| entry.user_id != user_id);
            if entries.is_empty() {
                self.presence.remove(&note_id);
            }
        }
    }

    #[must_use]
    pub fn participants(&self, note_id: NoteId) -> &[Participant] {
        self.presence.get(&note_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    #[must_use]
    pub fn notes_in(&self, group_id: GroupId) -> Vec<&Note> {
        self.notes
            .values()
            .filter(|note| note.group_id == group_id)
            .collect()
    }

    #[must_use]
    pub fn conflict(&self, id: NoteId) -> Option<&ConflictEntry> {
        self.conflicts.get(&id)
    }

    #[must_use]
    pub fn sync_state(&self, id: NoteId) -> SyncState {
        self.states.get(&id).copied().unwrap_or_default()
    }

    /// The persistent local store backing this sync store
    #[must_use]
    pub const fn local_cache(&self) -> &LocalCache {
        &self.cache
    }

    async fn known_note(&mut self, id: NoteId) -> Result<Note> {
        if let Some(note) = self.notes.get(&id) {
            return Ok(note.clone());
        }
        if let Ok(Some(note)) = self.cache.cached_note(id).await {
            self.notes.insert(id, note.clone());
            return Ok(note);
        }
        Err(Error::NotFound(id.to_string()))
    }

    /// Adopt a definitive server reply as the new truth
    async fn adopt_reply(&mut self, id: NoteId, reply: WriteReply, local: Note) -> SaveOutcome {
        if let Err(error) = self.cache.cache_note(&reply.note).await {
            tracing::warn!("Failed to cache note {id}: {error}");
        }
        if let Err(error) = self.cache.remove_pending(id).await {
            tracing::warn!("Failed to clear pending update for note {id}: {error}");
        }
        self.notes.insert(id, reply.note.clone());

        if reply.conflict {
            let remote = reply.previous.unwrap_or_else(|| reply.note.clone());
            let entry = ConflictEntry {
                local,
                remote,
                detected_at: now_ms(),
            };
            self.conflicts.insert(id, entry.clone());
            self.states.insert(id, SyncState::Conflicted);
            SaveOutcome::Conflicted(entry)
        } else {
            self.states.insert(id, SyncState::Clean);
            SaveOutcome::Saved(reply.note)
        }
    }

    async fn queue_offline(&mut self, local: &Note, patch: NotePatch, base: i64) -> Result<()> {
        let id = local.id;
        let update = PendingUpdate::new(id, local.group_id, patch, base);
        let queued = self
            .cache
            .collapse_pending(update)
            .await
            .map_err(|error| Error::Storage(error.to_string()))?;
        if let Err(error) = self.cache.cache_note(local).await {
            tracing::warn!("Failed to cache optimistic note {id}: {error}");
        }
        self.states.insert(id, SyncState::QueuedOffline);
        tracing::debug!(
            "Queued offline update for note {id} (base {})",
            queued.base_updated_at
        );
        Ok(())
    }

    /// The client's version at the moment a replayed collision is detected:
    /// the in-memory optimistic record when present, otherwise the server's
    /// pre-write snapshot with the queued patch reapplied
    fn local_snapshot(&self, id: NoteId, entry: &PendingUpdate, reply: &WriteReply) -> Note {
        let mut base = self.notes.get(&id).cloned().unwrap_or_else(|| {
            reply
                .previous
                .clone()
                .unwrap_or_else(|| reply.note.clone())
        });
        base.apply(&entry.patch);
        base
    }
}
