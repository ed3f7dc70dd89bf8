//! Edit-coalescing policy
//!
//! Replaces the UI-layer "wait N ms of inactivity, then write" timer with
//! an explicit policy object. The coalescer never reads the wall clock;
//! callers supply `now`, so its interaction with the conflict and offline
//! paths is testable with controlled interleavings.

use std::collections::HashMap;

use crate::models::{NoteId, NotePatch};

/// When buffered edits become due for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavePolicy {
    /// Quiet period after the last keystroke before a write is due (ms)
    pub debounce_ms: i64,
}

impl Default for SavePolicy {
    fn default() -> Self {
        // Matches the editor's autosave cadence
        Self { debounce_ms: 800 }
    }
}

impl SavePolicy {
    #[must_use]
    pub const fn new(debounce_ms: i64) -> Self {
        Self { debounce_ms }
    }

    /// Write on every edit, no quiet period
    #[must_use]
    pub const fn immediate() -> Self {
        Self { debounce_ms: 0 }
    }
}

#[derive(Debug, Clone)]
struct BufferedEdit {
    patch: NotePatch,
    last_edit_at: i64,
}

/// Per-note buffer of not-yet-written edits
#[derive(Debug, Default)]
pub struct EditCoalescer {
    buffered: HashMap<NoteId, BufferedEdit>,
}

impl EditCoalescer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an edit, merging into any edit already buffered for the note
    /// (later values win field-wise)
    pub fn record(&mut self, note_id: NoteId, patch: NotePatch, now: i64) {
        self.buffered
            .entry(note_id)
            .and_modify(|edit| {
                edit.patch.absorb(&patch);
                edit.last_edit_at = now;
            })
            .or_insert(BufferedEdit {
                patch,
                last_edit_at: now,
            });
    }

    /// Drain the notes whose quiet period has elapsed at `now`
    pub fn take_due(&mut self, policy: SavePolicy, now: i64) -> Vec<(NoteId, NotePatch)> {
        let due: Vec<NoteId> = self
            .buffered
            .iter()
            .filter(|(_, edit)| now - edit.last_edit_at >= policy.debounce_ms)
            .map(|(id, _)| *id)
            .collect();

        let mut drained: Vec<(NoteId, NotePatch)> = due
            .into_iter()
            .filter_map(|id| self.buffered.remove(&id).map(|edit| (id, edit.patch)))
            .collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    /// Drain everything regardless of elapsed time (manual save, shutdown)
    pub fn take_all(&mut self) -> Vec<(NoteId, NotePatch)> {
        let mut drained: Vec<(NoteId, NotePatch)> = self
            .buffered
            .drain()
            .map(|(id, edit)| (id, edit.patch))
            .collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn title(text: &str) -> NotePatch {
        NotePatch {
            title: Some(text.to_string()),
            ..NotePatch::default()
        }
    }

    #[test]
    fn test_not_due_before_quiet_period() {
        let mut coalescer = EditCoalescer::new();
        let id = NoteId::new();
        coalescer.record(id, title("a"), 1000);

        assert!(coalescer.take_due(SavePolicy::new(800), 1500).is_empty());
        assert_eq!(coalescer.take_due(SavePolicy::new(800), 1800).len(), 1);
        assert!(coalescer.is_empty());
    }

    #[test]
    fn test_repeated_edits_restart_quiet_period_and_merge() {
        let mut coalescer = EditCoalescer::new();
        let id = NoteId::new();
        coalescer.record(id, title("a"), 1000);
        coalescer.record(id, title("ab"), 1700);

        // 1800 is 800ms after the first edit but only 100ms after the second
        assert!(coalescer.take_due(SavePolicy::new(800), 1800).is_empty());

        let due = coalescer.take_due(SavePolicy::new(800), 2500);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.title.as_deref(), Some("ab"));
    }

    #[test]
    fn test_immediate_policy() {
        let mut coalescer = EditCoalescer::new();
        let id = NoteId::new();
        coalescer.record(id, title("a"), 1000);
        assert_eq!(coalescer.take_due(SavePolicy::immediate(), 1000).len(), 1);
    }

    #[test]
    fn test_take_all_drains_everything() {
        let mut coalescer = EditCoalescer::new();
        coalescer.record(NoteId::new(), title("a"), 1000);
        coalescer.record(NoteId::new(), title("b"), 1001);

        assert_eq!(coalescer.take_all().len(), 2);
        assert!(coalescer.is_empty());
    }
}
