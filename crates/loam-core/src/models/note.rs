//! Note and group models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::now_ms;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Uuid);

/// A unique identifier for a note group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(Uuid);

macro_rules! uuid_id {
    ($name:ident) => {
        impl $name {
            /// Create a new unique ID using UUID v7
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Get the string representation of this ID
            #[must_use]
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(NoteId);
uuid_id!(GroupId);

/// Attachment media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    File,
}

/// Client-visible attachment metadata
///
/// Internal storage handles are stripped server-side before transmission,
/// so they never appear in this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub filename: String,
    pub size_bytes: i64,
}

/// A structured document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Owning group
    pub group_id: GroupId,
    pub title: String,
    /// Structured content blob (editor document JSON)
    pub content: Value,
    /// Plain-text preview derived from the content
    pub plain_preview: String,
    pub is_pinned: bool,
    /// Soft-delete timestamp (unix ms); `None` means active
    #[serde(default)]
    pub deleted_at: Option<i64>,
    /// Creation timestamp (unix ms)
    pub created_at: i64,
    /// Last update timestamp (unix ms); monotonically non-decreasing
    /// as observed by the server
    pub updated_at: i64,
    #[serde(default)]
    pub attachments: Vec<AttachmentSummary>,
}

impl Note {
    /// Create a new empty note in the given group
    #[must_use]
    pub fn new(group_id: GroupId, title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: NoteId::new(),
            group_id,
            title: title.into(),
            content: Value::Null,
            plain_preview: String::new(),
            is_pinned: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            attachments: Vec::new(),
        }
    }

    /// Apply a partial field set; absent fields are left untouched
    pub fn apply(&mut self, patch: &NotePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(preview) = &patch.plain_preview {
            self.plain_preview = preview.clone();
        }
        if let Some(pinned) = patch.is_pinned {
            self.is_pinned = pinned;
        }
    }

    /// Check whether the note is soft-deleted
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A partial edit to a note
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
}

impl NotePatch {
    /// Patch carrying every user-editable field of a note, used when
    /// re-submitting a conflicted local version against a new base
    #[must_use]
    pub fn from_note(note: &Note) -> Self {
        Self {
            title: Some(note.title.clone()),
            content: Some(note.content.clone()),
            plain_preview: Some(note.plain_preview.clone()),
            is_pinned: Some(note.is_pinned),
        }
    }

    /// Merge a later patch into this one; later values win field-wise
    pub fn absorb(&mut self, later: &Self) {
        if later.title.is_some() {
            self.title = later.title.clone();
        }
        if later.content.is_some() {
            self.content = later.content.clone();
        }
        if later.plain_preview.is_some() {
            self.plain_preview = later.plain_preview.clone();
        }
        if later.is_pinned.is_some() {
            self.is_pinned = later.is_pinned;
        }
    }

    /// Check if the patch carries no fields
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.plain_preview.is_none()
            && self.is_pinned.is_none()
    }
}

/// A note group (folder)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub color: String,
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new(GroupId::new(), "Scratch");
        assert_eq!(note.title, "Scratch");
        assert!(!note.is_deleted());
        assert!(note.created_at > 0);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_apply_partial_patch() {
        let mut note = Note::new(GroupId::new(), "Before");
        note.apply(&NotePatch {
            title: Some("After".to_string()),
            is_pinned: Some(true),
            ..NotePatch::default()
        });
        assert_eq!(note.title, "After");
        assert!(note.is_pinned);
        assert_eq!(note.content, Value::Null);
    }

    #[test]
    fn test_absorb_later_values_win() {
        let mut patch = NotePatch {
            title: Some("first".to_string()),
            content: Some(json!({"v": 1})),
            ..NotePatch::default()
        };
        patch.absorb(&NotePatch {
            title: Some("second".to_string()),
            plain_preview: Some("p".to_string()),
            ..NotePatch::default()
        });
        assert_eq!(patch.title.as_deref(), Some("second"));
        assert_eq!(patch.content, Some(json!({"v": 1})));
        assert_eq!(patch.plain_preview.as_deref(), Some("p"));
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = NotePatch {
            title: Some("t".to_string()),
            ..NotePatch::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({"title": "t"}));
    }

    #[test]
    fn test_note_wire_format_is_camel_case() {
        let note = Note::new(GroupId::new(), "x");
        let value = serde_json::to_value(&note).unwrap();
        assert!(value.get("groupId").is_some());
        assert!(value.get("plainPreview").is_some());
        assert!(value.get("isPinned").is_some());
    }
}
