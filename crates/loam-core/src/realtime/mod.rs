//! Realtime bridge
//!
//! One logical channel ("room") per note id. Inbound peer events are
//! merged straight into the document sync store's in-memory state,
//! bypassing the pending queue and the optimistic-concurrency path;
//! outbound events go through an [`EventSink`] so the socket substrate
//! stays an external collaborator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Note, NoteId, NotePatch, Participant, UserId};
use crate::remote::RemoteApi;
use crate::store::NoteStore;

/// Metadata fields a peer may broadcast; content never rides a meta event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
}

impl MetaUpdate {
    fn into_patch(self) -> NotePatch {
        NotePatch {
            title: self.title,
            content: None,
            plain_preview: self.plain_preview,
            is_pinned: self.is_pinned,
        }
    }
}

/// Wire events on a note's channel, tagged with the protocol event names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RealtimeEvent {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join { note_id: NoteId },
    #[serde(rename = "note:content", rename_all = "camelCase")]
    Content {
        note_id: NoteId,
        content: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plain_preview: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_at: Option<i64>,
    },
    #[serde(rename = "note:meta", rename_all = "camelCase")]
    Meta { note_id: NoteId, update: MetaUpdate },
    #[serde(rename = "note:presence", rename_all = "camelCase")]
    Presence { note_id: NoteId, user: Participant },
    #[serde(rename = "note:leave", rename_all = "camelCase")]
    Leave { note_id: NoteId, user_id: UserId },
}

/// Outbound event transport
pub trait EventSink {
    fn emit(&mut self, event: RealtimeEvent);
}

/// Collects events; handy for tests and for draining into a socket loop
impl EventSink for Vec<RealtimeEvent> {
    fn emit(&mut self, event: RealtimeEvent) {
        self.push(event);
    }
}

/// What an inbound event did to local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Content,
    Meta,
    Presence,
    /// Echo of our own edit, an unknown note, or a server-side-only event
    Ignored,
}

/// Per-client bridge between the socket channel and the sync store
pub struct RealtimeBridge<S> {
    sink: S,
    me: Participant,
    open: Option<NoteId>,
}

impl<S: EventSink> RealtimeBridge<S> {
    pub const fn new(sink: S, me: Participant) -> Self {
        Self {
            sink,
            me,
            open: None,
        }
    }

    /// Subscribe to a note's room and announce presence
    pub fn open_note<R: RemoteApi>(&mut self, store: &mut NoteStore<R>, id: NoteId) {
        if self.open.is_some() {
            self.close_note(store);
        }
        self.open = Some(id);
        store.presence_join(id, self.me.clone());
        self.sink.emit(RealtimeEvent::Join { note_id: id });
        self.sink.emit(RealtimeEvent::Presence {
            note_id: id,
            user: self.me.clone(),
        });
    }

    /// Remove our own presence entry; called on unmount and on disconnect
    pub fn close_note<R: RemoteApi>(&mut self, store: &mut NoteStore<R>) {
        if let Some(id) = self.open.take() {
            store.presence_leave(id, self.me.user_id);
            self.sink.emit(RealtimeEvent::Leave {
                note_id: id,
                user_id: self.me.user_id,
            });
        }
    }

    /// Merge an inbound event into the sync store
    pub fn handle<R: RemoteApi>(
        &mut self,
        store: &mut NoteStore<R>,
        event: RealtimeEvent,
    ) -> Applied {
        match event {
            RealtimeEvent::Join { .. } => Applied::Ignored,
            RealtimeEvent::Content {
                note_id,
                content,
                plain_preview,
                updated_at,
            } => {
                if store.apply_content_broadcast(
                    note_id,
                    &content,
                    plain_preview.as_deref(),
                    updated_at,
                ) {
                    Applied::Content
                } else {
                    Applied::Ignored
                }
            }
            RealtimeEvent::Meta { note_id, update } => {
                if store.apply_meta_broadcast(note_id, &update.into_patch()) {
                    Applied::Meta
                } else {
                    Applied::Ignored
                }
            }
            RealtimeEvent::Presence { note_id, user } => {
                if user.user_id == self.me.user_id {
                    Applied::Ignored
                } else {
                    store.presence_join(note_id, user);
                    Applied::Presence
                }
            }
            RealtimeEvent::Leave { note_id, user_id } => {
                store.presence_leave(note_id, user_id);
                Applied::Presence
            }
        }
    }

    /// Broadcast a note's content after a successful local save
    pub fn broadcast_content(&mut self, note: &Note) {
        self.sink.emit(RealtimeEvent::Content {
            note_id: note.id,
            content: note.content.clone(),
            plain_preview: Some(note.plain_preview.clone()),
            updated_at: Some(note.updated_at),
        });
    }

    /// Broadcast a metadata change (title/pin/preview)
    pub fn broadcast_meta(&mut self, note_id: NoteId, update: MetaUpdate) {
        self.sink.emit(RealtimeEvent::Meta { note_id, update });
    }

    #[must_use]
    pub const fn open_note_id(&self) -> Option<NoteId> {
        self.open
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::models::{Group, GroupId, Note};
    use crate::remote::{
        NoteQuery, NotesPage, RemoteError, RemoteResult, WriteReply,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Remote that always fails as unreachable; realtime merges never
    /// touch the network
    struct OfflineRemote;

    impl RemoteApi for OfflineRemote {
        async fn patch_note(
            &self,
            _id: NoteId,
            _patch: &NotePatch,
            _base: Option<i64>,
        ) -> RemoteResult<WriteReply> {
            Err(RemoteError::Unreachable("offline".to_string()))
        }

        async fn create_note(&self, _group_id: GroupId, _patch: &NotePatch) -> RemoteResult<Note> {
            Err(RemoteError::Unreachable("offline".to_string()))
        }

        async fn fetch_note(&self, _id: NoteId) -> RemoteResult<Note> {
            Err(RemoteError::Unreachable("offline".to_string()))
        }

        async fn list_notes(
            &self,
            _group_id: GroupId,
            _query: &NoteQuery,
        ) -> RemoteResult<NotesPage> {
            Err(RemoteError::Unreachable("offline".to_string()))
        }

        async fn delete_note(&self, _id: NoteId) -> RemoteResult<()> {
            Err(RemoteError::Unreachable("offline".to_string()))
        }

        async fn restore_note(&self, _id: NoteId) -> RemoteResult<Note> {
            Err(RemoteError::Unreachable("offline".to_string()))
        }

        async fn list_groups(&self) -> RemoteResult<Vec<Group>> {
            Err(RemoteError::Unreachable("offline".to_string()))
        }
    }

    async fn store_with_cached_note() -> (NoteStore<OfflineRemote>, NoteId, GroupId) {
        let group_id = GroupId::new();
        let mut note = Note::new(group_id, "Shared");
        note.content = json!({"rev": 0});

        let cache = LocalCache::open_in_memory().await.unwrap();
        cache.cache_note(&note).await.unwrap();

        let mut store = NoteStore::new(OfflineRemote, cache);
        // Unreachable fetch hydrates memory from the cache
        store
            .fetch_notes(group_id, &NoteQuery::default())
            .await
            .unwrap();
        (store, note.id, group_id)
    }

    fn me() -> Participant {
        Participant {
            user_id: UserId::new(),
            name: "Me".to_string(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_announces_join_and_presence() {
        let (mut store, id, _) = store_with_cached_note().await;
        let mut bridge = RealtimeBridge::new(Vec::new(), me());

        bridge.open_note(&mut store, id);

        assert_eq!(bridge.open_note_id(), Some(id));
        assert_eq!(store.participants(id).len(), 1);
        assert_eq!(
            bridge.sink()[0],
            RealtimeEvent::Join { note_id: id }
        );
        assert!(matches!(
            bridge.sink()[1],
            RealtimeEvent::Presence { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_removes_own_presence() {
        let (mut store, id, _) = store_with_cached_note().await;
        let mut bridge = RealtimeBridge::new(Vec::new(), me());

        bridge.open_note(&mut store, id);
        bridge.close_note(&mut store);

        assert_eq!(bridge.open_note_id(), None);
        assert!(store.participants(id).is_empty());
        assert!(matches!(
            bridge.sink().last(),
            Some(RealtimeEvent::Leave { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn content_event_overwrites_differing_document() {
        let (mut store, id, _) = store_with_cached_note().await;
        let mut bridge = RealtimeBridge::new(Vec::new(), me());

        let applied = bridge.handle(
            &mut store,
            RealtimeEvent::Content {
                note_id: id,
                content: json!({"rev": 7}),
                plain_preview: Some("seven".to_string()),
                updated_at: Some(5000),
            },
        );

        assert_eq!(applied, Applied::Content);
        let note = store.note(id).unwrap();
        assert_eq!(note.content, json!({"rev": 7}));
        assert_eq!(note.plain_preview, "seven");
        assert_eq!(note.updated_at, 5000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identical_content_event_is_ignored() {
        let (mut store, id, _) = store_with_cached_note().await;
        let mut bridge = RealtimeBridge::new(Vec::new(), me());

        let applied = bridge.handle(
            &mut store,
            RealtimeEvent::Content {
                note_id: id,
                content: json!({"rev": 0}),
                plain_preview: None,
                updated_at: None,
            },
        );

        assert_eq!(applied, Applied::Ignored);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn own_presence_echo_is_ignored() {
        let (mut store, id, _) = store_with_cached_note().await;
        let myself = me();
        let mut bridge = RealtimeBridge::new(Vec::new(), myself.clone());
        bridge.open_note(&mut store, id);

        let applied = bridge.handle(
            &mut store,
            RealtimeEvent::Presence {
                note_id: id,
                user: myself,
            },
        );

        assert_eq!(applied, Applied::Ignored);
        assert_eq!(store.participants(id).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn meta_event_merges_field_wise() {
        let (mut store, id, _) = store_with_cached_note().await;
        let mut bridge = RealtimeBridge::new(Vec::new(), me());

        let applied = bridge.handle(
            &mut store,
            RealtimeEvent::Meta {
                note_id: id,
                update: MetaUpdate {
                    is_pinned: Some(true),
                    ..MetaUpdate::default()
                },
            },
        );

        assert_eq!(applied, Applied::Meta);
        let note = store.note(id).unwrap();
        assert!(note.is_pinned);
        assert_eq!(note.title, "Shared");
    }

    #[test]
    fn events_serialize_with_protocol_names() {
        let event = RealtimeEvent::Content {
            note_id: NoteId::new(),
            content: json!({"a": 1}),
            plain_preview: None,
            updated_at: Some(9),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "note:content");
        assert!(value.get("noteId").is_some());
        assert_eq!(value["updatedAt"], 9);

        let round: RealtimeEvent = serde_json::from_value(value).unwrap();
        assert_eq!(round, event);
    }
}
