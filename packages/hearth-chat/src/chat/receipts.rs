//! Read receipts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::validate_message_id;
use crate::conversation::peer_in;
use crate::directory::Identity;
use crate::error::{ChatError, Result};
use crate::protocol::ServerEvent;
use crate::rooms::Room;
use crate::state::ChatState;
use crate::store::{MessageKind, ReadChange, ReadTarget};

/// What a mark-read call should cover. The first field that is set wins:
/// conversation, then explicit ids, then (with `message_type = group`) the
/// whole family group chat.
#[derive(Debug, Clone, Default)]
pub struct MarkReadRequest {
    pub conversation_id: Option<String>,
    pub message_ids: Option<Vec<String>>,
    pub message_type: Option<MessageKind>,
}

#[derive(Debug, Clone)]
pub struct MarkReadOutcome {
    /// Messages whose read set gained the reader.
    pub count: usize,
    pub read_at: DateTime<Utc>,
}

pub fn mark_read(state: &ChatState, reader: &Identity, request: MarkReadRequest) -> Result<MarkReadOutcome> {
    let target = resolve_target(reader, request)?;
    let read_at = Utc::now();
    let changes = state
        .store
        .mark_read(&reader.family_id, &reader.user_id, &target, read_at)?;

    if changes.is_empty() {
        return Ok(MarkReadOutcome { count: 0, read_at });
    }

    let count = changes.len();
    for (room, (kind, conversation_id, ids)) in group_by_room(&reader.family_id, changes) {
        state.rooms.broadcast(
            &room,
            &ServerEvent::MessagesRead {
                conversation_id,
                message_type: kind,
                message_ids: ids,
                user_id: reader.user_id.clone(),
                read_at,
            },
        );
    }
    state.rooms.broadcast(
        &Room::user(&reader.user_id),
        &ServerEvent::UnreadChanged {
            user_id: reader.user_id.clone(),
        },
    );

    tracing::debug!(user_id = reader.user_id.as_str(), count = count, "Messages marked read");
    Ok(MarkReadOutcome { count, read_at })
}

fn resolve_target(reader: &Identity, request: MarkReadRequest) -> Result<ReadTarget> {
    if let Some(key) = request.conversation_id.filter(|k| !k.is_empty()) {
        let peer_id = peer_in(&key, &reader.user_id)
            .ok_or_else(|| ChatError::NotFound("Conversation not found".to_string()))?;
        return Ok(ReadTarget::Conversation { peer_id });
    }

    if let Some(ids) = request.message_ids.filter(|ids| !ids.is_empty()) {
        for id in &ids {
            validate_message_id(id)?;
        }
        return Ok(ReadTarget::Messages(ids));
    }

    if request.message_type == Some(MessageKind::Group) {
        return Ok(ReadTarget::FamilyGroup);
    }

    Err(ChatError::Validation(
        "conversationId or messageIds is required".to_string(),
    ))
}

type RoomBatch = (MessageKind, Option<String>, Vec<String>);

/// One batch per owning room, in a stable order.
fn group_by_room(family_id: &str, changes: Vec<ReadChange>) -> Vec<(Room, RoomBatch)> {
    let mut batches: BTreeMap<(MessageKind, Option<String>), Vec<String>> = BTreeMap::new();
    for change in changes {
        batches
            .entry((change.kind, change.conversation_key))
            .or_default()
            .push(change.message_id);
    }

    batches
        .into_iter()
        .map(|((kind, key), ids)| {
            let room = match (&kind, &key) {
                (MessageKind::Direct, Some(key)) => Room::Direct(key.clone()),
                _ => Room::family(family_id),
            };
            (room, (kind, key, ids))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::delivery::{send_direct, send_group};
    use crate::chat::fixture::{drain, identity, listen, state};

    fn conversation(key: &str) -> MarkReadRequest {
        MarkReadRequest {
            conversation_id: Some(key.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_mark_conversation_read_emits_once() {
        let state = state();
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");
        let dm = send_direct(&state, &alice, "bob", "Hello", None).unwrap();
        let (_, mut rx) = listen(&state, "alice", &[Room::direct("alice", "bob")]);

        let outcome = mark_read(&state, &bob, conversation("alice_bob")).unwrap();
        assert_eq!(outcome.count, 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::MessagesRead {
                conversation_id,
                message_type,
                message_ids,
                user_id,
                ..
            } => {
                assert_eq!(conversation_id.as_deref(), Some("alice_bob"));
                assert_eq!(*message_type, MessageKind::Direct);
                assert_eq!(message_ids, &vec![dm.message.id.clone()]);
                assert_eq!(user_id, "bob");
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        // Second call changes nothing and stays silent
        let outcome = mark_read(&state, &bob, conversation("alice_bob")).unwrap();
        assert_eq!(outcome.count, 0);
        assert!(drain(&mut rx).is_empty());

        let stored = state.store.get(&dm.message.id).unwrap().unwrap();
        assert_eq!(stored.read_by.len(), 1);
    }

    #[test]
    fn test_unread_returns_to_previous_value() {
        let state = state();
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");

        let before = state.store.unread_summary("f1", "bob").unwrap();
        send_direct(&state, &alice, "bob", "ping", None).unwrap();
        assert_eq!(state.store.unread_summary("f1", "bob").unwrap().direct, before.direct + 1);

        mark_read(&state, &bob, conversation("alice_bob")).unwrap();
        assert_eq!(state.store.unread_summary("f1", "bob").unwrap(), before);
    }

    #[test]
    fn test_explicit_ids_split_by_room() {
        let state = state();
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");
        let group = send_group(&state, &alice, "all", None).unwrap();
        let dm = send_direct(&state, &alice, "bob", "just you", None).unwrap();
        let (_, mut family_rx) = listen(&state, "alice", &[Room::family("f1")]);
        let (_, mut dm_rx) = listen(&state, "alice", &[Room::direct("alice", "bob")]);

        let outcome = mark_read(
            &state,
            &bob,
            MarkReadRequest {
                message_ids: Some(vec![group.message.id.clone(), dm.message.id.clone()]),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(outcome.count, 2);

        match &drain(&mut family_rx)[..] {
            [ServerEvent::MessagesRead {
                conversation_id: None,
                message_type: MessageKind::Group,
                message_ids,
                ..
            }] => assert_eq!(message_ids, &vec![group.message.id.clone()]),
            other => panic!("Unexpected events: {:?}", other),
        }
        match &drain(&mut dm_rx)[..] {
            [ServerEvent::MessagesRead { message_ids, .. }] => {
                assert_eq!(message_ids, &vec![dm.message.id.clone()])
            }
            other => panic!("Unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_mark_family_group_read() {
        let state = state();
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");
        send_group(&state, &alice, "one", None).unwrap();
        send_group(&state, &alice, "two", None).unwrap();
        let (_, mut bob_user_rx) = listen(&state, "bob", &[Room::user("bob")]);

        let outcome = mark_read(
            &state,
            &bob,
            MarkReadRequest {
                message_type: Some(MessageKind::Group),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(outcome.count, 2);
        assert_eq!(state.store.unread_summary("f1", "bob").unwrap().group, 0);
        assert!(matches!(
            &drain(&mut bob_user_rx)[..],
            [ServerEvent::UnreadChanged { .. }]
        ));
    }

    #[test]
    fn test_cannot_mark_other_family_messages() {
        let state = state();
        let alice = identity(&state, "alice");
        let carol = identity(&state, "carol");
        let group = send_group(&state, &alice, "family only", None).unwrap();

        let outcome = mark_read(
            &state,
            &carol,
            MarkReadRequest {
                message_ids: Some(vec![group.message.id.clone()]),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(outcome.count, 0);
        assert!(state.store.get(&group.message.id).unwrap().unwrap().read_by.is_empty());
    }

    #[test]
    fn test_foreign_conversation_is_not_found() {
        let state = state();
        let mia = identity(&state, "mia");
        let err = mark_read(&state, &mia, conversation("alice_bob")).unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[test]
    fn test_request_validation() {
        let state = state();
        let bob = identity(&state, "bob");

        let err = mark_read(&state, &bob, MarkReadRequest::default()).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        let err = mark_read(
            &state,
            &bob,
            MarkReadRequest {
                message_ids: Some(vec!["nope".to_string()]),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_concurrent_mark_read_reads_once() {
        let state = state();
        let alice = identity(&state, "alice");
        let bob = identity(&state, "bob");
        for i in 0..5 {
            send_direct(&state, &alice, "bob", &format!("m{}", i), None).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                let bob = bob.clone();
                std::thread::spawn(move || mark_read(&state, &bob, conversation("alice_bob")).unwrap().count)
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 5);

        for message in state.store.direct_messages_involving("f1", "bob").unwrap() {
            assert_eq!(message.read_by.len(), 1);
        }
    }
}
