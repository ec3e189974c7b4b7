//! Deletion manager.
//!
//! Delete-for-everyone tombstones a message for all viewers and tells the
//! owning room. Delete-for-me only hides it from the caller and is never
//! broadcast. Moderators can additionally purge a message outright.

use chrono::Utc;

use super::validate_message_id;
use crate::directory::Identity;
use crate::error::{ChatError, Result};
use crate::protocol::{MessageView, ServerEvent};
use crate::rooms::Room;
use crate::state::ChatState;
use crate::store::{Message, MessageKind};

/// The room a message was originally delivered to.
fn owning_room(message: &Message) -> Room {
    match (message.kind, message.conversation_key.as_deref()) {
        (MessageKind::Direct, Some(key)) => Room::Direct(key.to_string()),
        _ => Room::family(&message.family_id),
    }
}

/// Sender-only, one-way deletion of a message's content.
pub fn delete_for_everyone(state: &ChatState, actor: &Identity, message_id: &str) -> Result<MessageView> {
    validate_message_id(message_id)?;
    let message = state.store.delete_for_everyone(
        &actor.family_id,
        &actor.user_id,
        message_id,
        Utc::now(),
    )?;

    state.rooms.broadcast(
        &owning_room(&message),
        &ServerEvent::MessageDeletedForEveryone {
            message_id: message.id.clone(),
            message_type: Some(message.kind),
            conversation_id: message.conversation_key.clone(),
        },
    );
    // The recipient's unread count drops if they hadn't read it yet.
    if let Some(recipient) = message.recipient_id.as_deref() {
        if !message.is_read_by(recipient) {
            state.rooms.broadcast(
                &Room::user(recipient),
                &ServerEvent::UnreadChanged {
                    user_id: recipient.to_string(),
                },
            );
        }
    }

    tracing::info!(
        message_id = message_id,
        actor = actor.user_id.as_str(),
        "Message deleted for everyone"
    );
    Ok(MessageView::render(&message, &state.directory))
}

/// Hide a message from the caller's own views.
pub fn delete_for_me(state: &ChatState, actor: &Identity, message_id: &str) -> Result<()> {
    validate_message_id(message_id)?;
    state
        .store
        .delete_for_me(&actor.family_id, &actor.user_id, message_id, Utc::now())?;

    tracing::debug!(
        message_id = message_id,
        actor = actor.user_id.as_str(),
        "Message deleted for user"
    );
    Ok(())
}

/// Moderator-only physical removal of a message in the moderator's family.
pub fn purge(state: &ChatState, actor: &Identity, message_id: &str) -> Result<()> {
    if !actor.is_moderator() {
        return Err(ChatError::Forbidden(
            "Only moderators can remove messages".to_string(),
        ));
    }
    validate_message_id(message_id)?;

    let message = state
        .store
        .get(message_id)?
        .filter(|m| m.family_id == actor.family_id)
        .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))?;
    if !state.store.purge(&actor.family_id, message_id)? {
        return Err(ChatError::NotFound("Message not found".to_string()));
    }

    state.rooms.broadcast(
        &owning_room(&message),
        &ServerEvent::MessageDeletedForEveryone {
            message_id: message.id.clone(),
            message_type: Some(message.kind),
            conversation_id: message.conversation_key.clone(),
        },
    );

    tracing::info!(
        message_id = message_id,
        moderator = actor.user_id.as_str(),
        "Message purged"
    );
    Ok(())
}
