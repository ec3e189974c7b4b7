//! Delivery engine: validate, persist, then broadcast.
//!
//! The room's sequencer is held from the insert until the broadcast has been
//! queued on every subscriber, so two sends to the same conversation reach
//! every member in the order they were persisted.

use crate::directory::Identity;
use crate::error::{ChatError, Result};
use crate::protocol::{MessageView, ServerEvent};
use crate::rooms::Room;
use crate::state::ChatState;
use crate::store::{Audience, NewMessage};

/// Longest accepted client message id.
const MAX_CLIENT_MESSAGE_ID_LEN: usize = 128;

/// Result of a send.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: MessageView,
    /// The send repeated a recent client message id. Nothing was stored or
    /// broadcast; `message` is the earlier copy.
    pub duplicate: bool,
}

/// Post to the sender's family group chat.
pub fn send_group(
    state: &ChatState,
    sender: &Identity,
    body: &str,
    client_message_id: Option<String>,
) -> Result<Delivery> {
    let body = validate_body(body, state.config.max_body_chars)?;
    let client_message_id = validate_client_message_id(client_message_id)?;
    let room = Room::family(&sender.family_id);

    let new = NewMessage {
        family_id: sender.family_id.clone(),
        sender_id: sender.user_id.clone(),
        audience: Audience::Group,
        body,
        client_message_id,
    };
    let delivery = persist_and_broadcast(state, &room, new, |message| {
        ServerEvent::MessageReceived { message }
    })?;

    if !delivery.duplicate {
        tracing::info!(
            family_id = sender.family_id.as_str(),
            sender = sender.user_id.as_str(),
            message_id = delivery.message.id.as_str(),
            "Group message sent"
        );
    }
    Ok(delivery)
}

/// Send a direct message to another member of the sender's family.
pub fn send_direct(
    state: &ChatState,
    sender: &Identity,
    recipient_id: &str,
    body: &str,
    client_message_id: Option<String>,
) -> Result<Delivery> {
    let recipient_id = recipient_id.trim();
    if recipient_id.is_empty() {
        return Err(ChatError::Validation("Recipient is required".to_string()));
    }
    if recipient_id == sender.user_id {
        return Err(ChatError::Validation(
            "Cannot send a message to yourself".to_string(),
        ));
    }
    let body = validate_body(body, state.config.max_body_chars)?;
    let client_message_id = validate_client_message_id(client_message_id)?;
    let recipient = state
        .directory
        .member_of(&sender.family_id, recipient_id)
        .ok_or_else(|| ChatError::Forbidden("Recipient is not in your family".to_string()))?;

    let room = Room::direct(&sender.user_id, &recipient.user_id);
    let new = NewMessage {
        family_id: sender.family_id.clone(),
        sender_id: sender.user_id.clone(),
        audience: Audience::Direct {
            recipient_id: recipient.user_id.clone(),
        },
        body,
        client_message_id,
    };
    let delivery = persist_and_broadcast(state, &room, new, |message| ServerEvent::DmReceived {
        message,
    })?;
    if delivery.duplicate {
        return Ok(delivery);
    }

    // Badge invalidation for the recipient, wherever they are in the app.
    let user_room = Room::user(&recipient.user_id);
    state.rooms.broadcast(
        &user_room,
        &ServerEvent::DmNotification {
            message_id: delivery.message.id.clone(),
            conversation_id: delivery.message.conversation_id.clone().unwrap_or_default(),
            sender_id: sender.user_id.clone(),
            sender_name: sender.display_name.clone(),
        },
    );
    state.rooms.broadcast(
        &user_room,
        &ServerEvent::UnreadChanged {
            user_id: recipient.user_id.clone(),
        },
    );
    state.push.direct_message(&recipient, &delivery.message);

    tracing::info!(
        family_id = sender.family_id.as_str(),
        sender = sender.user_id.as_str(),
        recipient = recipient.user_id.as_str(),
        message_id = delivery.message.id.as_str(),
        "Direct message sent"
    );
    Ok(delivery)
}

fn persist_and_broadcast(
    state: &ChatState,
    room: &Room,
    new: NewMessage,
    event: impl FnOnce(MessageView) -> ServerEvent,
) -> Result<Delivery> {
    let sequencer = state.rooms.sequencer(room);
    let _ordered = sequencer.lock();

    let inserted = state.store.insert(new, state.config.dedupe_window())?;
    let message = MessageView::render(&inserted.message, &state.directory);

    if inserted.duplicate {
        tracing::debug!(
            message_id = message.id.as_str(),
            room = %room,
            "Duplicate send ignored"
        );
    } else {
        state.rooms.broadcast(room, &event(message.clone()));
    }

    Ok(Delivery {
        message,
        duplicate: inserted.duplicate,
    })
}

fn validate_body(body: &str, max_chars: usize) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("Message cannot be empty".to_string()));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ChatError::Validation(format!(
            "Message cannot exceed {} characters",
            max_chars
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_client_message_id(id: Option<String>) -> Result<Option<String>> {
    let Some(id) = id else {
        return Ok(None);
    };
    let id = id.trim();
    if id.is_empty() {
        return Ok(None);
    }
    if id.len() > MAX_CLIENT_MESSAGE_ID_LEN {
        return Err(ChatError::Validation("Client message id is too long".to_string()));
    }
    Ok(Some(id.to_string()))
}
