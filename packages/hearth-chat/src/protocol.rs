//! Socket protocol.
//!
//! One JSON object per WebSocket text frame, tagged by `"type"`. Variant
//! names are kebab-case (`send-dm`, `messages-read`), fields camelCase.
//! Anything that doesn't parse into a variant is rejected at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::{Directory, UserSummary};
use crate::store::{Message, MessageKind, ReadReceipt};

// ── Client → Server ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Subscribe to the family's group chat.
    JoinFamilyChat { family_id: String },

    /// Subscribe to a direct conversation. One of the two users must be the
    /// caller.
    JoinDmRoom { user_id1: String, user_id2: String },

    /// Unsubscribe from a direct conversation (e.g. when it is closed).
    LeaveDmRoom { user_id1: String, user_id2: String },

    /// Subscribe to the caller's own notification channel.
    JoinUserRoom { user_id: String },

    /// Post to the family group chat.
    SendMessage {
        family_id: String,
        sender_id: String,
        /// Ignored; the name is resolved server-side.
        #[serde(default)]
        sender_name: Option<String>,
        message: String,
        #[serde(default)]
        client_message_id: Option<String>,
    },

    /// Send a direct message to another family member.
    SendDm {
        family_id: String,
        sender_id: String,
        recipient_id: String,
        message: String,
        #[serde(default)]
        client_message_id: Option<String>,
    },

    /// Record that the caller has seen messages.
    MarkRead {
        user_id: String,
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        message_ids: Option<Vec<String>>,
        #[serde(default)]
        message_type: Option<MessageKind>,
    },

    Ping,
}

// ── Server → Client ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Sent once per connection, after the derived rooms were joined.
    Registered { user_id: String, family_id: String },

    Joined { room: String },

    Left { room: String },

    /// A new group message.
    MessageReceived { message: MessageView },

    /// A new direct message.
    DmReceived { message: MessageView },

    /// Acknowledges a send to the sending connection only.
    MessageSent {
        client_message_id: Option<String>,
        message: MessageView,
    },

    MessagesRead {
        conversation_id: Option<String>,
        message_type: MessageKind,
        message_ids: Vec<String>,
        user_id: String,
        read_at: DateTime<Utc>,
    },

    MessageDeletedForEveryone {
        message_id: String,
        message_type: Option<MessageKind>,
        conversation_id: Option<String>,
    },

    /// A direct message arrived for this user. Carries no count; clients
    /// refetch the unread summary.
    DmNotification {
        message_id: String,
        conversation_id: String,
        sender_id: String,
        sender_name: String,
    },

    /// The user's unread summary may have changed.
    UnreadChanged { user_id: String },

    /// A request from this connection failed.
    MessageError { message: String },

    Pong,
}

// ── Supporting Types ──────────────────────────────────────────────────────────

/// A message as clients see it.
///
/// Users are reduced to `{id, name}`. Content of a message deleted for
/// everyone is always empty. The per-user hidden set is never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub family_id: String,
    pub sender: UserSummary,
    pub recipient: Option<UserSummary>,
    pub message_type: MessageKind,
    pub conversation_id: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_by: Vec<ReadReceipt>,
    pub deleted_for_everyone: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

impl MessageView {
    pub fn render(message: &Message, directory: &Directory) -> Self {
        let body = if message.deleted_for_everyone {
            String::new()
        } else {
            message.body.clone()
        };

        Self {
            id: message.id.clone(),
            family_id: message.family_id.clone(),
            sender: directory.summary(&message.sender_id),
            recipient: message.recipient_id.as_deref().map(|r| directory.summary(r)),
            message_type: message.kind,
            conversation_id: message.conversation_key.clone(),
            message: body,
            created_at: message.created_at,
            read_by: message.read_by.clone(),
            deleted_for_everyone: message.deleted_for_everyone,
            deleted_at: message.deleted_at,
            client_message_id: message.client_message_id.clone(),
        }
    }
}
