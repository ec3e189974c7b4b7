//! Records read from and written to the message store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group chat or one-to-one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Group,
    Direct,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Group => "group",
            MessageKind::Direct => "direct",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "group" => Some(MessageKind::Group),
            "direct" => Some(MessageKind::Direct),
            _ => None,
        }
    }
}

/// Who a new message goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// The sender's whole family.
    Group,
    /// A single family member.
    Direct { recipient_id: String },
}

/// A validated send request, ready to persist.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub family_id: String,
    pub sender_id: String,
    pub audience: Audience,
    pub body: String,
    pub client_message_id: Option<String>,
}

/// One entry of a message's read set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    #[serde(rename = "user")]
    pub user_id: String,
    pub read_at: DateTime<Utc>,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub family_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub recipient_id: Option<String>,
    pub conversation_key: Option<String>,
    pub body: String,
    pub client_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_by: Vec<ReadReceipt>,
    pub deleted_for_everyone: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Users who hid this message for themselves.
    pub hidden_for: Vec<String>,
}

impl Message {
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    pub fn is_hidden_for(&self, user_id: &str) -> bool {
        self.hidden_for.iter().any(|u| u == user_id)
    }

    /// Whether `viewer` should see this message's content.
    pub fn is_visible_to(&self, viewer: &str) -> bool {
        !self.deleted_for_everyone && !self.is_hidden_for(viewer)
    }

    /// Whether `user_id` takes part in this message's conversation.
    pub fn involves(&self, user_id: &str) -> bool {
        match self.kind {
            MessageKind::Group => true,
            MessageKind::Direct => {
                self.sender_id == user_id || self.recipient_id.as_deref() == Some(user_id)
            }
        }
    }
}

/// Outcome of a persist call.
#[derive(Debug, Clone)]
pub struct Inserted {
    pub message: Message,
    /// True when a message with the same client key was already stored
    /// inside the dedupe window; nothing new was written.
    pub duplicate: bool,
}

/// Which messages a mark-read call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTarget {
    /// Every message exchanged between the reader and `peer_id`.
    Conversation { peer_id: String },
    /// Exactly these message ids.
    Messages(Vec<String>),
    /// Every group message of the reader's family.
    FamilyGroup,
}

/// A message whose read set gained the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadChange {
    pub message_id: String,
    pub kind: MessageKind,
    pub conversation_key: Option<String>,
}

/// Unread badge counts for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadSummary {
    pub total: u64,
    pub group: u64,
    pub direct: u64,
}

impl UnreadSummary {
    pub fn new(group: u64, direct: u64) -> Self {
        Self {
            total: group + direct,
            group,
            direct,
        }
    }
}

/// Paging window for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub skip: usize,
}

impl Page {
    /// `LIMIT` and `OFFSET` as SQLite integers. Values past `i64::MAX`
    /// saturate instead of wrapping negative.
    pub fn as_sql(&self) -> (i64, i64) {
        (
            i64::try_from(self.limit).unwrap_or(i64::MAX),
            i64::try_from(self.skip).unwrap_or(i64::MAX),
        )
    }
}
