//! Unread counts and the direct conversation list.
//!
//! Both are recomputed from the store on every call. Socket events only
//! tell clients when to ask again.

use std::collections::HashMap;

use serde::Serialize;

use crate::directory::{Identity, UserSummary};
use crate::error::Result;
use crate::protocol::MessageView;
use crate::state::ChatState;
use crate::store::{Message, UnreadSummary};

/// One row of the caller's conversation list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub user: UserSummary,
    pub last_message: MessageView,
    pub unread_count: u64,
}

pub fn summary(state: &ChatState, user: &Identity) -> Result<UnreadSummary> {
    state.store.unread_summary(&user.family_id, &user.user_id)
}

/// Every direct conversation the caller has a visible message in, most
/// recently active first.
pub fn conversations(state: &ChatState, user: &Identity) -> Result<Vec<ConversationSummary>> {
    let messages = state
        .store
        .direct_messages_involving(&user.family_id, &user.user_id)?;

    struct Entry<'a> {
        peer: &'a str,
        latest: &'a Message,
        position: usize,
        unread: u64,
    }

    let mut by_key: HashMap<&str, Entry<'_>> = HashMap::new();
    for (position, message) in messages.iter().enumerate() {
        let (Some(key), Some(recipient)) = (
            message.conversation_key.as_deref(),
            message.recipient_id.as_deref(),
        ) else {
            continue;
        };
        let peer = if message.sender_id == user.user_id {
            recipient
        } else {
            message.sender_id.as_str()
        };
        let unread = recipient == user.user_id
            && message.is_visible_to(&user.user_id)
            && !message.is_read_by(&user.user_id);

        let entry = by_key.entry(key).or_insert(Entry {
            peer,
            latest: message,
            position,
            unread: 0,
        });
        // Store order is persistence order, so later rows are newer.
        entry.latest = message;
        entry.position = position;
        if unread {
            entry.unread += 1;
        }
    }

    let mut entries: Vec<(&str, Entry<'_>)> = by_key.into_iter().collect();
    entries.sort_by(|a, b| b.1.position.cmp(&a.1.position));

    Ok(entries
        .into_iter()
        .map(|(key, entry)| ConversationSummary {
            conversation_id: key.to_string(),
            user: state.directory.summary(entry.peer),
            last_message: MessageView::render(entry.latest, &state.directory),
            unread_count: entry.unread,
        })
        .collect())
}
