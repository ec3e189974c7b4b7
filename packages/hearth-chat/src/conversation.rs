//! Conversation keys for direct messages.
//!
//! A direct conversation has no table of its own. Its key is derived from the
//! two participants: sort the ids, join them with `_`. The same pair always
//! yields the same key no matter who initiated.

/// Separator between the two participant ids.
pub const CONVERSATION_SEPARATOR: char = '_';

/// Canonical conversation key for an unordered pair of users.
pub fn conversation_key(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{}{}{}", first, CONVERSATION_SEPARATOR, second)
}

/// Whether `user_id` is one of the two participants of `key`.
pub fn is_participant(key: &str, user_id: &str) -> bool {
    peer_in(key, user_id).is_some()
}

/// The other participant of `key`, given one of them.
///
/// Roster ids never contain the separator, so a key splits in exactly one
/// place. Keys that aren't in canonical order are rejected.
pub fn peer_in(key: &str, user_id: &str) -> Option<String> {
    let (first, second) = key.split_once(CONVERSATION_SEPARATOR)?;
    if second.contains(CONVERSATION_SEPARATOR) || conversation_key(first, second) != key {
        return None;
    }
    if first == user_id {
        Some(second.to_string())
    } else if second == user_id {
        Some(first.to_string())
    } else {
        None
    }
}
