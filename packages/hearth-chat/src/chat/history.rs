//! Paged history queries.

use crate::directory::Identity;
use crate::error::{ChatError, Result};
use crate::protocol::MessageView;
use crate::state::ChatState;

/// The caller's family group chat, oldest-first within the page.
pub fn group(
    state: &ChatState,
    viewer: &Identity,
    limit: Option<usize>,
    skip: Option<usize>,
) -> Result<Vec<MessageView>> {
    let page = state.config.page(limit, skip);
    let messages = state
        .store
        .group_history(&viewer.family_id, &viewer.user_id, page)?;
    Ok(messages
        .iter()
        .map(|m| MessageView::render(m, &state.directory))
        .collect())
}

/// The caller's direct conversation with `peer_id`.
///
/// A peer outside the caller's family is rejected as a bad request,
/// whether or not they exist.
pub fn direct(
    state: &ChatState,
    viewer: &Identity,
    peer_id: &str,
    limit: Option<usize>,
    skip: Option<usize>,
) -> Result<Vec<MessageView>> {
    let peer = state
        .directory
        .member_of(&viewer.family_id, peer_id)
        .ok_or_else(|| ChatError::Validation("User is not in your family".to_string()))?;
    if peer.user_id == viewer.user_id {
        return Err(ChatError::Validation(
            "Cannot open a conversation with yourself".to_string(),
        ));
    }

    let page = state.config.page(limit, skip);
    let messages = state
        .store
        .direct_history(&viewer.family_id, &viewer.user_id, &peer.user_id, page)?;
    Ok(messages
        .iter()
        .map(|m| MessageView::render(m, &state.directory))
        .collect())
}
