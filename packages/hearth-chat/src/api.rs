//! REST API handlers.
//!
//! Every route is scoped to the caller's family through [`AuthUser`].
//! Mutations that other viewers must see (mark-read, delete-for-everyone,
//! purge) also fan out the matching socket event.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::chat::unread::ConversationSummary;
use crate::chat::{deletion, history, receipts, unread};
use crate::error::{ChatError, Result};
use crate::protocol::MessageView;
use crate::state::ChatState;
use crate::store::{MessageKind, UnreadSummary};

// ── Request / Response Types ─────────────────────────────────────────────────

/// GET /chat/messages, GET /chat/messages/:userId
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

/// POST /chat/mark-read
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadBody {
    pub conversation_id: Option<String>,
    pub message_ids: Option<Vec<String>>,
    pub message_type: Option<MessageKind>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub count: usize,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /chat/messages?type=group&limit&skip
pub async fn group_history(
    AuthUser(user): AuthUser,
    State(state): State<ChatState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageView>>> {
    match query.kind.as_deref() {
        None | Some("group") => {}
        Some(other) => {
            return Err(ChatError::Validation(format!(
                "Unsupported message type '{}'",
                other
            )))
        }
    }
    history::group(&state, &user, query.limit, query.skip).map(Json)
}

/// GET /chat/messages/:userId?limit&skip
pub async fn direct_history(
    AuthUser(user): AuthUser,
    State(state): State<ChatState>,
    Path(peer_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageView>>> {
    history::direct(&state, &user, &peer_id, query.limit, query.skip).map(Json)
}

/// GET /chat/conversations
pub async fn conversations(
    AuthUser(user): AuthUser,
    State(state): State<ChatState>,
) -> Result<Json<Vec<ConversationSummary>>> {
    unread::conversations(&state, &user).map(Json)
}

/// GET /chat/unread-count
pub async fn unread_count(
    AuthUser(user): AuthUser,
    State(state): State<ChatState>,
) -> Result<Json<UnreadSummary>> {
    unread::summary(&state, &user).map(Json)
}

/// POST /chat/mark-read
pub async fn mark_read(
    AuthUser(user): AuthUser,
    State(state): State<ChatState>,
    Json(body): Json<MarkReadBody>,
) -> Result<Json<MarkReadResponse>> {
    let outcome = receipts::mark_read(
        &state,
        &user,
        receipts::MarkReadRequest {
            conversation_id: body.conversation_id,
            message_ids: body.message_ids,
            message_type: body.message_type,
        },
    )?;
    Ok(Json(MarkReadResponse {
        count: outcome.count,
    }))
}

/// DELETE /chat/messages/:id/for-everyone
pub async fn delete_for_everyone(
    AuthUser(user): AuthUser,
    State(state): State<ChatState>,
    Path(message_id): Path<String>,
) -> Result<Json<Value>> {
    let message = deletion::delete_for_everyone(&state, &user, &message_id)?;
    Ok(Json(json!({ "ok": true, "message": message })))
}

/// DELETE /chat/messages/:id/for-me
pub async fn delete_for_me(
    AuthUser(user): AuthUser,
    State(state): State<ChatState>,
    Path(message_id): Path<String>,
) -> Result<Json<Value>> {
    deletion::delete_for_me(&state, &user, &message_id)?;
    Ok(Json(json!({ "ok": true, "messageId": message_id })))
}

/// DELETE /chat/:messageId (moderators only)
pub async fn purge_message(
    AuthUser(user): AuthUser,
    State(state): State<ChatState>,
    Path(message_id): Path<String>,
) -> Result<Json<Value>> {
    deletion::purge(&state, &user, &message_id)?;
    Ok(Json(json!({ "ok": true, "messageId": message_id })))
}
