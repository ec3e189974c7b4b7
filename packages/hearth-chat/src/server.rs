//! Router assembly and the operational endpoints.

use std::time::Duration;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::handler;
use crate::state::ChatState;

/// Build the HTTP + WebSocket router.
pub fn router(state: ChatState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/chat/messages", get(api::group_history))
        .route("/chat/messages/:id", get(api::direct_history))
        .route("/chat/messages/:id/for-everyone", delete(api::delete_for_everyone))
        .route("/chat/messages/:id/for-me", delete(api::delete_for_me))
        .route("/chat/conversations", get(api::conversations))
        .route("/chat/unread-count", get(api::unread_count))
        .route("/chat/mark-read", post(api::mark_read))
        .route("/chat/:id", delete(api::purge_message))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Periodically drop idle room sequencers.
pub fn spawn_cleanup(state: ChatState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            state.rooms.prune_sequencers();
        }
    })
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade for an authenticated user.
async fn ws_handler(
    AuthUser(identity): AuthUser,
    ws: WebSocketUpgrade,
    State(state): State<ChatState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state, identity))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "hearth-chat",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn stats_handler(State(state): State<ChatState>) -> Result<impl IntoResponse> {
    Ok(Json(json!({
        "online_connections": state.rooms.connection_count(),
        "active_rooms": state.rooms.room_count(),
        "stored_messages": state.store.count()?,
        "roster_members": state.directory.len(),
    })))
}
