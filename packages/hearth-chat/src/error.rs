//! Error types for the chat server.
//!
//! Every failure a request can hit maps onto one `ChatError` variant. REST
//! handlers turn it into a status code + JSON body; socket handlers turn it
//! into a `message-error` event addressed to the originating connection only.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::protocol::ServerEvent;

/// Result type alias for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    /// No (or an unknown) identity was attached to the request.
    #[error("Authentication required")]
    Unauthenticated,

    /// Malformed input, rejected before anything is persisted.
    #[error("{0}")]
    Validation(String),

    /// The caller is known but not allowed to do this.
    #[error("{0}")]
    Forbidden(String),

    /// The target doesn't exist or isn't in the caller's scope.
    #[error("{0}")]
    NotFound(String),

    /// The operation was already applied (already deleted, already hidden).
    #[error("{0}")]
    Redundant(String),

    /// The message store failed.
    #[error("Message store error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Reference data (family roster) could not be loaded.
    #[error("Directory error: {0}")]
    Directory(String),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ChatError::Validation(_) | ChatError::Redundant(_) => StatusCode::BAD_REQUEST,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Storage(_) | ChatError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to the caller. Infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Storage(_) | ChatError::Directory(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Render as a socket error event for the sending connection.
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::MessageError {
            message: self.public_message(),
        }
    }

    fn log(&self) {
        match self {
            ChatError::Storage(_) | ChatError::Directory(_) => {
                tracing::error!(error = %self, "Request failed");
            }
            _ => {
                tracing::warn!(error = %self, status = self.status_code().as_u16(), "Request rejected");
            }
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> axum::response::Response {
        self.log();
        (
            self.status_code(),
            Json(json!({
                "ok": false,
                "error": self.public_message(),
            })),
        )
            .into_response()
    }
}
