//! Request identity.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in the `x-user-id` header. Here it is only resolved against the
//! roster. Missing or unknown ids are rejected with 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::directory::Identity;
use crate::error::ChatError;
use crate::state::ChatState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor for the calling user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl FromRequestParts<ChatState> for AuthUser {
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, state: &ChatState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ChatError::Unauthenticated)?;

        match state.directory.get(user_id) {
            Some(identity) => Ok(AuthUser(identity)),
            None => {
                tracing::debug!(user_id = user_id, "Unknown user id");
                Err(ChatError::Unauthenticated)
            }
        }
    }
}
