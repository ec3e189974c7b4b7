//! Chat operations.
//!
//! Each operation validates its input, writes through the message store,
//! and only then fans the resulting event out through the room router.
//! Nothing is broadcast for a write that failed.

pub mod deletion;
pub mod delivery;
pub mod history;
pub mod receipts;
pub mod unread;

use uuid::Uuid;

use crate::error::{ChatError, Result};

/// Reject ids that can't possibly name a stored message.
pub(crate) fn validate_message_id(id: &str) -> Result<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ChatError::Validation("Invalid message id".to_string()))
}
