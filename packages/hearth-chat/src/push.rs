//! Out-of-band notifications for direct messages.
//!
//! The real push provider lives outside this service. The default sink only
//! records that a notification would have gone out.

use crate::directory::Identity;
use crate::protocol::MessageView;

/// Receives a callback for every newly persisted direct message.
pub trait PushSink: Send + Sync {
    fn direct_message(&self, recipient: &Identity, message: &MessageView);
}

/// Logs push notifications instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPushSink;

impl PushSink for LogPushSink {
    fn direct_message(&self, recipient: &Identity, message: &MessageView) {
        tracing::info!(
            recipient = recipient.user_id.as_str(),
            sender = message.sender.id.as_str(),
            message_id = message.id.as_str(),
            "Direct message push"
        );
    }
}
