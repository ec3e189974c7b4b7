//! Hearth family chat server.
//!
//! Real-time chat for a family finance app: one group chat per family plus
//! direct messages between family members, with read receipts, two kinds of
//! deletion, and unread badge counts.
//!
//! - **REST** (`/chat/...`): history, conversation list, unread counts,
//!   mark-read, deletes.
//! - **WebSocket** (`/ws`): sends, room joins, and every live event.
//!
//! Each message is persisted before anything is broadcast about it, so a
//! client that refetches after a reconnect never misses or invents one.

pub mod api;
pub mod auth;
pub mod chat;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod push;
pub mod rooms;
pub mod server;
pub mod state;
pub mod store;

pub use directory::{Directory, Identity, Role};
pub use error::{ChatError, Result};
pub use server::router;
pub use state::{ChatConfig, ChatState};
pub use store::MessageStore;
