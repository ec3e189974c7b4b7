//! # Message Store
//!
//! Durable record of every chat message and its read/delete state. This is
//! the only shared mutable resource in the server; everything else (rooms,
//! connections) is per-process and ephemeral.

mod messages;
pub mod schema;
mod types;

pub use messages::MessageStore;
pub use types::{
    Audience, Inserted, Message, MessageKind, NewMessage, Page, ReadChange, ReadReceipt,
    ReadTarget, UnreadSummary,
};
