//! # Message Store Schema
//!
//! ```text
//! ┌──────────────────────────┐     ┌──────────────────────┐
//! │        messages          │     │    message_reads     │
//! ├──────────────────────────┤     ├──────────────────────┤
//! │ seq (persistence order)  │     │ message_id ──────────┼──► messages.id
//! │ id                       │◄────│ user_id              │
//! │ family_id                │     │ read_at              │
//! │ sender_id                │     └──────────────────────┘
//! │ kind ('group'|'direct')  │
//! │ recipient_id             │     ┌──────────────────────┐
//! │ conversation_key         │     │    message_hidden    │
//! │ body                     │     ├──────────────────────┤
//! │ client_message_id        │◄────│ message_id           │
//! │ created_at               │     │ user_id              │
//! │ deleted_for_everyone     │     │ hidden_at            │
//! │ deleted_at               │     └──────────────────────┘
//! └──────────────────────────┘
//! ```
//!
//! `message_reads` and `message_hidden` are keyed on `(message_id, user_id)`
//! so a user can appear at most once in either set.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    family_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    recipient_id TEXT,
    conversation_key TEXT,
    body TEXT NOT NULL,
    -- Client-generated key for send deduplication
    client_message_id TEXT,
    -- Epoch milliseconds
    created_at INTEGER NOT NULL,
    deleted_for_everyone INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    CONSTRAINT kind_shape CHECK (
        (kind = 'group' AND recipient_id IS NULL AND conversation_key IS NULL)
        OR (kind = 'direct' AND recipient_id IS NOT NULL AND conversation_key IS NOT NULL)
    )
);
CREATE INDEX IF NOT EXISTS idx_messages_family_kind ON messages(family_id, kind, seq);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_key, seq);
CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages(recipient_id, kind);
CREATE INDEX IF NOT EXISTS idx_messages_sender_client ON messages(sender_id, client_message_id);

CREATE TABLE IF NOT EXISTS message_reads (
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    read_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_message_reads_user ON message_reads(user_id);

CREATE TABLE IF NOT EXISTS message_hidden (
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    hidden_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_message_hidden_user ON message_hidden(user_id);
"#;
