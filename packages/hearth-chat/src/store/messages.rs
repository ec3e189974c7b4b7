//! SQLite-backed message store.
//!
//! One connection behind a mutex. Every mutation is a single conditional
//! statement (or one transaction of them) executed under that lock, so
//! concurrent read-marks and deletions never lose each other's writes.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::schema;
use super::types::{
    Audience, Inserted, Message, MessageKind, NewMessage, Page, ReadChange, ReadReceipt,
    ReadTarget, UnreadSummary,
};
use crate::conversation::conversation_key;
use crate::error::{ChatError, Result};

const MESSAGE_COLUMNS: &str = "m.id, m.family_id, m.sender_id, m.kind, m.recipient_id, \
     m.conversation_key, m.body, m.client_message_id, m.created_at, \
     m.deleted_for_everyone, m.deleted_at";

/// Rows visible to `?2` inside family `?1`: group messages, or direct
/// messages the user sent or received.
const PARTICIPANT_FILTER: &str =
    "m.family_id = ?1 AND (m.kind = 'group' OR m.sender_id = ?2 OR m.recipient_id = ?2)";

const NOT_HIDDEN_FOR_VIEWER: &str =
    "NOT EXISTS (SELECT 1 FROM message_hidden h WHERE h.message_id = m.id AND h.user_id = ?2)";

/// Direct messages between `?2` and `?3`, in either direction.
const BETWEEN_VIEWER_AND_PEER: &str = "m.kind = 'direct' \
     AND ((m.sender_id = ?2 AND m.recipient_id = ?3) OR (m.sender_id = ?3 AND m.recipient_id = ?2))";

const NOT_READ_BY_VIEWER: &str =
    "NOT EXISTS (SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = ?2)";

impl ToSql for MessageKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MessageKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        MessageKind::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown message kind '{}'", raw).into()))
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        family_id: row.get(1)?,
        sender_id: row.get(2)?,
        kind: row.get(3)?,
        recipient_id: row.get(4)?,
        conversation_key: row.get(5)?,
        body: row.get(6)?,
        client_message_id: row.get(7)?,
        created_at: from_millis(row.get(8)?),
        deleted_for_everyone: row.get(9)?,
        deleted_at: row.get::<_, Option<i64>>(10)?.map(from_millis),
        read_by: Vec::new(),
        hidden_for: Vec::new(),
    })
}

/// Fill in the read and hidden sets of freshly loaded rows.
fn hydrate(conn: &Connection, messages: &mut [Message]) -> Result<()> {
    let mut reads = conn.prepare_cached(
        "SELECT user_id, read_at FROM message_reads WHERE message_id = ?1 ORDER BY read_at, user_id",
    )?;
    let mut hidden = conn.prepare_cached(
        "SELECT user_id FROM message_hidden WHERE message_id = ?1 ORDER BY hidden_at, user_id",
    )?;

    for message in messages.iter_mut() {
        message.read_by = reads
            .query_map(params![message.id], |row| {
                Ok(ReadReceipt {
                    user_id: row.get(0)?,
                    read_at: from_millis(row.get(1)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        message.hidden_for = hidden
            .query_map(params![message.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
    }
    Ok(())
}

fn load_by_id(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let sql = format!("SELECT {} FROM messages m WHERE m.id = ?1", MESSAGE_COLUMNS);
    let found = conn.query_row(&sql, params![id], message_from_row).optional()?;
    match found {
        Some(message) => {
            let mut batch = [message];
            hydrate(conn, &mut batch)?;
            let [message] = batch;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

/// Load a message only if `user_id` (in `family_id`) takes part in it.
fn load_scoped(conn: &Connection, family_id: &str, user_id: &str, id: &str) -> Result<Message> {
    load_by_id(conn, id)?
        .filter(|m| m.family_id == family_id && m.involves(user_id))
        .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))
}

fn query_messages(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(sql)?;
    let mut messages = stmt
        .query_map(args, message_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    hydrate(conn, &mut messages)?;
    Ok(messages)
}

/// The persistent message store.
#[derive(Clone)]
pub struct MessageStore {
    conn: Arc<Mutex<Connection>>,
}

impl MessageStore {
    /// Open (or create) the store. `None` gives an in-memory database.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store. Nothing survives a restart.
    pub fn in_memory() -> Result<Self> {
        Self::open(None)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![schema::SCHEMA_VERSION],
                )?;
                tracing::info!(version = schema::SCHEMA_VERSION, "Message store schema created");
            }
            Some(v) => {
                tracing::debug!(version = v, "Message store schema version");
            }
        }
        Ok(())
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Persist a new message.
    ///
    /// If the message carries a client key and the same sender already stored
    /// a message with that key within `dedupe_window`, the stored one is
    /// returned and nothing is written.
    pub fn insert(&self, new: NewMessage, dedupe_window: Duration) -> Result<Inserted> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = Utc::now();

        if let Some(ref key) = new.client_message_id {
            let cutoff = (now - dedupe_window).timestamp_millis();
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM messages
                     WHERE sender_id = ?1 AND client_message_id = ?2 AND created_at >= ?3
                     ORDER BY seq DESC LIMIT 1",
                    params![new.sender_id, key, cutoff],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                let message = load_by_id(&tx, &id)?
                    .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))?;
                tx.commit()?;
                tracing::debug!(
                    message_id = id.as_str(),
                    sender_id = new.sender_id.as_str(),
                    "Duplicate send within dedupe window"
                );
                return Ok(Inserted {
                    message,
                    duplicate: true,
                });
            }
        }

        let (kind, recipient_id, conversation) = match new.audience {
            Audience::Group => (MessageKind::Group, None, None),
            Audience::Direct { recipient_id } => {
                let key = conversation_key(&new.sender_id, &recipient_id);
                (MessageKind::Direct, Some(recipient_id), Some(key))
            }
        };

        let message = Message {
            id: Uuid::new_v4().to_string(),
            family_id: new.family_id,
            sender_id: new.sender_id,
            kind,
            recipient_id,
            conversation_key: conversation,
            body: new.body,
            client_message_id: new.client_message_id,
            created_at: from_millis(now.timestamp_millis()),
            read_by: Vec::new(),
            deleted_for_everyone: false,
            deleted_at: None,
            hidden_for: Vec::new(),
        };

        tx.execute(
            "INSERT INTO messages (id, family_id, sender_id, kind, recipient_id, conversation_key,
                                   body, client_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.id,
                message.family_id,
                message.sender_id,
                message.kind,
                message.recipient_id,
                message.conversation_key,
                message.body,
                message.client_message_id,
                message.created_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;

        Ok(Inserted {
            message,
            duplicate: false,
        })
    }

    /// Add `user_id` to the read set of every targeted message they haven't
    /// read yet. Returns only the messages that actually changed.
    pub fn mark_read(
        &self,
        family_id: &str,
        user_id: &str,
        target: &ReadTarget,
        read_at: DateTime<Utc>,
    ) -> Result<Vec<ReadChange>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let base = format!(
            "SELECT m.id, m.kind, m.conversation_key FROM messages m WHERE {} AND {}",
            PARTICIPANT_FILTER, NOT_READ_BY_VIEWER
        );
        let to_change = |row: &Row<'_>| -> rusqlite::Result<ReadChange> {
            Ok(ReadChange {
                message_id: row.get(0)?,
                kind: row.get(1)?,
                conversation_key: row.get(2)?,
            })
        };

        let candidates: Vec<ReadChange> = match target {
            ReadTarget::Conversation { peer_id } => {
                let sql = format!("{} AND {} ORDER BY m.seq", base, BETWEEN_VIEWER_AND_PEER);
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![family_id, user_id, peer_id], to_change)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            ReadTarget::FamilyGroup => {
                let sql = format!("{} AND m.kind = 'group' ORDER BY m.seq", base);
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![family_id, user_id], to_change)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            ReadTarget::Messages(ids) => {
                let sql = format!("{} AND m.id = ?3", base);
                let mut stmt = tx.prepare(&sql)?;
                let mut rows = Vec::new();
                for id in ids {
                    if let Some(change) = stmt
                        .query_row(params![family_id, user_id, id], to_change)
                        .optional()?
                    {
                        if !rows.iter().any(|c: &ReadChange| c.message_id == change.message_id) {
                            rows.push(change);
                        }
                    }
                }
                rows
            }
        };

        let mut changed = Vec::with_capacity(candidates.len());
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
            )?;
            for candidate in candidates {
                if insert.execute(params![candidate.message_id, user_id, read_at.timestamp_millis()])? == 1 {
                    changed.push(candidate);
                }
            }
        }
        tx.commit()?;

        Ok(changed)
    }

    /// Replace a message's content with a tombstone for everyone.
    ///
    /// Only the sender may do this, and only once.
    pub fn delete_for_everyone(
        &self,
        family_id: &str,
        actor_id: &str,
        message_id: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<Message> {
        let conn = self.conn.lock();
        let message = load_scoped(&conn, family_id, actor_id, message_id)?;

        if message.sender_id != actor_id {
            return Err(ChatError::Forbidden(
                "Only the sender can delete this message for everyone".to_string(),
            ));
        }

        let rows = conn.execute(
            "UPDATE messages SET deleted_for_everyone = 1, deleted_at = ?1, body = ''
             WHERE id = ?2 AND sender_id = ?3 AND deleted_for_everyone = 0",
            params![deleted_at.timestamp_millis(), message_id, actor_id],
        )?;
        if rows == 0 {
            return Err(ChatError::Redundant("Message already deleted".to_string()));
        }

        load_by_id(&conn, message_id)?
            .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))
    }

    /// Hide a message from `actor_id`'s own views.
    pub fn delete_for_me(
        &self,
        family_id: &str,
        actor_id: &str,
        message_id: &str,
        hidden_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        load_scoped(&conn, family_id, actor_id, message_id)?;

        let rows = conn.execute(
            "INSERT OR IGNORE INTO message_hidden (message_id, user_id, hidden_at) VALUES (?1, ?2, ?3)",
            params![message_id, actor_id, hidden_at.timestamp_millis()],
        )?;
        if rows == 0 {
            return Err(ChatError::Redundant("Message already deleted for you".to_string()));
        }
        Ok(())
    }

    /// Physically remove a message of `family_id`. Returns false if there
    /// was nothing to remove.
    pub fn purge(&self, family_id: &str, message_id: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM messages WHERE id = ?1 AND family_id = ?2",
                params![message_id, family_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(false);
        }

        tx.execute("DELETE FROM message_reads WHERE message_id = ?1", params![message_id])?;
        tx.execute("DELETE FROM message_hidden WHERE message_id = ?1", params![message_id])?;
        tx.execute("DELETE FROM messages WHERE id = ?1", params![message_id])?;
        tx.commit()?;
        Ok(true)
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn get(&self, message_id: &str) -> Result<Option<Message>> {
        let conn = self.conn.lock();
        load_by_id(&conn, message_id)
    }

    /// Group history of a family, newest window first, returned oldest-first.
    /// Messages the viewer hid are left out.
    pub fn group_history(&self, family_id: &str, viewer_id: &str, page: Page) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM messages m
             WHERE m.family_id = ?1 AND m.kind = 'group' AND {}
             ORDER BY m.seq DESC LIMIT ?3 OFFSET ?4",
            MESSAGE_COLUMNS, NOT_HIDDEN_FOR_VIEWER
        );
        let (limit, offset) = page.as_sql();
        let mut messages = query_messages(&conn, &sql, &[&family_id, &viewer_id, &limit, &offset])?;
        messages.reverse();
        Ok(messages)
    }

    /// Direct messages between `viewer_id` and `peer_id`, same windowing as
    /// group history. Rows are matched on the participant pair, never on the
    /// conversation key alone.
    pub fn direct_history(
        &self,
        family_id: &str,
        viewer_id: &str,
        peer_id: &str,
        page: Page,
    ) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM messages m
             WHERE m.family_id = ?1 AND {} AND {}
             ORDER BY m.seq DESC LIMIT ?4 OFFSET ?5",
            MESSAGE_COLUMNS, BETWEEN_VIEWER_AND_PEER, NOT_HIDDEN_FOR_VIEWER
        );
        let (limit, offset) = page.as_sql();
        let mut messages = query_messages(
            &conn,
            &sql,
            &[&family_id, &viewer_id, &peer_id, &limit, &offset],
        )?;
        messages.reverse();
        Ok(messages)
    }

    /// Every direct message `user_id` sent or received, minus the ones they
    /// hid, in persistence order.
    pub fn direct_messages_involving(&self, family_id: &str, user_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM messages m
             WHERE m.family_id = ?1 AND m.kind = 'direct'
               AND (m.sender_id = ?2 OR m.recipient_id = ?2) AND {}
             ORDER BY m.seq",
            MESSAGE_COLUMNS, NOT_HIDDEN_FOR_VIEWER
        );
        query_messages(&conn, &sql, &[&family_id, &user_id])
    }

    /// Unread counts for badges. Deleted and hidden messages never count,
    /// nor do the user's own group messages.
    pub fn unread_summary(&self, family_id: &str, user_id: &str) -> Result<UnreadSummary> {
        let conn = self.conn.lock();

        let group_sql = format!(
            "SELECT COUNT(*) FROM messages m
             WHERE m.family_id = ?1 AND m.kind = 'group' AND m.sender_id != ?2
               AND m.deleted_for_everyone = 0 AND {} AND {}",
            NOT_READ_BY_VIEWER, NOT_HIDDEN_FOR_VIEWER
        );
        let direct_sql = format!(
            "SELECT COUNT(*) FROM messages m
             WHERE m.family_id = ?1 AND m.kind = 'direct' AND m.recipient_id = ?2
               AND m.deleted_for_everyone = 0 AND {} AND {}",
            NOT_READ_BY_VIEWER, NOT_HIDDEN_FOR_VIEWER
        );

        let group: i64 = conn.query_row(&group_sql, params![family_id, user_id], |row| row.get(0))?;
        let direct: i64 = conn.query_row(&direct_sql, params![family_id, user_id], |row| row.get(0))?;

        Ok(UnreadSummary::new(group.max(0) as u64, direct.max(0) as u64))
    }

    /// Total number of stored messages.
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
