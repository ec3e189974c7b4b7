//! Room router.
//!
//! Maps named rooms to the live connections subscribed to them and fans
//! events out. Three kinds of room exist:
//!
//! - `family:<familyId>`: the family's group chat
//! - `dm:<conversationKey>`: one direct conversation
//! - `user:<userId>`: a single user's notification channel
//!
//! Each connection owns an unbounded channel drained by its socket task, so
//! broadcasting never blocks on a slow client. Subscriptions live only as
//! long as the connection and are dropped on disconnect.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::conversation::conversation_key;
use crate::protocol::ServerEvent;

/// Identifies one live socket. A user may hold several.
pub type ConnectionId = Uuid;

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    FamilyGroup(String),
    Direct(String),
    User(String),
}

impl Room {
    pub fn family(family_id: &str) -> Self {
        Room::FamilyGroup(family_id.to_string())
    }

    /// The direct room shared by two users, whichever order they're given in.
    pub fn direct(user_a: &str, user_b: &str) -> Self {
        Room::Direct(conversation_key(user_a, user_b))
    }

    pub fn user(user_id: &str) -> Self {
        Room::User(user_id.to_string())
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::FamilyGroup(id) => write!(f, "family:{}", id),
            Room::Direct(key) => write!(f, "dm:{}", key),
            Room::User(id) => write!(f, "user:{}", id),
        }
    }
}

struct Connection {
    user_id: String,
    sender: ClientSender,
    rooms: HashSet<Room>,
}

/// Shared, concurrent room registry.
#[derive(Clone, Default)]
pub struct RoomRouter {
    /// Connection → its channel and subscriptions.
    connections: Arc<DashMap<ConnectionId, Connection>>,

    /// Room → subscribed connections. Empty rooms are removed.
    rooms: Arc<DashMap<Room, HashSet<ConnectionId>>>,

    /// Room → lock held across persist-then-broadcast so events reach
    /// subscribers in persistence order.
    sequencers: Arc<DashMap<Room, Arc<Mutex<()>>>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Connections ───────────────────────────────────────────────────────

    /// Track a new socket for `user_id`.
    pub fn connect(&self, user_id: &str, sender: ClientSender) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            Connection {
                user_id: user_id.to_string(),
                sender,
                rooms: HashSet::new(),
            },
        );
        tracing::info!(user_id = user_id, connection = %id, "Client connected");
        id
    }

    /// Forget a socket and every subscription it held.
    pub fn disconnect(&self, connection: ConnectionId) {
        let Some((_, conn)) = self.connections.remove(&connection) else {
            return;
        };
        for room in &conn.rooms {
            self.remove_member(room, connection);
        }
        tracing::info!(
            user_id = conn.user_id.as_str(),
            connection = %connection,
            rooms = conn.rooms.len(),
            "Client disconnected"
        );
    }

    #[cfg(test)]
    fn user_of(&self, connection: ConnectionId) -> Option<String> {
        self.connections.get(&connection).map(|c| c.user_id.clone())
    }

    // ── Subscriptions ─────────────────────────────────────────────────────

    /// Subscribe a connection to a room. Joining twice is a no-op.
    /// Returns false if the connection is unknown.
    pub fn join(&self, connection: ConnectionId, room: Room) -> bool {
        {
            let Some(mut conn) = self.connections.get_mut(&connection) else {
                return false;
            };
            if !conn.rooms.insert(room.clone()) {
                return true;
            }
        }
        tracing::debug!(connection = %connection, room = %room, "Joined room");
        self.rooms.entry(room).or_default().insert(connection);
        true
    }

    /// Unsubscribe a connection from a room. Returns true if it was a member.
    pub fn leave(&self, connection: ConnectionId, room: &Room) -> bool {
        let was_member = self
            .connections
            .get_mut(&connection)
            .map(|mut c| c.rooms.remove(room))
            .unwrap_or(false);
        if was_member {
            self.remove_member(room, connection);
            tracing::debug!(connection = %connection, room = %room, "Left room");
        }
        was_member
    }

    #[cfg(test)]
    pub(crate) fn is_member(&self, connection: ConnectionId, room: &Room) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.contains(&connection))
            .unwrap_or(false)
    }

    fn remove_member(&self, room: &Room, connection: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&connection);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    // ── Delivery ──────────────────────────────────────────────────────────

    /// Send an event to every subscriber of `room`. Returns how many
    /// connections accepted it.
    pub fn broadcast(&self, room: &Room, event: &ServerEvent) -> usize {
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let delivered = members
            .into_iter()
            .filter(|id| self.send_to(*id, event.clone()))
            .count();
        tracing::debug!(room = %room, delivered = delivered, "Broadcast");
        delivered
    }

    /// Send an event to one connection. Returns true if it was accepted.
    pub fn send_to(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        self.connections
            .get(&connection)
            .map(|c| c.sender.send(event).is_ok())
            .unwrap_or(false)
    }

    /// The ordering lock for `room`.
    pub fn sequencer(&self, room: &Room) -> Arc<Mutex<()>> {
        self.sequencers.entry(room.clone()).or_default().clone()
    }

    /// Drop ordering locks nobody holds. Called periodically by the
    /// cleanup task.
    pub fn prune_sequencers(&self) -> usize {
        let before = self.sequencers.len();
        self.sequencers.retain(|_, lock| Arc::strong_count(lock) > 1);
        let pruned = before.saturating_sub(self.sequencers.len());
        if pruned > 0 {
            tracing::debug!(count = pruned, "Pruned idle room sequencers");
        }
        pruned
    }

    // ── Stats ─────────────────────────────────────────────────────────────

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    #[cfg(test)]
    fn member_count(&self, room: &Room) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}
