//! WebSocket connection handler.
//!
//! The socket is already authenticated when it gets here. On connect it is
//! subscribed to the user's family room and personal room; conversation
//! rooms are joined explicitly by the client and need re-joining after a
//! reconnect.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::chat::{delivery, receipts};
use crate::directory::Identity;
use crate::error::{ChatError, Result};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::rooms::{ConnectionId, Room};
use crate::state::ChatState;

/// Handle a single WebSocket connection for its whole lifetime.
pub async fn handle_websocket(socket: WebSocket, state: ChatState, identity: Identity) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // ── Register ──────────────────────────────────────────────────────────

    let conn = state.rooms.connect(&identity.user_id, tx);
    state.rooms.join(conn, Room::family(&identity.family_id));
    state.rooms.join(conn, Room::user(&identity.user_id));
    state.rooms.send_to(
        conn,
        ServerEvent::Registered {
            user_id: identity.user_id.clone(),
            family_id: identity.family_id.clone(),
        },
    );

    // ── Sender Task ───────────────────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server event: {}", e);
                }
            }
        }
    });

    // ── Process Events ────────────────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(&state, conn, &identity, event),
                Err(e) => {
                    tracing::warn!(
                        user_id = identity.user_id.as_str(),
                        error = %e,
                        "Failed to parse client event"
                    );
                    state.rooms.send_to(
                        conn,
                        ServerEvent::MessageError {
                            message: format!("Invalid event: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => {
                tracing::debug!(user_id = identity.user_id.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    user_id = identity.user_id.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary, Ping, Pong
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────

    state.rooms.disconnect(conn);
    sender_task.abort();
}

/// Handle one parsed client event. Failures go back to this connection
/// only.
pub fn handle_client_event(state: &ChatState, conn: ConnectionId, identity: &Identity, event: ClientEvent) {
    let result = match event {
        ClientEvent::JoinFamilyChat { family_id } => {
            join_family(state, conn, identity, &family_id)
        }
        ClientEvent::JoinDmRoom { user_id1, user_id2 } => {
            direct_room(state, identity, &user_id1, &user_id2).map(|room| join(state, conn, room))
        }
        ClientEvent::LeaveDmRoom { user_id1, user_id2 } => {
            direct_room(state, identity, &user_id1, &user_id2).map(|room| {
                state.rooms.leave(conn, &room);
                state.rooms.send_to(conn, ServerEvent::Left { room: room.to_string() });
            })
        }
        ClientEvent::JoinUserRoom { user_id } => {
            if user_id == identity.user_id {
                join(state, conn, Room::user(&user_id));
                Ok(())
            } else {
                Err(ChatError::Forbidden(
                    "Cannot join another user's notifications".to_string(),
                ))
            }
        }
        ClientEvent::SendMessage {
            family_id,
            sender_id,
            message,
            client_message_id,
            ..
        } => check_sender(identity, &family_id, &sender_id)
            .and_then(|_| delivery::send_group(state, identity, &message, client_message_id))
            .map(|delivery| acknowledge(state, conn, delivery)),
        ClientEvent::SendDm {
            family_id,
            sender_id,
            recipient_id,
            message,
            client_message_id,
        } => check_sender(identity, &family_id, &sender_id)
            .and_then(|_| {
                delivery::send_direct(state, identity, &recipient_id, &message, client_message_id)
            })
            .map(|delivery| acknowledge(state, conn, delivery)),
        ClientEvent::MarkRead {
            user_id,
            conversation_id,
            message_ids,
            message_type,
        } => {
            if user_id != identity.user_id {
                Err(ChatError::Forbidden(
                    "Cannot mark messages read for another user".to_string(),
                ))
            } else {
                receipts::mark_read(
                    state,
                    identity,
                    receipts::MarkReadRequest {
                        conversation_id,
                        message_ids,
                        message_type,
                    },
                )
                .map(|_| ())
            }
        }
        ClientEvent::Ping => {
            state.rooms.send_to(conn, ServerEvent::Pong);
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::debug!(
            user_id = identity.user_id.as_str(),
            error = %e,
            "Client event rejected"
        );
        state.rooms.send_to(conn, e.to_event());
    }
}

fn join(state: &ChatState, conn: ConnectionId, room: Room) {
    let name = room.to_string();
    state.rooms.join(conn, room);
    state.rooms.send_to(conn, ServerEvent::Joined { room: name });
}

fn join_family(state: &ChatState, conn: ConnectionId, identity: &Identity, family_id: &str) -> Result<()> {
    if family_id != identity.family_id {
        return Err(ChatError::Forbidden(
            "Cannot join another family's chat".to_string(),
        ));
    }
    join(state, conn, Room::family(family_id));
    Ok(())
}

/// The direct room for two users, if the caller is one of them and the
/// other is in the caller's family.
fn direct_room(state: &ChatState, identity: &Identity, user_a: &str, user_b: &str) -> Result<Room> {
    let peer = if user_a == identity.user_id {
        user_b
    } else if user_b == identity.user_id {
        user_a
    } else {
        return Err(ChatError::Forbidden(
            "Cannot join a conversation you are not part of".to_string(),
        ));
    };
    if peer == identity.user_id || state.directory.member_of(&identity.family_id, peer).is_none() {
        return Err(ChatError::Validation("User is not in your family".to_string()));
    }
    Ok(Room::direct(user_a, user_b))
}

/// Sends carry the sender's ids; they must match the authenticated user.
fn check_sender(identity: &Identity, family_id: &str, sender_id: &str) -> Result<()> {
    if sender_id != identity.user_id || family_id != identity.family_id {
        return Err(ChatError::Forbidden(
            "Cannot send as another user".to_string(),
        ));
    }
    Ok(())
}

fn acknowledge(state: &ChatState, conn: ConnectionId, delivery: delivery::Delivery) {
    state.rooms.send_to(
        conn,
        ServerEvent::MessageSent {
            client_message_id: delivery.message.client_message_id.clone(),
            message: delivery.message,
        },
    );
}
