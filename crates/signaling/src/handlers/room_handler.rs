//! Room-Handler – join_room, leave_room
//!
//! Reine Mitgliedschaftsverwaltung; wer einem Raum beitreten darf, prueft
//! der Persistenz-Dienst ausserhalb des Relays.

use instatalk_core::types::{ConnectionId, UserId};
use instatalk_protocol::control::{RoomAck, RoomRequest, ServerMessage, ServerPayload};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Verarbeitet einen Raum-Beitritt
pub fn handle_join_room(
    request: RoomRequest,
    request_id: u32,
    connection_id: ConnectionId,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) -> ServerMessage {
    let neu = state
        .tabellen
        .lock()
        .rooms
        .beitreten(connection_id, request.room_id.clone());

    tracing::debug!(
        user_id = %user_id,
        connection_id = %connection_id,
        room_id = %request.room_id,
        neu,
        "Raum beigetreten"
    );

    ServerMessage::new(
        request_id,
        ServerPayload::RoomJoined(RoomAck {
            room_id: request.room_id,
        }),
    )
}

/// Verarbeitet das Verlassen eines Raums
///
/// Verlassen eines Raums ohne Mitgliedschaft wird ebenfalls bestaetigt.
pub fn handle_leave_room(
    request: RoomRequest,
    request_id: u32,
    connection_id: ConnectionId,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) -> ServerMessage {
    let war_mitglied = state
        .tabellen
        .lock()
        .rooms
        .verlassen(&connection_id, &request.room_id);

    tracing::debug!(
        user_id = %user_id,
        connection_id = %connection_id,
        room_id = %request.room_id,
        war_mitglied,
        "Raum verlassen"
    );

    ServerMessage::new(
        request_id,
        ServerPayload::RoomLeft(RoomAck {
            room_id: request.room_id,
        }),
    )
}
