//! Chat-Handler – Nachrichten senden, Tipp-Indikatoren, History
//!
//! Nachrichten werden erst gespeichert und dann verteilt. Die Schreibsperre
//! des Raums umfasst beides, damit die Verteilreihenfolge im Raum der
//! Speicherreihenfolge entspricht. Andere Raeume laufen parallel weiter.

use chrono::{DateTime, Utc};
use instatalk_chat::{GespeicherteNachricht, HistoryAnfrage};
use instatalk_core::types::{ConnectionId, RoomId, UserId};
use instatalk_protocol::control::{
    ErrorCode, HistoryRequest, HistoryResponse, MessageEvent, SendMessageRequest, ServerMessage,
    ServerPayload, TypingRequest,
};
use std::sync::Arc;

use crate::error::SignalingError;
use crate::message_relay::{nachricht_info, MessageRelay};
use crate::server_state::SignalingState;
use crate::typing::TypingCoordinator;

/// Verarbeitet eine Chat-Nachricht
///
/// Bei Erfolg erhalten alle anderen Raum-Mitglieder `message_received`,
/// der Absender `message_sent`. Schlaegt das Speichern fehl, wird nichts
/// verteilt und nur der Absender erhaelt einen Fehler.
pub async fn handle_send_message(
    request: SendMessageRequest,
    request_id: u32,
    connection_id: ConnectionId,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) -> ServerMessage {
    let room_id = request.room_id;
    let sperre = state.raum_sperre(&room_id);

    let ergebnis = {
        let _schreibrecht = sperre.lock().await;
        match state
            .store
            .nachricht_anhaengen(&room_id, user_id, &request.content)
            .await
        {
            Ok(nachricht) => {
                let zugestellt = verteilen(state, &room_id, &nachricht, &connection_id);
                Ok((nachricht, zugestellt))
            }
            Err(e) => Err(e),
        }
    };
    state.raum_sperre_freigeben(&room_id, sperre);

    match ergebnis {
        Ok((nachricht, zugestellt)) => {
            state.zaehler.nachricht_verteilt();
            tracing::debug!(
                user_id = %user_id,
                room_id = %room_id,
                message_id = %nachricht.id,
                zugestellt,
                "Chat-Nachricht gesendet"
            );
            ServerMessage::new(
                request_id,
                ServerPayload::MessageSent(MessageEvent {
                    message: nachricht_info(&nachricht),
                }),
            )
        }
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                room_id = %room_id,
                fehler = %e,
                "Chat-Nachricht senden fehlgeschlagen"
            );
            SignalingError::from(e).als_antwort(request_id)
        }
    }
}

/// Fan-out unter der Tabellen-Sperre
fn verteilen(
    state: &SignalingState,
    room_id: &RoomId,
    nachricht: &GespeicherteNachricht,
    absender: &ConnectionId,
) -> usize {
    let tabellen = state.tabellen.lock();
    MessageRelay::verteilen(&tabellen.rooms, &state.broadcaster, room_id, nachricht, absender)
}

/// Verarbeitet typing_start
///
/// Die User-ID stammt aus der Identitaet der Verbindung, nicht aus dem Payload.
pub fn handle_typing_start(
    request: TypingRequest,
    connection_id: ConnectionId,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) {
    let tabellen = state.tabellen.lock();
    TypingCoordinator::tippen_weiterleiten(
        &tabellen.rooms,
        &state.broadcaster,
        &request.room_id,
        user_id,
        &connection_id,
    );
}

/// Verarbeitet typing_stop
pub fn handle_typing_stop(
    request: TypingRequest,
    connection_id: ConnectionId,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) {
    let tabellen = state.tabellen.lock();
    TypingCoordinator::tippen_beenden_weiterleiten(
        &tabellen.rooms,
        &state.broadcaster,
        &request.room_id,
        user_id,
        &connection_id,
    );
}

/// Verarbeitet eine History-Anfrage
pub async fn handle_load_history(
    request: HistoryRequest,
    request_id: u32,
    state: &Arc<SignalingState>,
) -> ServerMessage {
    let before: Option<DateTime<Utc>> = match request.before.as_deref() {
        None => None,
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                return ServerMessage::error(
                    request_id,
                    ErrorCode::InvalidRequest,
                    "Ungueltiger Zeitstempel in 'before' (RFC 3339 erwartet)",
                );
            }
        },
    };

    let anfrage = HistoryAnfrage {
        room_id: request.room_id.clone(),
        before,
        limit: request.limit.map(|l| l as usize),
    };

    match state.store.history_laden(anfrage).await {
        Ok(nachrichten) => ServerMessage::new(
            request_id,
            ServerPayload::History(HistoryResponse {
                room_id: request.room_id,
                messages: nachrichten.iter().map(nachricht_info).collect(),
            }),
        ),
        Err(e) => {
            tracing::warn!(room_id = %request.room_id, fehler = %e, "History laden fehlgeschlagen");
            SignalingError::from(e).als_antwort(request_id)
        }
    }
}
