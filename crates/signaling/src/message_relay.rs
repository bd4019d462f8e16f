//! Message-Relay – Fan-out gespeicherter Nachrichten an einen Raum
//!
//! Der Relay verteilt nur Nachrichten, die der Persistenz-Dienst bereits
//! bestaetigt hat. Die Reihenfolge "speichern, dann verteilen" sichert der
//! Chat-Handler ueber eine Schreibsperre pro Raum; diese Funktion wird
//! danach unter der Tabellen-Sperre aufgerufen.

use instatalk_chat::GespeicherteNachricht;
use instatalk_core::types::{ConnectionId, RoomId};
use instatalk_protocol::control::{MessageEvent, MessageInfo, ServerMessage, ServerPayload};

use crate::broadcast::EventBroadcaster;
use crate::rooms::RoomMultiplexer;

/// Wandelt den gespeicherten Datensatz in das Wire-Format
pub fn nachricht_info(nachricht: &GespeicherteNachricht) -> MessageInfo {
    MessageInfo {
        message_id: nachricht.id.to_string(),
        room_id: nachricht.room_id.clone(),
        sender_id: nachricht.sender_id.clone(),
        content: nachricht.content.clone(),
        created_at: nachricht.created_at.to_rfc3339(),
    }
}

/// Verteilt gespeicherte Nachrichten an Raum-Mitglieder
pub struct MessageRelay;

impl MessageRelay {
    /// Sendet `message_received` an alle Mitglieder des Raums ausser dem Absender
    ///
    /// Ein Raum ohne (weitere) Mitglieder ist kein Fehler. Gibt die Anzahl
    /// der Empfaenger-Verbindungen zurueck.
    pub fn verteilen(
        rooms: &RoomMultiplexer,
        broadcaster: &EventBroadcaster,
        room_id: &RoomId,
        nachricht: &GespeicherteNachricht,
        absender: &ConnectionId,
    ) -> usize {
        let mitglieder = rooms.mitglieder_von(room_id);
        if mitglieder.is_empty() {
            tracing::trace!(room_id = %room_id, "Fan-out in leeren Raum");
            return 0;
        }

        let event = ServerMessage::push(ServerPayload::MessageReceived(MessageEvent {
            message: nachricht_info(nachricht),
        }));
        let zugestellt = broadcaster.an_verbindungen_ausser_senden(&mitglieder, absender, &event);

        tracing::debug!(
            room_id = %room_id,
            message_id = %nachricht.id,
            zugestellt,
            "Nachricht verteilt"
        );
        zugestellt
    }
}
