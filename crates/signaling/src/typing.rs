//! Typing-Coordinator – Tipp-Indikatoren im Raum weiterleiten
//!
//! Zustandslos: kein Timer, keine Deduplizierung. Wiederholte Events werden
//! einfach erneut verteilt.

use instatalk_core::types::{ConnectionId, RoomId, UserId};
use instatalk_protocol::control::{ServerMessage, ServerPayload, TypingEvent};

use crate::broadcast::EventBroadcaster;
use crate::rooms::RoomMultiplexer;

/// Leitet typing_start / typing_stop an die anderen Raum-Mitglieder weiter
pub struct TypingCoordinator;

impl TypingCoordinator {
    /// Meldet "tippt gerade" an alle Mitglieder ausser dem Ausloeser
    pub fn tippen_weiterleiten(
        rooms: &RoomMultiplexer,
        broadcaster: &EventBroadcaster,
        room_id: &RoomId,
        user_id: &UserId,
        ausloeser: &ConnectionId,
    ) -> usize {
        let event = ServerPayload::TypingStart(TypingEvent {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
        });
        Self::an_raum(rooms, broadcaster, room_id, ausloeser, event)
    }

    /// Meldet "tippt nicht mehr" an alle Mitglieder ausser dem Ausloeser
    pub fn tippen_beenden_weiterleiten(
        rooms: &RoomMultiplexer,
        broadcaster: &EventBroadcaster,
        room_id: &RoomId,
        user_id: &UserId,
        ausloeser: &ConnectionId,
    ) -> usize {
        let event = ServerPayload::TypingStop(TypingEvent {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
        });
        Self::an_raum(rooms, broadcaster, room_id, ausloeser, event)
    }

    fn an_raum(
        rooms: &RoomMultiplexer,
        broadcaster: &EventBroadcaster,
        room_id: &RoomId,
        ausloeser: &ConnectionId,
        event: ServerPayload,
    ) -> usize {
        let mitglieder = rooms.mitglieder_von(room_id);
        broadcaster.an_verbindungen_ausser_senden(&mitglieder, ausloeser, &ServerMessage::push(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_und_stop_erreichen_nur_andere() {
        let broadcaster = EventBroadcaster::neu();
        let mut rooms = RoomMultiplexer::neu();
        let raum = RoomId::parse("r1").unwrap();
        let alice = UserId::parse("alice").unwrap();

        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut rx_a = broadcaster.verbindung_registrieren(a);
        let mut rx_b = broadcaster.verbindung_registrieren(b);
        rooms.beitreten(a, raum.clone());
        rooms.beitreten(b, raum.clone());

        assert_eq!(TypingCoordinator::tippen_weiterleiten(&rooms, &broadcaster, &raum, &alice, &a), 1);
        assert_eq!(
            TypingCoordinator::tippen_beenden_weiterleiten(&rooms, &broadcaster, &raum, &alice, &a),
            1
        );

        assert!(matches!(
            rx_b.try_recv().unwrap().payload,
            ServerPayload::TypingStart(ref e) if e.user_id == alice
        ));
        assert!(matches!(rx_b.try_recv().unwrap().payload, ServerPayload::TypingStop(_)));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn wiederholung_wird_erneut_verteilt() {
        let broadcaster = EventBroadcaster::neu();
        let mut rooms = RoomMultiplexer::neu();
        let raum = RoomId::parse("r1").unwrap();
        let alice = UserId::parse("alice").unwrap();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let _rx_a = broadcaster.verbindung_registrieren(a);
        let mut rx_b = broadcaster.verbindung_registrieren(b);
        rooms.beitreten(a, raum.clone());
        rooms.beitreten(b, raum.clone());

        for _ in 0..3 {
            TypingCoordinator::tippen_weiterleiten(&rooms, &broadcaster, &raum, &alice, &a);
        }
        let mut anzahl = 0;
        while rx_b.try_recv().is_ok() {
            anzahl += 1;
        }
        assert_eq!(anzahl, 3);
    }
}
