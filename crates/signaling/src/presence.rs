//! Presence-Broadcaster – Verteilt die Menge der online Benutzer
//!
//! Bei jedem Online/Offline-Wechsel eines Benutzers wird genau ein Snapshot
//! aller online Benutzer an jede offene Verbindung gesendet. Verbindungen,
//! deren Identifizierung keinen Wechsel ausloest (zweites Geraet), erhalten
//! den aktuellen Snapshot direkt.

use instatalk_core::types::ConnectionId;
use instatalk_protocol::control::{PresenceSnapshot, ServerMessage, ServerPayload};

use crate::broadcast::EventBroadcaster;
use crate::registry::ConnectionRegistry;

/// Verteilt Presence-Snapshots ueber den EventBroadcaster
pub struct PresenceBroadcaster;

impl PresenceBroadcaster {
    /// Baut den aktuellen Snapshot aus der Registry
    pub fn snapshot(registry: &ConnectionRegistry) -> PresenceSnapshot {
        PresenceSnapshot {
            online: registry.online_user(),
        }
    }

    /// Sendet den Snapshot an alle offenen Verbindungen
    ///
    /// Gibt die Anzahl der erreichten Verbindungen zurueck.
    pub fn veroeffentlichen(registry: &ConnectionRegistry, broadcaster: &EventBroadcaster) -> usize {
        let snapshot = Self::snapshot(registry);
        let online = snapshot.online.len();
        let nachricht = ServerMessage::push(ServerPayload::PresenceSnapshot(snapshot));
        let erreicht = broadcaster.an_alle_senden(&nachricht);

        tracing::debug!(online, erreicht, "Presence-Snapshot veroeffentlicht");
        erreicht
    }

    /// Sendet den Snapshot nur an eine Verbindung
    pub fn snapshot_an(
        connection_id: &ConnectionId,
        registry: &ConnectionRegistry,
        broadcaster: &EventBroadcaster,
    ) -> bool {
        let nachricht = ServerMessage::push(ServerPayload::PresenceSnapshot(Self::snapshot(registry)));
        broadcaster.an_verbindung_senden(connection_id, nachricht)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instatalk_core::types::UserId;

    fn online_aus(nachricht: ServerMessage) -> Vec<UserId> {
        match nachricht.payload {
            ServerPayload::PresenceSnapshot(s) => s.online,
            andere => panic!("Erwartet PresenceSnapshot, erhalten {andere:?}"),
        }
    }

    #[test]
    fn veroeffentlichen_erreicht_auch_unidentifizierte() {
        let broadcaster = EventBroadcaster::neu();
        let mut registry = ConnectionRegistry::neu();

        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        let mut rx1 = broadcaster.verbindung_registrieren(c1);
        let mut rx2 = broadcaster.verbindung_registrieren(c2);
        registry.registrieren(c1, UserId::parse("alice").unwrap());

        assert_eq!(PresenceBroadcaster::veroeffentlichen(&registry, &broadcaster), 2);

        let alice = vec![UserId::parse("alice").unwrap()];
        assert_eq!(online_aus(rx1.try_recv().unwrap()), alice);
        assert_eq!(online_aus(rx2.try_recv().unwrap()), alice);
    }

    #[test]
    fn snapshot_an_einzelne_verbindung() {
        let broadcaster = EventBroadcaster::neu();
        let registry = ConnectionRegistry::neu();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        let mut rx1 = broadcaster.verbindung_registrieren(c1);
        let mut rx2 = broadcaster.verbindung_registrieren(c2);

        assert!(PresenceBroadcaster::snapshot_an(&c1, &registry, &broadcaster));
        assert!(online_aus(rx1.try_recv().unwrap()).is_empty());
        assert!(rx2.try_recv().is_err());
    }
}
