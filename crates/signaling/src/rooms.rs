//! Room-Multiplexer – Welche Verbindung ist in welchem Raum?
//!
//! Reine Routing-Tabelle ohne Berechtigungspruefung. Zwei Indizes:
//! - Raum -> Verbindungen (fuer Fan-out)
//! - Verbindung -> Raeume (damit `alle_verlassen` nur die eigenen Raeume anfasst)
//!
//! Leere Raeume werden sofort entfernt.

use std::collections::{HashMap, HashSet};

use instatalk_core::types::{ConnectionId, RoomId};

/// Bidirektionaler Index der Raum-Mitgliedschaften
#[derive(Debug, Default)]
pub struct RoomMultiplexer {
    mitglieder: HashMap<RoomId, HashSet<ConnectionId>>,
    beigetreten: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomMultiplexer {
    /// Erstellt einen leeren Multiplexer
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt eine Verbindung einem Raum hinzu
    ///
    /// Gibt `false` zurueck wenn sie bereits Mitglied war.
    pub fn beitreten(&mut self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        let neu = self
            .mitglieder
            .entry(room_id.clone())
            .or_default()
            .insert(connection_id);
        self.beigetreten
            .entry(connection_id)
            .or_default()
            .insert(room_id);
        neu
    }

    /// Entfernt eine Verbindung aus einem Raum
    ///
    /// Gibt `false` zurueck wenn sie kein Mitglied war.
    pub fn verlassen(&mut self, connection_id: &ConnectionId, room_id: &RoomId) -> bool {
        let entfernt = self.aus_raum_entfernen(connection_id, room_id);

        if let Some(raeume) = self.beigetreten.get_mut(connection_id) {
            raeume.remove(room_id);
            if raeume.is_empty() {
                self.beigetreten.remove(connection_id);
            }
        }
        entfernt
    }

    /// Entfernt eine Verbindung aus allen ihren Raeumen
    ///
    /// Gibt die verlassenen Raeume zurueck.
    pub fn alle_verlassen(&mut self, connection_id: &ConnectionId) -> Vec<RoomId> {
        let raeume: Vec<RoomId> = self
            .beigetreten
            .remove(connection_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        for room_id in &raeume {
            self.aus_raum_entfernen(connection_id, room_id);
        }
        raeume
    }

    /// Alle Verbindungen in einem Raum
    pub fn mitglieder_von(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.mitglieder
            .get(room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Alle Raeume einer Verbindung
    pub fn raeume_von(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.beigetreten
            .get(connection_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Prueft ob eine Verbindung Mitglied eines Raums ist
    pub fn ist_mitglied(&self, connection_id: &ConnectionId, room_id: &RoomId) -> bool {
        self.mitglieder
            .get(room_id)
            .is_some_and(|set| set.contains(connection_id))
    }

    /// Anzahl der Raeume mit mindestens einem Mitglied
    pub fn raum_anzahl(&self) -> usize {
        self.mitglieder.len()
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn aus_raum_entfernen(&mut self, connection_id: &ConnectionId, room_id: &RoomId) -> bool {
        let Some(set) = self.mitglieder.get_mut(room_id) else {
            return false;
        };
        let entfernt = set.remove(connection_id);
        if set.is_empty() {
            self.mitglieder.remove(room_id);
        }
        entfernt
    }
}
