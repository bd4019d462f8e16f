//! Connection-Registry – Wer ist online, ueber welche Verbindungen?
//!
//! Ein Benutzer ist online genau dann, wenn mindestens eine identifizierte
//! Verbindung offen ist. Mehrere Geraete pro Benutzer sind erlaubt; nur der
//! Uebergang 0 -> 1 bzw. 1 -> 0 Verbindungen aendert den Online-Status.
//!
//! Die Registry ist eine reine Tabelle ohne eigene Sperre. Sie lebt in
//! `RelayTabellen` und wird nur unter deren Mutex veraendert.

use std::collections::{HashMap, HashSet};

use instatalk_core::types::{ConnectionId, UserId};

/// Ergebnis einer Registry-Aenderung fuer den Online-Status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uebergang {
    /// Erste Verbindung des Benutzers (0 -> 1)
    Online,
    /// Letzte Verbindung des Benutzers geschlossen (1 -> 0)
    Offline,
    /// Online-Status unveraendert
    Unveraendert,
}

impl Uebergang {
    /// Gibt true zurueck wenn eine Presence-Veroeffentlichung faellig ist
    pub fn ist_wechsel(self) -> bool {
        !matches!(self, Self::Unveraendert)
    }
}

/// User -> Verbindungen, plus Rueckwaerts-Index Verbindung -> User
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    verbindungen: HashMap<UserId, HashSet<ConnectionId>>,
    besitzer: HashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Ordnet eine Verbindung einem Benutzer zu
    ///
    /// Idempotent. Eine Verbindung gehoert hoechstens einem Benutzer; eine
    /// bereits anderweitig registrierte Verbindung wird vorher abgemeldet.
    pub fn registrieren(&mut self, connection_id: ConnectionId, user_id: UserId) -> Uebergang {
        if let Some(bisher) = self.besitzer.get(&connection_id) {
            if bisher == &user_id {
                return Uebergang::Unveraendert;
            }
            tracing::warn!(
                connection_id = %connection_id,
                bisher = %bisher,
                neu = %user_id,
                "Verbindung wechselt den Benutzer"
            );
            self.abmelden(&connection_id);
        }

        let eintrag = self.verbindungen.entry(user_id.clone()).or_default();
        let war_offline = eintrag.is_empty();
        eintrag.insert(connection_id);
        self.besitzer.insert(connection_id, user_id);

        if war_offline {
            Uebergang::Online
        } else {
            Uebergang::Unveraendert
        }
    }

    /// Entfernt eine Verbindung und gibt ihren Benutzer samt Uebergang zurueck
    ///
    /// Gibt `None` zurueck wenn die Verbindung nie registriert war.
    pub fn abmelden(&mut self, connection_id: &ConnectionId) -> Option<(UserId, Uebergang)> {
        let user_id = self.besitzer.remove(connection_id)?;

        let uebergang = match self.verbindungen.get_mut(&user_id) {
            Some(eintrag) => {
                eintrag.remove(connection_id);
                if eintrag.is_empty() {
                    self.verbindungen.remove(&user_id);
                    Uebergang::Offline
                } else {
                    Uebergang::Unveraendert
                }
            }
            None => Uebergang::Unveraendert,
        };

        Some((user_id, uebergang))
    }

    /// Prueft ob ein Benutzer mindestens eine offene Verbindung hat
    pub fn ist_online(&self, user_id: &UserId) -> bool {
        self.verbindungen.contains_key(user_id)
    }

    /// Alle Verbindungen eines Benutzers
    pub fn verbindungen_von(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.verbindungen
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Anzahl der Verbindungen eines Benutzers
    pub fn verbindungs_anzahl_von(&self, user_id: &UserId) -> usize {
        self.verbindungen.get(user_id).map_or(0, HashSet::len)
    }

    /// Benutzer einer Verbindung
    pub fn user_von(&self, connection_id: &ConnectionId) -> Option<&UserId> {
        self.besitzer.get(connection_id)
    }

    /// Alle online Benutzer, sortiert fuer deterministische Snapshots
    pub fn online_user(&self) -> Vec<UserId> {
        let mut user: Vec<UserId> = self.verbindungen.keys().cloned().collect();
        user.sort();
        user
    }

    /// Anzahl der online Benutzer
    pub fn online_anzahl(&self) -> usize {
        self.verbindungen.len()
    }

    /// Anzahl der identifizierten Verbindungen
    pub fn verbindungs_anzahl(&self) -> usize {
        self.besitzer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn erste_verbindung_macht_online() {
        let mut reg = ConnectionRegistry::neu();
        let c1 = ConnectionId::new();

        assert_eq!(reg.registrieren(c1, uid("alice")), Uebergang::Online);
        assert!(reg.ist_online(&uid("alice")));
        assert_eq!(reg.user_von(&c1), Some(&uid("alice")));
    }

    #[test]
    fn zweites_geraet_aendert_nichts() {
        let mut reg = ConnectionRegistry::neu();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();

        reg.registrieren(c1, uid("alice"));
        assert_eq!(reg.registrieren(c2, uid("alice")), Uebergang::Unveraendert);
        assert_eq!(reg.verbindungs_anzahl_von(&uid("alice")), 2);
        assert_eq!(reg.online_anzahl(), 1);

        assert_eq!(reg.abmelden(&c1), Some((uid("alice"), Uebergang::Unveraendert)));
        assert!(reg.ist_online(&uid("alice")));
        assert_eq!(reg.abmelden(&c2), Some((uid("alice"), Uebergang::Offline)));
        assert!(!reg.ist_online(&uid("alice")));
    }

    #[test]
    fn registrieren_ist_idempotent() {
        let mut reg = ConnectionRegistry::neu();
        let c1 = ConnectionId::new();

        reg.registrieren(c1, uid("bob"));
        assert_eq!(reg.registrieren(c1, uid("bob")), Uebergang::Unveraendert);
        assert_eq!(reg.verbindungs_anzahl(), 1);
    }

    #[test]
    fn abmelden_unbekannter_verbindung() {
        let mut reg = ConnectionRegistry::neu();
        assert!(reg.abmelden(&ConnectionId::new()).is_none());
    }

    #[test]
    fn online_user_sortiert() {
        let mut reg = ConnectionRegistry::neu();
        reg.registrieren(ConnectionId::new(), uid("carol"));
        reg.registrieren(ConnectionId::new(), uid("alice"));
        reg.registrieren(ConnectionId::new(), uid("bob"));

        assert_eq!(reg.online_user(), vec![uid("alice"), uid("bob"), uid("carol")]);
    }

    #[test]
    fn benutzerwechsel_meldet_alte_zuordnung_ab() {
        let mut reg = ConnectionRegistry::neu();
        let c1 = ConnectionId::new();

        reg.registrieren(c1, uid("alice"));
        assert_eq!(reg.registrieren(c1, uid("bob")), Uebergang::Online);
        assert!(!reg.ist_online(&uid("alice")));
        assert_eq!(reg.user_von(&c1), Some(&uid("bob")));
    }
}
