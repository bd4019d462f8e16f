//! Event-Broadcaster – Sendet Events an die Ausgangs-Queues der Verbindungen
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller offenen Verbindungen
//! und stellt Methoden bereit, um Nachrichten gezielt oder an alle zu senden.
//! Welche Verbindungen ein Event erhalten, entscheiden Registry und
//! RoomMultiplexer; der Broadcaster kennt nur Verbindungs-IDs.
//!
//! ## Selektives Senden
//! - An eine Verbindung: `an_verbindung_senden`
//! - An eine Liste von Verbindungen: `an_verbindungen_senden`
//! - An eine Liste ausser dem Ausloeser: `an_verbindungen_ausser_senden`
//! - An alle offenen Verbindungen: `an_alle_senden`
//!
//! Die Queues sind unbegrenzt: `senden` blockiert nie und verwirft nichts,
//! solange die Verbindung offen ist. Damit kann unter der Tabellen-Sperre
//! gesendet werden, ohne die Reihenfolge pro Verbindung zu verlieren.

use dashmap::DashMap;
use instatalk_core::types::ConnectionId;
use instatalk_protocol::control::ServerMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer offenen Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub connection_id: ConnectionId,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ClientSender {
    /// Reiht eine Nachricht nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn der Schreib-Task bereits beendet ist.
    pub fn senden(&self, nachricht: ServerMessage) -> bool {
        match self.tx.send(nachricht) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    "Send-Queue geschlossen (Verbindung getrennt)"
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle offenen Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Sender, indiziert nach Verbindung
    verbindungen: DashMap<ConnectionId, ClientSender>,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                verbindungen: DashMap::new(),
            }),
        }
    }

    /// Registriert eine Verbindung und gibt ihre Empfangs-Queue zurueck
    ///
    /// Der Schreib-Task der `ClientConnection` liest aus dieser Queue und
    /// sendet via WebSocket.
    pub fn verbindung_registrieren(
        &self,
        connection_id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ClientSender { connection_id, tx };
        self.inner.verbindungen.insert(connection_id, sender);
        tracing::debug!(connection_id = %connection_id, "Verbindung im Broadcaster registriert");
        rx
    }

    /// Entfernt eine Verbindung
    ///
    /// Bereits eingereihte Nachrichten bleiben in der Queue und werden vom
    /// Schreib-Task noch ausgeliefert, danach endet die Queue.
    pub fn verbindung_entfernen(&self, connection_id: &ConnectionId) -> bool {
        let entfernt = self.inner.verbindungen.remove(connection_id).is_some();
        if entfernt {
            tracing::debug!(connection_id = %connection_id, "Verbindung aus Broadcaster entfernt");
        }
        entfernt
    }

    /// Sendet eine Nachricht an eine einzelne Verbindung
    ///
    /// Gibt `true` zurueck wenn die Verbindung gefunden und die Nachricht eingereiht wurde.
    pub fn an_verbindung_senden(&self, connection_id: &ConnectionId, nachricht: ServerMessage) -> bool {
        match self.inner.verbindungen.get(connection_id) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::trace!(connection_id = %connection_id, "Senden an unbekannte Verbindung");
                false
            }
        }
    }

    /// Sendet eine Nachricht an mehrere Verbindungen
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_verbindungen_senden<'a>(
        &self,
        verbindungen: impl IntoIterator<Item = &'a ConnectionId>,
        nachricht: &ServerMessage,
    ) -> usize {
        verbindungen
            .into_iter()
            .filter(|cid| self.an_verbindung_senden(cid, nachricht.clone()))
            .count()
    }

    /// Sendet eine Nachricht an mehrere Verbindungen ausser einer
    ///
    /// Nuetzlich um Raum-Events zu verteilen ohne den Ausloeser zu informieren.
    pub fn an_verbindungen_ausser_senden<'a>(
        &self,
        verbindungen: impl IntoIterator<Item = &'a ConnectionId>,
        ausgeschlossen: &ConnectionId,
        nachricht: &ServerMessage,
    ) -> usize {
        self.an_verbindungen_senden(
            verbindungen.into_iter().filter(|cid| *cid != ausgeschlossen),
            nachricht,
        )
    }

    /// Sendet eine Nachricht an alle offenen Verbindungen
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, nachricht: &ServerMessage) -> usize {
        let mut gesendet = 0;
        self.inner.verbindungen.iter().for_each(|entry| {
            if entry.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Gibt die Anzahl der registrierten Verbindungen zurueck
    pub fn verbindung_anzahl(&self) -> usize {
        self.inner.verbindungen.len()
    }

    /// Prueft ob eine Verbindung registriert ist
    pub fn ist_registriert(&self, connection_id: &ConnectionId) -> bool {
        self.inner.verbindungen.contains_key(connection_id)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_nachricht(ts: u64) -> ServerMessage {
        ServerMessage::ping(ts)
    }

    #[tokio::test]
    async fn verbindung_registrieren_und_senden() {
        let broadcaster = EventBroadcaster::neu();
        let cid = ConnectionId::new();

        let mut rx = broadcaster.verbindung_registrieren(cid);
        assert!(broadcaster.ist_registriert(&cid));

        assert!(broadcaster.an_verbindung_senden(&cid, test_nachricht(1)));

        let empfangen = rx.try_recv().expect("Nachricht muss vorhanden sein");
        assert_eq!(empfangen.request_id, 0);
    }

    #[tokio::test]
    async fn an_verbindungen_ausser_senden() {
        let broadcaster = EventBroadcaster::neu();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();

        let mut rx_a = broadcaster.verbindung_registrieren(a);
        let mut rx_b = broadcaster.verbindung_registrieren(b);
        let mut rx_c = broadcaster.verbindung_registrieren(c);

        // a ist der Ausloeser, c ist nicht adressiert
        let gesendet = broadcaster.an_verbindungen_ausser_senden(&[a, b], &a, &test_nachricht(20));
        assert_eq!(gesendet, 1);

        assert!(rx_a.try_recv().is_err(), "Ausloeser darf nichts empfangen");
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn an_alle_senden() {
        let broadcaster = EventBroadcaster::neu();

        let mut receivers: Vec<_> = (0..5)
            .map(|_| broadcaster.verbindung_registrieren(ConnectionId::new()))
            .collect();

        assert_eq!(broadcaster.an_alle_senden(&test_nachricht(99)), 5);
        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn entfernen_liefert_eingereihte_nachrichten_noch_aus() {
        let broadcaster = EventBroadcaster::neu();
        let cid = ConnectionId::new();
        let mut rx = broadcaster.verbindung_registrieren(cid);

        broadcaster.an_verbindung_senden(&cid, test_nachricht(1));
        assert!(broadcaster.verbindung_entfernen(&cid));
        assert!(!broadcaster.verbindung_entfernen(&cid));

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none(), "Queue muss nach dem Entfernen enden");
        assert!(!broadcaster.an_verbindung_senden(&cid, test_nachricht(2)));
    }

    #[test]
    fn reihenfolge_pro_verbindung_bleibt_erhalten() {
        let broadcaster = EventBroadcaster::neu();
        let cid = ConnectionId::new();
        let mut rx = broadcaster.verbindung_registrieren(cid);

        for ts in 1..=10 {
            broadcaster.an_verbindung_senden(&cid, test_nachricht(ts));
        }
        for ts in 1..=10 {
            match rx.try_recv().map(|m| m.payload) {
                Ok(instatalk_protocol::ServerPayload::Ping(p)) => assert_eq!(p.timestamp_ms, ts),
                andere => panic!("Erwartet Ping {ts}, erhalten {andere:?}"),
            }
        }
    }
}
