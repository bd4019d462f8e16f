//! Gemeinsamer Relay-Zustand
//!
//! Haelt Konfiguration, Kollaborateure und die vier Relay-Tabellen. Die
//! Tabellen (Registry, Raeume, Anrufe, Verbindungszustaende) liegen
//! gemeinsam hinter einer einzigen Sperre: jede Aenderung und jedes daraus
//! folgende Senden passiert in einem Sperrabschnitt. Unter dieser Sperre
//! wird nie auf I/O gewartet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use instatalk_auth::IdentityResolver;
use instatalk_chat::MessageStore;
use instatalk_core::types::{ConnectionId, RoomId};
use parking_lot::Mutex;
use serde::Serialize;

use crate::broadcast::EventBroadcaster;
use crate::call::CallSignalingStateMachine;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMultiplexer;

/// Konfiguration fuer den Relay
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Relays (fuer Logs und /stats)
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_verbindungen: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "InstaTalk Relay".to_string(),
            max_verbindungen: 10_000,
            keepalive_sek: 25,
            verbindungs_timeout_sek: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Lebenszyklus einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerbindungsZustand {
    /// Offen, Identitaet noch nicht angekuendigt
    Verbindend,
    /// Identitaet angekuendigt und in der Registry
    Identifiziert,
    /// Getrennt, alle Eintraege entfernt
    Geschlossen,
}

// ---------------------------------------------------------------------------
// RelayTabellen
// ---------------------------------------------------------------------------

/// Alle veraenderlichen Relay-Tabellen
#[derive(Debug, Default)]
pub struct RelayTabellen {
    pub registry: ConnectionRegistry,
    pub rooms: RoomMultiplexer,
    pub anrufe: CallSignalingStateMachine,
    /// Offene Verbindungen; geschlossene werden entfernt
    pub verbindungen: HashMap<ConnectionId, VerbindungsZustand>,
}

impl RelayTabellen {
    /// Zustand einer Verbindung; unbekannte gelten als geschlossen
    pub fn zustand_von(&self, connection_id: &ConnectionId) -> VerbindungsZustand {
        self.verbindungen
            .get(connection_id)
            .copied()
            .unwrap_or(VerbindungsZustand::Geschlossen)
    }
}

// ---------------------------------------------------------------------------
// Zaehler
// ---------------------------------------------------------------------------

/// Ergebnis eines Anrufversuchs (Label fuer Metriken)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufErgebnis {
    Gestartet,
    Besetzt,
    Ungueltig,
    Angenommen,
}

impl AnrufErgebnis {
    /// Alle Ergebnisse in fester Reihenfolge
    pub const ALLE: [AnrufErgebnis; 4] = [
        AnrufErgebnis::Gestartet,
        AnrufErgebnis::Besetzt,
        AnrufErgebnis::Ungueltig,
        AnrufErgebnis::Angenommen,
    ];

    /// Label-Wert fuer Prometheus
    pub fn label(self) -> &'static str {
        match self {
            Self::Gestartet => "started",
            Self::Besetzt => "busy",
            Self::Ungueltig => "invalid",
            Self::Angenommen => "accepted",
        }
    }
}

/// Monotone Ereigniszaehler des Relays
#[derive(Debug, Default)]
pub struct RelayZaehler {
    nachrichten_verteilt: AtomicU64,
    presence_broadcasts: AtomicU64,
    anruf_versuche: [AtomicU64; 4],
}

impl RelayZaehler {
    pub fn nachricht_verteilt(&self) {
        self.nachrichten_verteilt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn presence_veroeffentlicht(&self) {
        self.presence_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn anruf_versuch(&self, ergebnis: AnrufErgebnis) {
        self.anruf_versuche[ergebnis as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn nachrichten_verteilt_gesamt(&self) -> u64 {
        self.nachrichten_verteilt.load(Ordering::Relaxed)
    }

    pub fn presence_broadcasts_gesamt(&self) -> u64 {
        self.presence_broadcasts.load(Ordering::Relaxed)
    }

    pub fn anruf_versuche_gesamt(&self, ergebnis: AnrufErgebnis) -> u64 {
        self.anruf_versuche[ergebnis as usize].load(Ordering::Relaxed)
    }
}

/// Momentaufnahme fuer /stats und Metriken
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatistik {
    pub server_name: String,
    pub offene_verbindungen: usize,
    pub online_user: usize,
    pub aktive_raeume: usize,
    pub aktive_anrufe: usize,
    pub nachrichten_verteilt: u64,
    pub presence_broadcasts: u64,
    pub uptime_sek: u64,
}

// ---------------------------------------------------------------------------
// SignalingState
// ---------------------------------------------------------------------------

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Relay-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Alle Relay-Tabellen hinter einer Sperre
    pub tabellen: Mutex<RelayTabellen>,
    /// Ausgangs-Queues der offenen Verbindungen
    pub broadcaster: EventBroadcaster,
    /// Persistenz-Kollaborateur
    pub store: Arc<dyn MessageStore>,
    /// Identitaets-Kollaborateur
    pub identitaet: Arc<dyn IdentityResolver>,
    /// Ereigniszaehler
    pub zaehler: RelayZaehler,
    /// Schreibsperren pro Raum (speichern -> verteilen)
    raum_sperren: DashMap<RoomId, Arc<tokio::sync::Mutex<()>>>,
    /// Startzeitpunkt (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(
        config: SignalingConfig,
        store: Arc<dyn MessageStore>,
        identitaet: Arc<dyn IdentityResolver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            tabellen: Mutex::new(RelayTabellen::default()),
            broadcaster: EventBroadcaster::neu(),
            store,
            identitaet,
            zaehler: RelayZaehler::default(),
            raum_sperren: DashMap::new(),
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Schreibsperre eines Raums holen (wird bei Bedarf angelegt)
    pub fn raum_sperre(&self, room_id: &RoomId) -> Arc<tokio::sync::Mutex<()>> {
        self.raum_sperren
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Gibt eine Schreibsperre zurueck und entfernt sie, wenn niemand mehr wartet
    pub fn raum_sperre_freigeben(&self, room_id: &RoomId, sperre: Arc<tokio::sync::Mutex<()>>) {
        drop(sperre);
        self.raum_sperren
            .remove_if(room_id, |_, s| Arc::strong_count(s) == 1);
    }

    /// Anzahl der aktuell gehaltenen Raum-Schreibsperren
    pub fn raum_sperren_anzahl(&self) -> usize {
        self.raum_sperren.len()
    }

    /// Momentaufnahme aller Kennzahlen
    pub fn statistik(&self) -> RelayStatistik {
        let tabellen = self.tabellen.lock();
        RelayStatistik {
            server_name: self.config.server_name.clone(),
            offene_verbindungen: tabellen.verbindungen.len(),
            online_user: tabellen.registry.online_anzahl(),
            aktive_raeume: tabellen.rooms.raum_anzahl(),
            aktive_anrufe: tabellen.anrufe.aktive_anzahl(),
            nachrichten_verteilt: self.zaehler.nachrichten_verteilt_gesamt(),
            presence_broadcasts: self.zaehler.presence_broadcasts_gesamt(),
            uptime_sek: self.uptime_sek(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instatalk_auth::TrustedIdentity;
    use instatalk_chat::InMemoryStore;

    fn test_state() -> Arc<SignalingState> {
        SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(InMemoryStore::neu()),
            Arc::new(TrustedIdentity),
        )
    }

    #[test]
    fn unbekannte_verbindung_gilt_als_geschlossen() {
        let tabellen = RelayTabellen::default();
        assert_eq!(
            tabellen.zustand_von(&ConnectionId::new()),
            VerbindungsZustand::Geschlossen
        );
    }

    #[tokio::test]
    async fn raum_sperre_wird_aufgeraeumt() {
        let state = test_state();
        let raum = RoomId::parse("r1").unwrap();

        let sperre = state.raum_sperre(&raum);
        let zweite = state.raum_sperre(&raum);
        assert!(Arc::ptr_eq(&sperre, &zweite), "Gleicher Raum, gleiche Sperre");

        state.raum_sperre_freigeben(&raum, zweite);
        assert_eq!(state.raum_sperren_anzahl(), 1, "Noch gehalten");
        state.raum_sperre_freigeben(&raum, sperre);
        assert_eq!(state.raum_sperren_anzahl(), 0);
    }

    #[test]
    fn zaehler_pro_anruf_ergebnis() {
        let state = test_state();
        state.zaehler.anruf_versuch(AnrufErgebnis::Gestartet);
        state.zaehler.anruf_versuch(AnrufErgebnis::Gestartet);
        state.zaehler.anruf_versuch(AnrufErgebnis::Besetzt);

        assert_eq!(state.zaehler.anruf_versuche_gesamt(AnrufErgebnis::Gestartet), 2);
        assert_eq!(state.zaehler.anruf_versuche_gesamt(AnrufErgebnis::Besetzt), 1);
        assert_eq!(state.zaehler.anruf_versuche_gesamt(AnrufErgebnis::Angenommen), 0);
        assert_eq!(state.statistik().offene_verbindungen, 0);
    }
}
