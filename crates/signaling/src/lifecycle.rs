//! Lifecycle-Manager – Verbinden, Identifizieren, Trennen
//!
//! ## Zustaende
//! ```text
//! Verbindend --identitaet_ankuendigen--> Identifiziert
//!     |                                      |
//!     +------------- trennen ----------------+--> Geschlossen
//! ```
//!
//! `trennen` raeumt in genau einem Sperrabschnitt auf: Raeume verlassen,
//! haengende Anrufe beenden, aus der Registry abmelden (mit Presence bei
//! Offline-Wechsel), Ausgangs-Queue entfernen. Kein anderer Handler sieht
//! einen halb aufgeraeumten Zustand.

use std::sync::Arc;

use instatalk_core::types::{ConnectionId, UserId};
use instatalk_protocol::control::{IdentifiedResponse, ServerMessage, ServerPayload};
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};
use crate::presence::PresenceBroadcaster;
use crate::server_state::{SignalingState, VerbindungsZustand};

/// Steuert den Lebenszyklus aller Verbindungen
#[derive(Clone)]
pub struct ConnectionLifecycleManager {
    state: Arc<SignalingState>,
}

impl ConnectionLifecycleManager {
    /// Erstellt einen neuen Lifecycle-Manager
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Oeffnet eine neue Verbindung im Zustand `Verbindend`
    ///
    /// Gibt die vergebene ID und die Ausgangs-Queue fuer den Schreib-Task
    /// zurueck.
    pub fn verbinden(
        &self,
    ) -> SignalingResult<(ConnectionId, mpsc::UnboundedReceiver<ServerMessage>)> {
        let mut tabellen = self.state.tabellen.lock();
        if tabellen.verbindungen.len() >= self.state.config.max_verbindungen {
            tracing::warn!(
                max = self.state.config.max_verbindungen,
                "Verbindung abgelehnt: Server voll"
            );
            return Err(SignalingError::ServerVoll);
        }

        let connection_id = ConnectionId::new();
        let ausgang = self.state.broadcaster.verbindung_registrieren(connection_id);
        tabellen
            .verbindungen
            .insert(connection_id, VerbindungsZustand::Verbindend);

        tracing::debug!(connection_id = %connection_id, "Verbindung geoeffnet");
        Ok((connection_id, ausgang))
    }

    /// Kuendigt die Identitaet einer Verbindung an
    ///
    /// Die Aufloesung des Tokens laeuft ausserhalb der Tabellen-Sperre. Bei
    /// Erfolg wird `identified` eingereiht, danach bei Online-Wechsel ein
    /// Presence-Snapshot an alle, sonst nur an diese Verbindung.
    pub async fn identitaet_ankuendigen(
        &self,
        connection_id: ConnectionId,
        token: &str,
        request_id: u32,
    ) -> SignalingResult<UserId> {
        self.zustand_pruefen(&connection_id)?;

        let user_id = match self.state.identitaet.aufloesen(token).await {
            Ok(uid) => uid,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, fehler = %e, "Identitaet abgelehnt");
                return Err(e.into());
            }
        };

        let mut guard = self.state.tabellen.lock();
        let tabellen = &mut *guard;

        // Zwischen Pruefung und Aufloesung kann die Verbindung getrennt worden sein
        match tabellen.zustand_von(&connection_id) {
            VerbindungsZustand::Verbindend => {}
            VerbindungsZustand::Identifiziert => return Err(SignalingError::BereitsIdentifiziert),
            VerbindungsZustand::Geschlossen => return Err(SignalingError::VerbindungGetrennt),
        }

        tabellen
            .verbindungen
            .insert(connection_id, VerbindungsZustand::Identifiziert);
        let uebergang = tabellen.registry.registrieren(connection_id, user_id.clone());

        let broadcaster = &self.state.broadcaster;
        broadcaster.an_verbindung_senden(
            &connection_id,
            ServerMessage::new(
                request_id,
                ServerPayload::Identified(IdentifiedResponse {
                    user_id: user_id.clone(),
                    connection_id,
                }),
            ),
        );

        if uebergang.ist_wechsel() {
            PresenceBroadcaster::veroeffentlichen(&tabellen.registry, broadcaster);
            self.state.zaehler.presence_veroeffentlicht();
        } else {
            PresenceBroadcaster::snapshot_an(&connection_id, &tabellen.registry, broadcaster);
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = %user_id,
            geraete = tabellen.registry.verbindungs_anzahl_von(&user_id),
            "Verbindung identifiziert"
        );
        Ok(user_id)
    }

    /// Trennt eine Verbindung und raeumt alle Eintraege auf
    ///
    /// Idempotent: gibt `false` zurueck wenn die Verbindung schon geschlossen war.
    pub fn trennen(&self, connection_id: &ConnectionId) -> bool {
        let mut guard = self.state.tabellen.lock();
        let tabellen = &mut *guard;
        let broadcaster = &self.state.broadcaster;

        if tabellen.verbindungen.remove(connection_id).is_none() {
            return false;
        }

        let raeume = tabellen.rooms.alle_verlassen(connection_id);

        let mut beendete_anrufe = Vec::new();
        if let Some(user_id) = tabellen.registry.user_von(connection_id).cloned() {
            let letzte_verbindung = tabellen.registry.verbindungs_anzahl_von(&user_id) <= 1;
            beendete_anrufe = tabellen.anrufe.beenden_fuer_verbindung(
                &tabellen.registry,
                broadcaster,
                connection_id,
                &user_id,
                letzte_verbindung,
            );

            if let Some((_, uebergang)) = tabellen.registry.abmelden(connection_id) {
                if uebergang.ist_wechsel() {
                    PresenceBroadcaster::veroeffentlichen(&tabellen.registry, broadcaster);
                    self.state.zaehler.presence_veroeffentlicht();
                }
            }
        }

        broadcaster.verbindung_entfernen(connection_id);

        tracing::info!(
            connection_id = %connection_id,
            raeume = raeume.len(),
            anrufe = beendete_anrufe.len(),
            "Verbindung getrennt"
        );
        true
    }

    /// Aktueller Zustand einer Verbindung
    pub fn zustand(&self, connection_id: &ConnectionId) -> VerbindungsZustand {
        self.state.tabellen.lock().zustand_von(connection_id)
    }

    fn zustand_pruefen(&self, connection_id: &ConnectionId) -> SignalingResult<()> {
        match self.zustand(connection_id) {
            VerbindungsZustand::Verbindend => Ok(()),
            VerbindungsZustand::Identifiziert => Err(SignalingError::BereitsIdentifiziert),
            VerbindungsZustand::Geschlossen => Err(SignalingError::VerbindungGetrennt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::SignalingConfig;
    use instatalk_auth::TrustedIdentity;
    use instatalk_chat::InMemoryStore;
    use instatalk_protocol::control::ErrorCode;

    fn manager(max_verbindungen: usize) -> (Arc<SignalingState>, ConnectionLifecycleManager) {
        let state = SignalingState::neu(
            SignalingConfig {
                max_verbindungen,
                ..Default::default()
            },
            Arc::new(InMemoryStore::neu()),
            Arc::new(TrustedIdentity),
        );
        (state.clone(), ConnectionLifecycleManager::neu(state))
    }

    #[tokio::test]
    async fn identifizieren_sendet_identified_dann_presence() {
        let (_state, lm) = manager(10);
        let (cid, mut rx) = lm.verbinden().unwrap();
        assert_eq!(lm.zustand(&cid), VerbindungsZustand::Verbindend);

        let uid = lm.identitaet_ankuendigen(cid, "alice", 5).await.unwrap();
        assert_eq!(uid.as_str(), "alice");
        assert_eq!(lm.zustand(&cid), VerbindungsZustand::Identifiziert);

        let erste = rx.try_recv().unwrap();
        assert_eq!(erste.request_id, 5);
        assert!(matches!(erste.payload, ServerPayload::Identified(_)));
        assert!(matches!(rx.try_recv().unwrap().payload, ServerPayload::PresenceSnapshot(_)));
    }

    #[tokio::test]
    async fn zweite_ankuendigung_abgelehnt() {
        let (_state, lm) = manager(10);
        let (cid, _rx) = lm.verbinden().unwrap();
        lm.identitaet_ankuendigen(cid, "alice", 1).await.unwrap();

        let fehler = lm.identitaet_ankuendigen(cid, "bob", 2).await.unwrap_err();
        assert_eq!(fehler.error_code(), ErrorCode::AlreadyIdentified);
    }

    #[tokio::test]
    async fn abgelehnte_identitaet_registriert_nichts() {
        let (state, lm) = manager(10);
        let (cid, _rx) = lm.verbinden().unwrap();

        let fehler = lm.identitaet_ankuendigen(cid, "  ", 1).await.unwrap_err();
        assert_eq!(fehler.error_code(), ErrorCode::IdentityRejected);
        assert_eq!(state.tabellen.lock().registry.online_anzahl(), 0);
        assert_eq!(lm.zustand(&cid), VerbindungsZustand::Verbindend);
    }

    #[tokio::test]
    async fn trennen_ist_idempotent() {
        let (state, lm) = manager(10);
        let (cid, _rx) = lm.verbinden().unwrap();
        lm.identitaet_ankuendigen(cid, "alice", 1).await.unwrap();

        assert!(lm.trennen(&cid));
        assert!(!lm.trennen(&cid));
        assert_eq!(lm.zustand(&cid), VerbindungsZustand::Geschlossen);
        assert!(!state.broadcaster.ist_registriert(&cid));
        assert_eq!(state.statistik().online_user, 0);
    }

    #[tokio::test]
    async fn server_voll() {
        let (_state, lm) = manager(1);
        let _erste = lm.verbinden().unwrap();
        let fehler = lm.verbinden().unwrap_err();
        assert_eq!(fehler.error_code(), ErrorCode::ServerFull);
    }

    #[tokio::test]
    async fn ankuendigen_nach_trennen() {
        let (_state, lm) = manager(10);
        let (cid, _rx) = lm.verbinden().unwrap();
        lm.trennen(&cid);

        let fehler = lm.identitaet_ankuendigen(cid, "alice", 1).await.unwrap_err();
        assert!(matches!(fehler, SignalingError::VerbindungGetrennt));
    }
}
