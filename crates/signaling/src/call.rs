//! Anruf-Signaling – Zustandsmaschine pro Benutzerpaar
//!
//! Der Relay transportiert keine Medien. Er vermittelt nur Offer, Answer,
//! ICE-Kandidaten und das Ende eines Anrufs zwischen zwei Benutzern.
//!
//! ## Zustaende
//! ```text
//! (keine Sitzung) --anrufen--> Klingelt --annehmen--> Verbunden
//!                                  |                      |
//!                                  +------beenden---------+--> (Sitzung entfernt)
//! ```
//!
//! Pro ungeordnetem Benutzerpaar existiert hoechstens eine Sitzung. Beendete
//! Sitzungen werden sofort entfernt; eine neue Anruf-ID pro Versuch verhindert
//! Verwechslungen verspaeteter Events.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use instatalk_core::types::{CallId, ConnectionId, UserId};
use instatalk_protocol::control::{
    CallAccepted, CallAnsweredElsewhere, CallEnded, CallIncoming, CallKind, CallStartedResponse,
    EndReason, IceCandidateEvent, ServerMessage, ServerPayload,
};

use crate::broadcast::EventBroadcaster;
use crate::error::{SignalingError, SignalingResult};
use crate::registry::ConnectionRegistry;

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Ungeordnetes Benutzerpaar als Sitzungsschluessel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnrufSchluessel(UserId, UserId);

impl AnrufSchluessel {
    /// Erstellt den Schluessel unabhaengig von der Reihenfolge
    pub fn neu(a: &UserId, b: &UserId) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }
}

/// Zustand einer laufenden Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufZustand {
    /// Angebot zugestellt, noch nicht angenommen
    Klingelt,
    /// Angenommen, Medien laufen Peer-to-Peer
    Verbunden,
}

/// Eine aktive Anruf-Sitzung
#[derive(Debug, Clone)]
pub struct AnrufSitzung {
    pub call_id: CallId,
    pub anrufer: UserId,
    pub angerufener: UserId,
    pub art: CallKind,
    pub zustand: AnrufZustand,
    pub erstellt_am: DateTime<Utc>,
    /// Verbindung, ueber die der Anruf gestartet wurde
    pub anrufer_verbindung: ConnectionId,
    /// Geraet des Angerufenen, das angenommen hat
    pub annehmende_verbindung: Option<ConnectionId>,
}

impl AnrufSitzung {
    /// Prueft ob die Verbindung fuer diese Sitzung tragend ist
    fn haengt_an(&self, connection_id: &ConnectionId) -> bool {
        self.anrufer_verbindung == *connection_id
            || self.annehmende_verbindung == Some(*connection_id)
    }

    /// Grund, wenn der Client beim Auflegen keinen angibt
    fn abgeleiteter_grund(&self, beender: &UserId) -> EndReason {
        match self.zustand {
            AnrufZustand::Verbunden => EndReason::AcceptedThenHangup,
            AnrufZustand::Klingelt if beender == &self.angerufener => EndReason::Rejected,
            AnrufZustand::Klingelt => EndReason::CallerCancelled,
        }
    }
}

/// Parameter eines neuen Anrufs
#[derive(Debug, Clone)]
pub struct AnrufStart {
    pub anrufer: UserId,
    pub anrufer_verbindung: ConnectionId,
    pub angerufener: UserId,
    pub art: CallKind,
    pub offer: serde_json::Value,
    pub anrufer_name: Option<String>,
    pub anrufer_avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// CallSignalingStateMachine
// ---------------------------------------------------------------------------

/// Alle aktiven Anruf-Sitzungen, plus Index User -> Sitzungen
#[derive(Debug, Default)]
pub struct CallSignalingStateMachine {
    sitzungen: HashMap<AnrufSchluessel, AnrufSitzung>,
    nach_user: HashMap<UserId, HashSet<AnrufSchluessel>>,
}

impl CallSignalingStateMachine {
    /// Erstellt eine leere Zustandsmaschine
    pub fn neu() -> Self {
        Self::default()
    }

    /// Startet einen Anruf
    ///
    /// Die `call_started`-Antwort an den Anrufer wird vor dem `call_incoming`
    /// eingereiht, damit sie nie hinter einer spaeteren Annahme landet.
    /// Ein offline Angerufener ist kein Fehler.
    pub fn anrufen(
        &mut self,
        registry: &ConnectionRegistry,
        broadcaster: &EventBroadcaster,
        start: AnrufStart,
        request_id: u32,
    ) -> SignalingResult<CallId> {
        if start.anrufer == start.angerufener {
            return Err(SignalingError::anfrage("Anruf an sich selbst ist nicht moeglich"));
        }

        let schluessel = AnrufSchluessel::neu(&start.anrufer, &start.angerufener);
        if self.sitzungen.contains_key(&schluessel) {
            return Err(SignalingError::AnrufBereitsAktiv);
        }

        let sitzung = AnrufSitzung {
            call_id: CallId::new(),
            anrufer: start.anrufer.clone(),
            angerufener: start.angerufener.clone(),
            art: start.art,
            zustand: AnrufZustand::Klingelt,
            erstellt_am: Utc::now(),
            anrufer_verbindung: start.anrufer_verbindung,
            annehmende_verbindung: None,
        };
        let call_id = sitzung.call_id;
        self.einfuegen(schluessel, sitzung);

        let ziel_verbindungen = registry.verbindungen_von(&start.angerufener);
        let callee_online = !ziel_verbindungen.is_empty();

        broadcaster.an_verbindung_senden(
            &start.anrufer_verbindung,
            ServerMessage::new(
                request_id,
                ServerPayload::CallStarted(CallStartedResponse {
                    call_id,
                    callee: start.angerufener.clone(),
                    callee_online,
                }),
            ),
        );

        let eingehend = ServerMessage::push(ServerPayload::CallIncoming(CallIncoming {
            call_id,
            from: start.anrufer.clone(),
            kind: start.art,
            offer: start.offer,
            caller_name: start.anrufer_name,
            caller_avatar: start.anrufer_avatar,
        }));
        let zugestellt = broadcaster.an_verbindungen_senden(&ziel_verbindungen, &eingehend);

        tracing::info!(
            call_id = %call_id,
            anrufer = %start.anrufer,
            angerufener = %start.angerufener,
            art = ?start.art,
            zugestellt,
            "Anruf gestartet"
        );
        Ok(call_id)
    }

    /// Nimmt einen klingelnden Anruf an
    ///
    /// Nur der Angerufene darf annehmen, und nur einmal: das erste Geraet
    /// gewinnt, die anderen Geraete erhalten `call_answered_elsewhere`.
    pub fn annehmen(
        &mut self,
        registry: &ConnectionRegistry,
        broadcaster: &EventBroadcaster,
        annehmender: &UserId,
        verbindung: ConnectionId,
        anrufer: &UserId,
        answer: serde_json::Value,
    ) -> SignalingResult<CallId> {
        let schluessel = AnrufSchluessel::neu(annehmender, anrufer);
        let sitzung = self
            .sitzungen
            .get_mut(&schluessel)
            .ok_or(SignalingError::KeinAktiverAnruf)?;

        if &sitzung.angerufener != annehmender {
            return Err(SignalingError::UngueltigerAnrufZustand(
                "Nur der Angerufene kann annehmen".into(),
            ));
        }
        if sitzung.zustand != AnrufZustand::Klingelt {
            return Err(SignalingError::UngueltigerAnrufZustand(
                "Anruf wurde bereits angenommen".into(),
            ));
        }

        sitzung.zustand = AnrufZustand::Verbunden;
        sitzung.annehmende_verbindung = Some(verbindung);
        let call_id = sitzung.call_id;

        let angenommen = ServerMessage::push(ServerPayload::CallAccepted(CallAccepted {
            call_id,
            from: annehmender.clone(),
            answer,
        }));
        broadcaster.an_verbindungen_senden(&registry.verbindungen_von(anrufer), &angenommen);

        let anderswo = ServerMessage::push(ServerPayload::CallAnsweredElsewhere(
            CallAnsweredElsewhere { call_id },
        ));
        broadcaster.an_verbindungen_ausser_senden(
            &registry.verbindungen_von(annehmender),
            &verbindung,
            &anderswo,
        );

        tracing::info!(call_id = %call_id, verbindung = %verbindung, "Anruf angenommen");
        Ok(call_id)
    }

    /// Leitet einen ICE-Kandidaten an alle Verbindungen des Ziels weiter
    ///
    /// Ohne Sitzung (z.B. verspaeteter Kandidat nach dem Auflegen) wird der
    /// Kandidat stillschweigend verworfen.
    pub fn ice_kandidat(
        &self,
        registry: &ConnectionRegistry,
        broadcaster: &EventBroadcaster,
        sender: &UserId,
        ziel: &UserId,
        candidate: serde_json::Value,
    ) -> bool {
        let Some(sitzung) = self.sitzungen.get(&AnrufSchluessel::neu(sender, ziel)) else {
            tracing::trace!(sender = %sender, ziel = %ziel, "ICE-Kandidat ohne Sitzung verworfen");
            return false;
        };

        let event = ServerMessage::push(ServerPayload::IceCandidate(IceCandidateEvent {
            call_id: sitzung.call_id,
            from: sender.clone(),
            candidate,
        }));
        broadcaster.an_verbindungen_senden(&registry.verbindungen_von(ziel), &event);
        true
    }

    /// Beendet die Sitzung zwischen `beender` und `ziel`
    ///
    /// Idempotent: ohne Sitzung passiert nichts. Gibt Anruf-ID und den
    /// verwendeten Grund zurueck.
    pub fn beenden(
        &mut self,
        registry: &ConnectionRegistry,
        broadcaster: &EventBroadcaster,
        beender: &UserId,
        ziel: &UserId,
        grund: Option<EndReason>,
    ) -> Option<(CallId, EndReason)> {
        let sitzung = self.entfernen(&AnrufSchluessel::neu(beender, ziel))?;
        let grund = grund.unwrap_or_else(|| sitzung.abgeleiteter_grund(beender));

        Self::ende_melden(&sitzung, grund, registry, broadcaster, None);
        tracing::info!(call_id = %sitzung.call_id, beender = %beender, grund = ?grund, "Anruf beendet");
        Some((sitzung.call_id, grund))
    }

    /// Beendet alle Sitzungen, die an einer geschlossenen Verbindung haengen
    ///
    /// Betroffen sind Sitzungen, die ueber diese Verbindung gestartet oder
    /// angenommen wurden; bei der letzten Verbindung des Benutzers alle
    /// seine Sitzungen. Die geschlossene Verbindung selbst wird nicht
    /// benachrichtigt.
    pub fn beenden_fuer_verbindung(
        &mut self,
        registry: &ConnectionRegistry,
        broadcaster: &EventBroadcaster,
        verbindung: &ConnectionId,
        user_id: &UserId,
        letzte_verbindung: bool,
    ) -> Vec<CallId> {
        let schluessel: Vec<AnrufSchluessel> = self
            .nach_user
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut beendet = Vec::new();
        for key in schluessel {
            let betroffen = self
                .sitzungen
                .get(&key)
                .is_some_and(|s| letzte_verbindung || s.haengt_an(verbindung));
            if !betroffen {
                continue;
            }
            if let Some(sitzung) = self.entfernen(&key) {
                Self::ende_melden(
                    &sitzung,
                    EndReason::PeerDisconnected,
                    registry,
                    broadcaster,
                    Some(verbindung),
                );
                tracing::info!(
                    call_id = %sitzung.call_id,
                    verbindung = %verbindung,
                    "Anruf durch Verbindungsabbruch beendet"
                );
                beendet.push(sitzung.call_id);
            }
        }
        beendet
    }

    /// Sitzung zwischen zwei Benutzern
    pub fn sitzung(&self, a: &UserId, b: &UserId) -> Option<&AnrufSitzung> {
        self.sitzungen.get(&AnrufSchluessel::neu(a, b))
    }

    /// Anzahl der aktiven Sitzungen
    pub fn aktive_anzahl(&self) -> usize {
        self.sitzungen.len()
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn einfuegen(&mut self, schluessel: AnrufSchluessel, sitzung: AnrufSitzung) {
        for user in [&sitzung.anrufer, &sitzung.angerufener] {
            self.nach_user
                .entry(user.clone())
                .or_default()
                .insert(schluessel.clone());
        }
        self.sitzungen.insert(schluessel, sitzung);
    }

    fn entfernen(&mut self, schluessel: &AnrufSchluessel) -> Option<AnrufSitzung> {
        let sitzung = self.sitzungen.remove(schluessel)?;
        for user in [&sitzung.anrufer, &sitzung.angerufener] {
            if let Some(set) = self.nach_user.get_mut(user) {
                set.remove(schluessel);
                if set.is_empty() {
                    self.nach_user.remove(user);
                }
            }
        }
        Some(sitzung)
    }

    /// Sendet `call_ended` an alle Verbindungen beider Parteien
    fn ende_melden(
        sitzung: &AnrufSitzung,
        grund: EndReason,
        registry: &ConnectionRegistry,
        broadcaster: &EventBroadcaster,
        ausser: Option<&ConnectionId>,
    ) {
        for (empfaenger, peer) in [
            (&sitzung.anrufer, &sitzung.angerufener),
            (&sitzung.angerufener, &sitzung.anrufer),
        ] {
            let nachricht = ServerMessage::push(ServerPayload::CallEnded(CallEnded {
                call_id: sitzung.call_id,
                peer: peer.clone(),
                reason: grund,
            }));
            let verbindungen = registry.verbindungen_von(empfaenger);
            match ausser {
                Some(cid) => broadcaster.an_verbindungen_ausser_senden(&verbindungen, cid, &nachricht),
                None => broadcaster.an_verbindungen_senden(&verbindungen, &nachricht),
            };
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
