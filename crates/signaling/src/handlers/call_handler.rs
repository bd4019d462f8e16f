//! Call-Handler – call_initiate, call_answer, ice_candidate, call_end
//!
//! Alle Schritte laufen unter der Tabellen-Sperre, damit Zustandswechsel
//! und die daraus folgenden Events in derselben Reihenfolge bei den
//! Verbindungen ankommen. Erfolgreiche Schritte liefern keine direkte
//! Antwort; die Zustandsmaschine reiht alle Events selbst ein.

use instatalk_core::types::{ConnectionId, UserId};
use instatalk_protocol::control::{
    CallAnswerRequest, CallEndRequest, CallInitiateRequest, IceCandidateRequest, ServerMessage,
};
use std::sync::Arc;

use crate::call::AnrufStart;
use crate::error::SignalingError;
use crate::server_state::{AnrufErgebnis, SignalingState};

/// Startet einen Anruf
pub fn handle_call_initiate(
    request: CallInitiateRequest,
    request_id: u32,
    connection_id: ConnectionId,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) -> Option<ServerMessage> {
    let start = AnrufStart {
        anrufer: user_id.clone(),
        anrufer_verbindung: connection_id,
        angerufener: request.target,
        art: request.kind,
        offer: request.offer,
        anrufer_name: request.caller_name,
        anrufer_avatar: request.caller_avatar,
    };

    let ergebnis = {
        let mut guard = state.tabellen.lock();
        let tabellen = &mut *guard;
        tabellen
            .anrufe
            .anrufen(&tabellen.registry, &state.broadcaster, start, request_id)
    };

    match ergebnis {
        Ok(_) => {
            state.zaehler.anruf_versuch(AnrufErgebnis::Gestartet);
            None
        }
        Err(e) => {
            let label = match e {
                SignalingError::AnrufBereitsAktiv => AnrufErgebnis::Besetzt,
                _ => AnrufErgebnis::Ungueltig,
            };
            state.zaehler.anruf_versuch(label);
            tracing::debug!(user_id = %user_id, fehler = %e, "Anruf abgelehnt");
            Some(e.als_antwort(request_id))
        }
    }
}

/// Nimmt einen Anruf an
pub fn handle_call_answer(
    request: CallAnswerRequest,
    request_id: u32,
    connection_id: ConnectionId,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) -> Option<ServerMessage> {
    let ergebnis = {
        let mut guard = state.tabellen.lock();
        let tabellen = &mut *guard;
        tabellen.anrufe.annehmen(
            &tabellen.registry,
            &state.broadcaster,
            user_id,
            connection_id,
            &request.target,
            request.answer,
        )
    };

    match ergebnis {
        Ok(_) => {
            state.zaehler.anruf_versuch(AnrufErgebnis::Angenommen);
            None
        }
        Err(e) => {
            tracing::debug!(user_id = %user_id, fehler = %e, "Annahme abgelehnt");
            Some(e.als_antwort(request_id))
        }
    }
}

/// Leitet einen ICE-Kandidaten weiter; ohne Sitzung wird er verworfen
pub fn handle_ice_candidate(
    request: IceCandidateRequest,
    user_id: &UserId,
    state: &Arc<SignalingState>,
) {
    let tabellen = state.tabellen.lock();
    tabellen.anrufe.ice_kandidat(
        &tabellen.registry,
        &state.broadcaster,
        user_id,
        &request.target,
        request.candidate,
    );
}

/// Beendet einen Anruf; ohne Sitzung passiert nichts
pub fn handle_call_end(request: CallEndRequest, user_id: &UserId, state: &Arc<SignalingState>) {
    let mut guard = state.tabellen.lock();
    let tabellen = &mut *guard;
    let beendet = tabellen.anrufe.beenden(
        &tabellen.registry,
        &state.broadcaster,
        user_id,
        &request.target,
        request.reason,
    );
    if beendet.is_none() {
        tracing::trace!(user_id = %user_id, ziel = %request.target, "call_end ohne Sitzung");
    }
}
