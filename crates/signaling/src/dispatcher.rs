//! Message-Dispatcher – Routet Client-Nachrichten an die richtigen Handler
//!
//! Der Dispatcher empfaengt dekodierte Nachrichten einer ClientConnection,
//! bestimmt den richtigen Handler und gibt die direkte Antwort zurueck.
//! Events an andere Verbindungen reihen die Handler selbst ein.
//! `send_message` und `load_history` laufen ueber den Chat-Worker der
//! Verbindung; deren Antwort kommt spaeter ueber die Ausgangs-Queue.
//!
//! ## Zustandspruefung
//! - `announce_identity` nur solange die Verbindung noch nicht identifiziert ist
//! - `ping` / `pong` immer
//! - Alle anderen nur mit angekuendigter Identitaet

use instatalk_core::types::{ConnectionId, UserId};
use instatalk_protocol::control::{
    ClientMessage, ClientPayload, ErrorCode, ServerMessage, PUSH_REQUEST_ID,
};
use std::sync::Arc;

use crate::chat_worker::{ChatAuftrag, ChatWorker};
use crate::error::SignalingError;
use crate::handlers::{call_handler, chat_handler, identity_handler, room_handler};
use crate::lifecycle::ConnectionLifecycleManager;
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug)]
pub struct DispatcherContext {
    /// ID der Verbindung
    pub connection_id: ConnectionId,
    /// Angekuendigte Identitaet (None bis `announce_identity` erfolgreich war)
    pub user_id: Option<UserId>,
    /// Verbindung soll nach dieser Nachricht geschlossen werden
    pub schliessen: bool,
    /// Worker fuer Speicherzugriffe, wird beim ersten Chat-Auftrag gestartet
    chat: Option<ChatWorker>,
}

impl DispatcherContext {
    /// Kontext fuer eine frisch geoeffnete Verbindung
    pub fn neu(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            user_id: None,
            schliessen: false,
            chat: None,
        }
    }

    /// Wartet bis alle eingereihten Chat-Auftraege beantwortet sind
    pub async fn chat_leerlauf(&self) {
        if let Some(worker) = &self.chat {
            worker.leerlauf().await;
        }
    }

    fn chat_einreihen(&mut self, state: &Arc<SignalingState>, auftrag: ChatAuftrag) {
        let auftrag = match &self.chat {
            Some(worker) => match worker.einreihen(auftrag) {
                Ok(()) => return,
                Err(auftrag) => {
                    tracing::warn!(connection_id = %self.connection_id, "Chat-Worker neu gestartet");
                    auftrag
                }
            },
            None => auftrag,
        };
        let worker = ChatWorker::starten(Arc::clone(state), self.connection_id);
        let _ = worker.einreihen(auftrag);
        self.chat = Some(worker);
    }
}

/// Aktueller Unix-Timestamp in Millisekunden
pub(crate) fn jetzt_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
    lifecycle: ConnectionLifecycleManager,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        let lifecycle = ConnectionLifecycleManager::neu(Arc::clone(&state));
        Self { state, lifecycle }
    }

    /// Lifecycle-Manager fuer Verbinden und Trennen
    pub fn lifecycle(&self) -> &ConnectionLifecycleManager {
        &self.lifecycle
    }

    pub fn state(&self) -> &Arc<SignalingState> {
        &self.state
    }

    /// Dekodiert einen JSON-Textframe und verarbeitet ihn
    ///
    /// Unlesbare Frames werden mit `INVALID_REQUEST` beantwortet, die
    /// Verbindung bleibt offen.
    pub async fn frame_verarbeiten(
        &self,
        text: &str,
        ctx: &mut DispatcherContext,
    ) -> Option<ServerMessage> {
        match ClientMessage::from_json(text) {
            Ok(nachricht) => self.dispatch(nachricht, ctx).await,
            Err(e) => {
                tracing::debug!(
                    connection_id = %ctx.connection_id,
                    fehler = %e,
                    "Ungueltiger Frame"
                );
                Some(ServerMessage::error(
                    PUSH_REQUEST_ID,
                    ErrorCode::InvalidRequest,
                    format!("Ungueltiges Nachrichtenformat: {e}"),
                ))
            }
        }
    }

    /// Verarbeitet eine eingehende Nachricht und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine direkte Antwort gesendet werden soll.
    pub async fn dispatch(
        &self,
        message: ClientMessage,
        ctx: &mut DispatcherContext,
    ) -> Option<ServerMessage> {
        let request_id = message.request_id;

        match message.payload {
            // -------------------------------------------------------------------
            // Identitaet (nur einmal)
            // -------------------------------------------------------------------
            ClientPayload::AnnounceIdentity(req) => {
                if ctx.user_id.is_some() {
                    return Some(SignalingError::BereitsIdentifiziert.als_antwort(request_id));
                }

                match identity_handler::handle_announce_identity(
                    req,
                    request_id,
                    ctx.connection_id,
                    &self.lifecycle,
                )
                .await
                {
                    Ok(user_id) => {
                        ctx.user_id = Some(user_id);
                        None
                    }
                    Err(e) => {
                        // Abgelehnte Identitaet beendet die Verbindung
                        if matches!(e, SignalingError::Auth(_)) {
                            ctx.schliessen = true;
                        }
                        Some(e.als_antwort(request_id))
                    }
                }
            }

            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            ClientPayload::Ping(ping) => Some(ServerMessage::pong(
                request_id,
                ping.timestamp_ms,
                jetzt_ms(),
            )),

            ClientPayload::Pong(_) => {
                tracing::trace!(connection_id = %ctx.connection_id, "Pong empfangen");
                None
            }

            // -------------------------------------------------------------------
            // Identitaet erfordernde Nachrichten
            // -------------------------------------------------------------------
            payload => {
                let Some(user_id) = ctx.user_id.clone() else {
                    return Some(SignalingError::NichtIdentifiziert.als_antwort(request_id));
                };

                self.dispatch_identifiziert(payload, request_id, ctx, &user_id)
            }
        }
    }

    /// Routet Nachrichten die eine Identitaet erfordern
    fn dispatch_identifiziert(
        &self,
        payload: ClientPayload,
        request_id: u32,
        ctx: &mut DispatcherContext,
        user_id: &UserId,
    ) -> Option<ServerMessage> {
        let state = &self.state;
        let connection_id = ctx.connection_id;

        match payload {
            // -------------------------------------------------------------------
            // Raeume
            // -------------------------------------------------------------------
            ClientPayload::JoinRoom(req) => Some(room_handler::handle_join_room(
                req,
                request_id,
                connection_id,
                user_id,
                state,
            )),

            ClientPayload::LeaveRoom(req) => Some(room_handler::handle_leave_room(
                req,
                request_id,
                connection_id,
                user_id,
                state,
            )),

            // -------------------------------------------------------------------
            // Chat
            // -------------------------------------------------------------------
            ClientPayload::SendMessage(request) => {
                ctx.chat_einreihen(
                    state,
                    ChatAuftrag::Senden {
                        request,
                        request_id,
                        user_id: user_id.clone(),
                    },
                );
                None
            }

            ClientPayload::TypingStart(req) => {
                chat_handler::handle_typing_start(req, connection_id, user_id, state);
                None
            }

            ClientPayload::TypingStop(req) => {
                chat_handler::handle_typing_stop(req, connection_id, user_id, state);
                None
            }

            ClientPayload::LoadHistory(request) => {
                ctx.chat_einreihen(state, ChatAuftrag::History { request, request_id });
                None
            }

            // -------------------------------------------------------------------
            // Anruf-Signaling
            // -------------------------------------------------------------------
            ClientPayload::CallInitiate(req) => {
                call_handler::handle_call_initiate(req, request_id, connection_id, user_id, state)
            }

            ClientPayload::CallAnswer(req) => {
                call_handler::handle_call_answer(req, request_id, connection_id, user_id, state)
            }

            ClientPayload::IceCandidate(req) => {
                call_handler::handle_ice_candidate(req, user_id, state);
                None
            }

            ClientPayload::CallEnd(req) => {
                call_handler::handle_call_end(req, user_id, state);
                None
            }

            // Werden oben bereits behandelt
            ClientPayload::AnnounceIdentity(_) => {
                Some(SignalingError::BereitsIdentifiziert.als_antwort(request_id))
            }
            ClientPayload::Ping(_) | ClientPayload::Pong(_) => None,
        }
    }
}
