//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede WebSocket-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Ein separater Schreib-Task leert die Ausgangs-Queue der
//! Verbindung, damit alle Frames (Antworten und Events) genau eine
//! Reihenfolge haben. Speicherzugriffe laufen im Chat-Worker der Verbindung,
//! die Leseschleife wartet nie auf den MessageStore.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Kommt innerhalb von `verbindungs_timeout_sek` kein Frame, wird getrennt

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use instatalk_protocol::control::{ErrorCode, ServerMessage, PUSH_REQUEST_ID};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::dispatcher::{jetzt_ms, DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Wartezeit auf den Schreib-Task nach dem Trennen
const SCHREIB_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: Option<SocketAddr>,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<SignalingState>, peer_addr: Option<SocketAddr>) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt, der Timeout greift, die Identitaet
    /// abgelehnt wird oder ein Shutdown-Signal eingeht. Am Ende wird die
    /// Verbindung immer ueber den Lifecycle-Manager aufgeraeumt.
    pub async fn verarbeiten(self, mut socket: WebSocket, mut shutdown_rx: watch::Receiver<bool>) {
        let peer = self
            .peer_addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unbekannt".to_string());
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let (connection_id, ausgang) = match dispatcher.lifecycle().verbinden() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(peer = %peer, fehler = %e, "Verbindung abgewiesen");
                if let Ok(json) = e.als_antwort(PUSH_REQUEST_ID).to_json() {
                    let _ = socket.send(Message::Text(json)).await;
                }
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        };

        tracing::info!(peer = %peer, connection_id = %connection_id, "Neue Verbindung");

        let (ws_sender, mut ws_receiver) = socket.split();
        let schreib_task = tokio::spawn(ausgang_schreiben(ws_sender, ausgang));

        let mut ctx = DispatcherContext::neu(connection_id);
        let broadcaster = &self.state.broadcaster;

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + keepalive_intervall,
            keepalive_intervall,
        );

        loop {
            tokio::select! {
                // Eingehender Frame vom Client
                frame = ws_receiver.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            letzter_empfang = Instant::now();
                            if let Some(antwort) = dispatcher.frame_verarbeiten(&text, &mut ctx).await {
                                broadcaster.an_verbindung_senden(&connection_id, antwort);
                            }
                            if ctx.schliessen {
                                tracing::info!(connection_id = %connection_id, "Verbindung wird nach Ablehnung geschlossen");
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            letzter_empfang = Instant::now();
                            broadcaster.an_verbindung_senden(
                                &connection_id,
                                ServerMessage::error(
                                    PUSH_REQUEST_ID,
                                    ErrorCode::InvalidRequest,
                                    "Binaerframes werden nicht unterstuetzt",
                                ),
                            );
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            letzter_empfang = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(connection_id = %connection_id, "Verbindung vom Client getrennt");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(connection_id = %connection_id, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                    }
                }

                // Keepalive-Ping und Timeout
                _ = keepalive.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        tracing::warn!(connection_id = %connection_id, "Verbindungs-Timeout");
                        break;
                    }
                    broadcaster.an_verbindung_senden(&connection_id, ServerMessage::ping(jetzt_ms()));
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(connection_id = %connection_id, "Shutdown-Signal, Verbindung wird getrennt");
                        broadcaster.an_verbindung_senden(
                            &connection_id,
                            ServerMessage::error(
                                PUSH_REQUEST_ID,
                                ErrorCode::InternalError,
                                "Server wird heruntergefahren",
                            ),
                        );
                        break;
                    }
                }
            }
        }

        // Aufraeumen entfernt auch die Ausgangs-Queue, der Schreib-Task endet danach
        dispatcher.lifecycle().trennen(&connection_id);
        // Chat-Worker arbeitet Eingereihtes ab und endet dann
        drop(ctx);

        if tokio::time::timeout(SCHREIB_TASK_TIMEOUT, schreib_task)
            .await
            .is_err()
        {
            tracing::warn!(connection_id = %connection_id, "Schreib-Task nicht rechtzeitig beendet");
        }

        tracing::info!(peer = %peer, connection_id = %connection_id, "Verbindungs-Task beendet");
    }
}

/// Leert die Ausgangs-Queue in den WebSocket und schliesst ihn danach
async fn ausgang_schreiben(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut ausgang: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(nachricht) = ausgang.recv().await {
        let json = match nachricht.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(fehler = %e, "Serialisierung fehlgeschlagen");
                continue;
            }
        };
        if let Err(e) = ws_sender.send(Message::Text(json)).await {
            tracing::debug!(fehler = %e, "Senden fehlgeschlagen");
            return;
        }
    }
    let _ = ws_sender.send(Message::Close(None)).await;
}
