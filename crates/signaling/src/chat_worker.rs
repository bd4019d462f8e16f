//! Chat-Worker – Speicherzugriffe einer Verbindung ausserhalb der Leseschleife
//!
//! `send_message` und `load_history` warten auf den MessageStore. Damit die
//! Leseschleife dabei weiter Frames, Keepalive und Shutdown verarbeitet,
//! bekommt jede Verbindung einen eigenen Worker-Task mit einer Queue.
//! Die Auftraege einer Verbindung laufen in Eingangsreihenfolge; Antworten
//! gehen ueber die Ausgangs-Queue der Verbindung.
//!
//! Der Worker endet, sobald der zugehoerige `DispatcherContext` verworfen wird
//! und alle bereits eingereihten Auftraege abgearbeitet sind.

use instatalk_core::types::{ConnectionId, UserId};
use instatalk_protocol::control::{HistoryRequest, SendMessageRequest};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::handlers::chat_handler;
use crate::server_state::SignalingState;

/// Ein Auftrag an den Chat-Worker
pub(crate) enum ChatAuftrag {
    Senden {
        request: SendMessageRequest,
        request_id: u32,
        user_id: UserId,
    },
    History {
        request: HistoryRequest,
        request_id: u32,
    },
    /// Meldet sich, wenn alle vorher eingereihten Auftraege erledigt sind
    Leerlauf(oneshot::Sender<()>),
}

/// Handle auf den Chat-Worker einer Verbindung
#[derive(Debug)]
pub struct ChatWorker {
    tx: mpsc::UnboundedSender<ChatAuftrag>,
}

impl ChatWorker {
    /// Startet den Worker-Task fuer eine Verbindung
    pub fn starten(state: Arc<SignalingState>, connection_id: ConnectionId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(auftraege_abarbeiten(state, connection_id, rx));
        Self { tx }
    }

    /// Reiht einen Auftrag ein
    ///
    /// Gibt den Auftrag zurueck, wenn der Worker nicht mehr laeuft.
    pub(crate) fn einreihen(&self, auftrag: ChatAuftrag) -> Result<(), ChatAuftrag> {
        self.tx.send(auftrag).map_err(|e| e.0)
    }

    /// Wartet bis alle bisher eingereihten Auftraege erledigt sind
    pub async fn leerlauf(&self) {
        let (fertig_tx, fertig_rx) = oneshot::channel();
        if self.tx.send(ChatAuftrag::Leerlauf(fertig_tx)).is_ok() {
            let _ = fertig_rx.await;
        }
    }
}

async fn auftraege_abarbeiten(
    state: Arc<SignalingState>,
    connection_id: ConnectionId,
    mut rx: mpsc::UnboundedReceiver<ChatAuftrag>,
) {
    while let Some(auftrag) = rx.recv().await {
        let antwort = match auftrag {
            ChatAuftrag::Senden {
                request,
                request_id,
                user_id,
            } => {
                chat_handler::handle_send_message(
                    request,
                    request_id,
                    connection_id,
                    &user_id,
                    &state,
                )
                .await
            }
            ChatAuftrag::History {
                request,
                request_id,
            } => chat_handler::handle_load_history(request, request_id, &state).await,
            ChatAuftrag::Leerlauf(fertig) => {
                let _ = fertig.send(());
                continue;
            }
        };
        // Nach dem Trennen existiert die Queue nicht mehr, die Antwort verfaellt
        state.broadcaster.an_verbindung_senden(&connection_id, antwort);
    }
    tracing::trace!(connection_id = %connection_id, "Chat-Worker beendet");
}
