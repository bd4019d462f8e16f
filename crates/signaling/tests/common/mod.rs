//! Gemeinsame Test-Helfer: simulierte Clients ohne echten WebSocket

#![allow(dead_code)]

use std::sync::Arc;

use instatalk_auth::TrustedIdentity;
use instatalk_chat::{ChatService, InMemoryStore, MessageStore};
use instatalk_core::types::{ConnectionId, RoomId, UserId};
use instatalk_protocol::control::{
    AnnounceIdentityRequest, ClientMessage, ClientPayload, ServerMessage, ServerPayload,
};
use instatalk_signaling::{DispatcherContext, MessageDispatcher, SignalingConfig, SignalingState};
use tokio::sync::mpsc;

/// Relay mit In-Memory-Store und vertrauender Identitaet
pub fn relay() -> (Arc<SignalingState>, Arc<MessageDispatcher>) {
    relay_mit_store(ChatService::neu(Arc::new(InMemoryStore::neu())))
}

pub fn relay_mit_store(store: Arc<dyn MessageStore>) -> (Arc<SignalingState>, Arc<MessageDispatcher>) {
    let state = SignalingState::neu(SignalingConfig::default(), store, Arc::new(TrustedIdentity));
    let dispatcher = Arc::new(MessageDispatcher::neu(Arc::clone(&state)));
    (state, dispatcher)
}

pub fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}

pub fn rid(s: &str) -> RoomId {
    RoomId::parse(s).unwrap()
}

/// Simulierte Verbindung: Antworten landen wie im echten Verbindungs-Task
/// in der eigenen Ausgangs-Queue.
pub struct TestClient {
    pub dispatcher: Arc<MessageDispatcher>,
    pub ctx: DispatcherContext,
    pub rx: mpsc::UnboundedReceiver<ServerMessage>,
    naechste_request_id: u32,
}

impl TestClient {
    pub fn verbinden(dispatcher: &Arc<MessageDispatcher>) -> Self {
        let (cid, rx) = dispatcher.lifecycle().verbinden().unwrap();
        Self {
            dispatcher: Arc::clone(dispatcher),
            ctx: DispatcherContext::neu(cid),
            rx,
            naechste_request_id: 1,
        }
    }

    /// Verbindet und kuendigt die Identitaet an; leert danach die Queue
    pub async fn als(dispatcher: &Arc<MessageDispatcher>, user: &str) -> Self {
        let mut client = Self::verbinden(dispatcher);
        client
            .senden(ClientPayload::AnnounceIdentity(AnnounceIdentityRequest {
                token: user.to_string(),
            }))
            .await;
        assert!(client.ctx.user_id.is_some(), "Identitaet fuer {user} abgelehnt");
        client.leeren();
        client
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.ctx.connection_id
    }

    /// Sendet eine Nachricht und gibt die vergebene Request-ID zurueck
    ///
    /// Bei Chat-Auftraegen wird auf die Antwort des Chat-Workers gewartet.
    pub async fn senden(&mut self, payload: ClientPayload) -> u32 {
        let ueber_worker = matches!(
            payload,
            ClientPayload::SendMessage(_) | ClientPayload::LoadHistory(_)
        );
        let request_id = self.senden_ohne_warten(payload).await;
        if ueber_worker {
            self.ctx.chat_leerlauf().await;
        }
        request_id
    }

    /// Sendet ohne auf den Chat-Worker zu warten
    pub async fn senden_ohne_warten(&mut self, payload: ClientPayload) -> u32 {
        let request_id = self.naechste_request_id;
        self.naechste_request_id += 1;
        let antwort = self
            .dispatcher
            .dispatch(ClientMessage::new(request_id, payload), &mut self.ctx)
            .await;
        if let Some(antwort) = antwort {
            self.dispatcher
                .state()
                .broadcaster
                .an_verbindung_senden(&self.ctx.connection_id, antwort);
        }
        request_id
    }

    /// Alle bisher eingereihten Nachrichten
    pub fn empfangen(&mut self) -> Vec<ServerMessage> {
        let mut alle = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            alle.push(msg);
        }
        alle
    }

    /// Nur die Payloads, Keepalive ausgenommen
    pub fn payloads(&mut self) -> Vec<ServerPayload> {
        self.empfangen()
            .into_iter()
            .map(|m| m.payload)
            .filter(|p| !matches!(p, ServerPayload::Ping(_)))
            .collect()
    }

    pub fn leeren(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn trennen(&self) -> bool {
        self.dispatcher.lifecycle().trennen(&self.ctx.connection_id)
    }
}

/// Online-Liste aus einem Presence-Snapshot
pub fn online_liste(payload: &ServerPayload) -> Option<Vec<String>> {
    match payload {
        ServerPayload::PresenceSnapshot(s) => {
            Some(s.online.iter().map(|u| u.as_str().to_string()).collect())
        }
        _ => None,
    }
}
