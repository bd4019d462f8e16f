//! ChatService – Validierung vor der Persistenz
//!
//! Umhuellt einen beliebigen `MessageStore` und prueft Inhalte bevor sie
//! gespeichert werden. Implementiert selbst `MessageStore`, damit der Relay
//! nicht zwischen validierendem und rohem Speicher unterscheiden muss.

use std::sync::Arc;

use async_trait::async_trait;
use instatalk_core::{RoomId, UserId};

use crate::{
    error::{ChatError, ChatResult},
    store::MessageStore,
    types::{GespeicherteNachricht, HistoryAnfrage},
};

/// Standard-Maximallaenge einer Nachricht in Bytes
pub const MAX_NACHRICHTEN_LAENGE: usize = 4096;

/// Maximale Seitengroesse einer History-Abfrage
const MAX_HISTORY_LIMIT: usize = 200;

/// ChatService validiert Nachrichten und delegiert an den Speicher
pub struct ChatService {
    store: Arc<dyn MessageStore>,
    max_laenge: usize,
}

impl ChatService {
    /// Erstellt einen neuen ChatService mit Standard-Maximallaenge
    pub fn neu(store: Arc<dyn MessageStore>) -> Arc<Self> {
        Self::mit_max_laenge(store, MAX_NACHRICHTEN_LAENGE)
    }

    /// Erstellt einen neuen ChatService mit eigener Maximallaenge
    pub fn mit_max_laenge(store: Arc<dyn MessageStore>, max_laenge: usize) -> Arc<Self> {
        Arc::new(Self { store, max_laenge })
    }

    /// Inhalt pruefen und getrimmt zurueckgeben
    fn inhalt_pruefen<'a>(&self, content: &'a str) -> ChatResult<&'a str> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::UngueltigeEingabe(
                "Nachrichteninhalt darf nicht leer sein".into(),
            ));
        }

        if content.len() > self.max_laenge {
            return Err(ChatError::UngueltigeEingabe(format!(
                "Nachricht zu lang: {} Zeichen (Maximum: {})",
                content.len(),
                self.max_laenge
            )));
        }
        Ok(content)
    }
}

#[async_trait]
impl MessageStore for ChatService {
    async fn nachricht_anhaengen(
        &self,
        room_id: &RoomId,
        sender_id: &UserId,
        content: &str,
    ) -> ChatResult<GespeicherteNachricht> {
        let content = self.inhalt_pruefen(content)?;
        self.store.nachricht_anhaengen(room_id, sender_id, content).await
    }

    async fn history_laden(&self, anfrage: HistoryAnfrage) -> ChatResult<Vec<GespeicherteNachricht>> {
        if matches!(anfrage.limit, Some(0)) {
            return Err(ChatError::UngueltigeEingabe(
                "History-Limit muss groesser als 0 sein".into(),
            ));
        }
        let anfrage = HistoryAnfrage {
            limit: anfrage.limit.map(|l| l.min(MAX_HISTORY_LIMIT)),
            ..anfrage
        };
        self.store.history_laden(anfrage).await
    }
}
