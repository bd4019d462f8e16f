//! Persistenz-Schnittstelle
//!
//! Das `MessageStore`-Trait abstrahiert den konkreten Speicher (Datenbank,
//! externer Dienst, In-Memory). Der Relay haelt es als `Arc<dyn MessageStore>`.

use async_trait::async_trait;
use instatalk_core::{RoomId, UserId};

use crate::error::ChatResult;
use crate::types::{GespeicherteNachricht, HistoryAnfrage};

/// Abstrakter Nachrichten-Speicher
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Nachricht dauerhaft anhaengen und den gespeicherten Datensatz zurueckgeben
    async fn nachricht_anhaengen(
        &self,
        room_id: &RoomId,
        sender_id: &UserId,
        content: &str,
    ) -> ChatResult<GespeicherteNachricht>;

    /// Nachrichten-History eines Raums laden, aufsteigend nach `created_at`
    async fn history_laden(&self, anfrage: HistoryAnfrage) -> ChatResult<Vec<GespeicherteNachricht>>;
}
