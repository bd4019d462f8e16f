//! In-Memory Nachrichten-Speicher
//!
//! Referenz-Implementierung von `MessageStore`. Haelt pro Raum eine
//! chronologisch sortierte Liste. Nicht persistent ueber Neustarts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use instatalk_core::{RoomId, UserId};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::ChatResult;
use crate::store::MessageStore;
use crate::types::{GespeicherteNachricht, HistoryAnfrage};

/// In-Memory `MessageStore`
#[derive(Debug, Default)]
pub struct InMemoryStore {
    raeume: RwLock<HashMap<RoomId, Vec<GespeicherteNachricht>>>,
}

impl InMemoryStore {
    /// Erstellt einen leeren Speicher
    pub fn neu() -> Self {
        Self::default()
    }

    /// Gesamtzahl gespeicherter Nachrichten
    pub fn anzahl(&self) -> usize {
        self.raeume.read().values().map(Vec::len).sum()
    }

    /// Anzahl gespeicherter Nachrichten in einem Raum
    pub fn anzahl_in(&self, room_id: &RoomId) -> usize {
        self.raeume.read().get(room_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn nachricht_anhaengen(
        &self,
        room_id: &RoomId,
        sender_id: &UserId,
        content: &str,
    ) -> ChatResult<GespeicherteNachricht> {
        let mut raeume = self.raeume.write();
        let verlauf = raeume.entry(room_id.clone()).or_default();

        // Zeitstempel monoton halten, auch wenn die Uhr springt
        let mut created_at = Utc::now();
        if let Some(letzte) = verlauf.last() {
            if created_at < letzte.created_at {
                created_at = letzte.created_at;
            }
        }

        let nachricht = GespeicherteNachricht {
            id: Uuid::new_v4(),
            room_id: room_id.clone(),
            sender_id: sender_id.clone(),
            content: content.to_string(),
            created_at,
        };
        verlauf.push(nachricht.clone());

        tracing::trace!(
            room_id = %room_id,
            message_id = %nachricht.id,
            "Nachricht gespeichert"
        );
        Ok(nachricht)
    }

    async fn history_laden(&self, anfrage: HistoryAnfrage) -> ChatResult<Vec<GespeicherteNachricht>> {
        let limit = anfrage.limit.unwrap_or(HistoryAnfrage::STANDARD_LIMIT);
        let raeume = self.raeume.read();
        let Some(verlauf) = raeume.get(&anfrage.room_id) else {
            return Ok(Vec::new());
        };

        let ende = match anfrage.before {
            Some(vor) => verlauf.partition_point(|n| n.created_at < vor),
            None => verlauf.len(),
        };
        let anfang = ende.saturating_sub(limit);
        Ok(verlauf[anfang..ende].to_vec())
    }
}
