//! Oeffentliche Typen fuer die Nachrichten-Persistenz

use chrono::{DateTime, Utc};
use instatalk_core::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eine gespeicherte Chat-Nachricht
///
/// Gehoert dem Persistenz-Dienst; der Relay liest sie nur und verteilt
/// sie unveraendert an die Raum-Mitglieder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GespeicherteNachricht {
    pub id: Uuid,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Cursor-basierte Paginierung fuer die Nachrichten-History
#[derive(Debug, Clone)]
pub struct HistoryAnfrage {
    pub room_id: RoomId,
    /// Lade Nachrichten vor diesem Zeitstempel
    pub before: Option<DateTime<Utc>>,
    /// Maximale Anzahl (Default: 50)
    pub limit: Option<usize>,
}

impl HistoryAnfrage {
    /// Standard-Seitengroesse
    pub const STANDARD_LIMIT: usize = 50;

    /// Anfrage fuer die neuesten Nachrichten eines Raums
    pub fn neueste(room_id: RoomId) -> Self {
        Self {
            room_id,
            before: None,
            limit: None,
        }
    }
}
