//! Gemeinsame Identifikationstypen fuer InstaTalk
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.
//!
//! Benutzer- und Raum-IDs stammen aus dem externen Persistenz-Dienst und
//! sind daher opake Strings. Verbindungs- und Anruf-IDs vergibt der Relay
//! selbst (UUID v4).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InstaTalkError, Result};

/// Maximale Laenge einer externen ID (User, Raum)
pub const MAX_ID_LAENGE: usize = 128;

/// Prueft eine externe ID auf Laenge und erlaubte Zeichen
fn externe_id_pruefen(art: &str, wert: &str) -> Result<()> {
    if wert.is_empty() {
        return Err(InstaTalkError::UngueltigeId(format!("{art} darf nicht leer sein")));
    }
    if wert.len() > MAX_ID_LAENGE {
        return Err(InstaTalkError::UngueltigeId(format!(
            "{art} zu lang: {} Zeichen (Maximum: {MAX_ID_LAENGE})",
            wert.len()
        )));
    }
    if wert.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(InstaTalkError::UngueltigeId(format!(
            "{art} enthaelt Leer- oder Steuerzeichen"
        )));
    }
    Ok(())
}

/// Authentifizierte Benutzer-ID (vom Identity-Dienst geliefert)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(pub String);

impl UserId {
    /// Erstellt eine UserId nach Validierung
    pub fn parse(wert: impl Into<String>) -> Result<Self> {
        let wert = wert.into();
        externe_id_pruefen("User-ID", &wert)?;
        Ok(Self(wert))
    }

    /// Gibt den inneren String zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = InstaTalkError;

    fn try_from(wert: String) -> Result<Self> {
        Self::parse(wert)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Chat-Raum-ID (entspricht einer Chat-Konversation)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(pub String);

impl RoomId {
    /// Erstellt eine RoomId nach Validierung
    pub fn parse(wert: impl Into<String>) -> Result<Self> {
        let wert = wert.into();
        externe_id_pruefen("Raum-ID", &wert)?;
        Ok(Self(wert))
    }

    /// Gibt den inneren String zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = InstaTalkError;

    fn try_from(wert: String) -> Result<Self> {
        Self::parse(wert)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room:{}", self.0)
    }
}

/// Eindeutige Verbindungs-ID (eine WebSocket-Session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Eindeutige Anruf-ID (pro Anrufversuch neu vergeben)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    /// Erstellt eine neue zufaellige CallId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_eindeutig() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b, "Zwei neue ConnectionIds muessen verschieden sein");
    }

    #[test]
    fn call_id_display() {
        let id = CallId(Uuid::nil());
        assert!(id.to_string().starts_with("call:"));
    }

    #[test]
    fn user_id_validierung() {
        assert!(UserId::parse("64f1c2a9e4b0").is_ok());
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("mit leerzeichen").is_err());
        assert!(UserId::parse("x".repeat(MAX_ID_LAENGE + 1)).is_err());
    }

    #[test]
    fn room_id_als_string_serialisiert() {
        let raum = RoomId::parse("r1").unwrap();
        let json = serde_json::to_string(&raum).unwrap();
        assert_eq!(json, "\"r1\"");
        let zurueck: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, raum);
    }

    #[test]
    fn ungueltige_id_beim_deserialisieren_abgelehnt() {
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
        assert!(serde_json::from_str::<RoomId>("\"a b\"").is_err());
    }

    #[test]
    fn user_ids_sind_sortierbar() {
        let mut ids = vec![UserId("b".into()), UserId("a".into())];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
