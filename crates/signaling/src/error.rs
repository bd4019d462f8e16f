//! Fehlertypen fuer den Signaling-Service

use instatalk_auth::AuthError;
use instatalk_chat::ChatError;
use instatalk_protocol::control::{ErrorCode, ServerMessage};
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Identitaets-Aufloesung fehlgeschlagen
    #[error("Identitaet abgelehnt: {0}")]
    Auth(#[from] AuthError),

    /// Persistenz oder Validierung der Nachricht fehlgeschlagen
    #[error("Nachricht nicht gespeichert: {0}")]
    Chat(#[from] ChatError),

    /// Aktion erfordert eine angekuendigte Identitaet
    #[error("Verbindung nicht identifiziert")]
    NichtIdentifiziert,

    /// Identitaet wurde bereits angekuendigt
    #[error("Verbindung bereits identifiziert")]
    BereitsIdentifiziert,

    /// Zwischen den beiden Parteien laeuft bereits ein Anruf
    #[error("Anruf zwischen den Parteien bereits aktiv")]
    AnrufBereitsAktiv,

    /// Keine aktive Anruf-Sitzung fuer das Paar
    #[error("Kein aktiver Anruf")]
    KeinAktiverAnruf,

    /// Uebergang im aktuellen Anrufzustand nicht erlaubt
    #[error("Ungueltiger Anrufzustand: {0}")]
    UngueltigerAnrufZustand(String),

    /// Anfrage inhaltlich ungueltig
    #[error("Ungueltige Anfrage: {0}")]
    UngueltigeAnfrage(String),

    /// Maximale Verbindungsanzahl erreicht
    #[error("Server ist voll")]
    ServerVoll,

    /// Verbindung wurde getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,
}

impl SignalingError {
    /// Erstellt einen Anfragefehler
    pub fn anfrage(msg: impl Into<String>) -> Self {
        Self::UngueltigeAnfrage(msg.into())
    }

    /// Wire-Fehlercode fuer diesen Fehler
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Auth(_) => ErrorCode::IdentityRejected,
            Self::Chat(e) if e.ist_validierung() => ErrorCode::InvalidRequest,
            Self::Chat(_) => ErrorCode::PersistenceFailed,
            Self::NichtIdentifiziert => ErrorCode::NotIdentified,
            Self::BereitsIdentifiziert => ErrorCode::AlreadyIdentified,
            Self::AnrufBereitsAktiv => ErrorCode::CallAlreadyActive,
            Self::KeinAktiverAnruf => ErrorCode::NoActiveCall,
            Self::UngueltigerAnrufZustand(_) => ErrorCode::InvalidCallState,
            Self::UngueltigeAnfrage(_) => ErrorCode::InvalidRequest,
            Self::ServerVoll => ErrorCode::ServerFull,
            Self::VerbindungGetrennt => ErrorCode::InternalError,
        }
    }

    /// Baut die `error`-Antwort fuer den Client
    pub fn als_antwort(&self, request_id: u32) -> ServerMessage {
        ServerMessage::error(request_id, self.error_code(), self.to_string())
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validierungsfehler_wird_invalid_request() {
        let e = SignalingError::from(ChatError::UngueltigeEingabe("leer".into()));
        assert_eq!(e.error_code(), ErrorCode::InvalidRequest);

        let e = SignalingError::from(ChatError::SpeicherFehler("db weg".into()));
        assert_eq!(e.error_code(), ErrorCode::PersistenceFailed);
    }

    #[test]
    fn antwort_traegt_request_id() {
        let antwort = SignalingError::KeinAktiverAnruf.als_antwort(17);
        assert_eq!(antwort.request_id, 17);
        assert_eq!(antwort.fehler_code(), Some(ErrorCode::NoActiveCall));
    }

    #[test]
    fn getrennte_verbindung_wird_internal_error() {
        assert_eq!(
            SignalingError::VerbindungGetrennt.error_code(),
            ErrorCode::InternalError
        );
    }
}
