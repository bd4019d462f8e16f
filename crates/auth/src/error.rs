//! Fehlertypen fuer die Identitaets-Aufloesung

use thiserror::Error;

/// Alle moeglichen Fehler bei der Identitaets-Aufloesung
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Token ---
    #[error("Token fehlt")]
    TokenFehlt,

    #[error("Token ungueltig: {0}")]
    TokenUngueltig(String),

    // --- Session ---
    #[error("Session nicht gefunden")]
    SessionUngueltig,

    #[error("Session abgelaufen")]
    SessionAbgelaufen,
}

impl From<instatalk_core::InstaTalkError> for AuthError {
    fn from(e: instatalk_core::InstaTalkError) -> Self {
        Self::TokenUngueltig(e.to_string())
    }
}

/// Result-Alias fuer die Identitaets-Aufloesung
pub type AuthResult<T> = Result<T, AuthError>;
