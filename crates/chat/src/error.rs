//! Fehlertypen fuer das Chat-Crate

use thiserror::Error;

/// Chat-Fehlertypen
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Raum nicht gefunden: {0}")]
    RaumNichtGefunden(String),

    #[error("Speicher-Fehler: {0}")]
    SpeicherFehler(String),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl ChatError {
    /// Gibt true zurueck wenn der Fehler aus der Eingabe-Validierung stammt
    pub fn ist_validierung(&self) -> bool {
        matches!(self, Self::UngueltigeEingabe(_))
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
