//! Fehlertypen fuer InstaTalk
//!
//! Fehler der gemeinsamen Typen. Die Dienst-Crates definieren eigene Fehler
//! und konvertieren diesen via `From`.

use thiserror::Error;

/// Globaler Result-Alias fuer InstaTalk
pub type Result<T> = std::result::Result<T, InstaTalkError>;

/// Fehler beim Bilden der gemeinsamen Typen
#[derive(Debug, Error)]
pub enum InstaTalkError {
    /// Externe ID (User, Raum) verletzt Laenge oder Zeichensatz
    #[error("Ungueltige ID: {0}")]
    UngueltigeId(String),
}
