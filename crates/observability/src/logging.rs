//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `IT_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `instatalk_signaling=debug`)
//! - `IT_LOG_FORMAT`: Format (text/json)
//!
//! Ohne Umgebungsvariablen gelten die Werte aus der Konfiguration.

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "IT_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "IT_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Ein zweiter Aufruf (z.B. in Tests) aendert nichts.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let aus_env = std::env::var(ENV_LOG_FORMAT).ok();
    let format = format_waehlen(aus_env.as_deref(), format);

    let ergebnis = match format {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging bereits initialisiert");
    }
}

/// Umgebung vor Konfiguration; unbekannte Formate fallen auf `text` zurueck
fn format_waehlen(aus_env: Option<&str>, konfiguriert: &str) -> &'static str {
    match aus_env.unwrap_or(konfiguriert) {
        "json" => "json",
        _ => "text",
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
