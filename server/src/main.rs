//! InstaTalk Relay – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Relay.

use anyhow::Result;
use instatalk_observability::logging_initialisieren;
use instatalk_server::{
    config::{ServerConfig, ENV_CONFIG_PFAD},
    Server,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var(ENV_CONFIG_PFAD).unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "InstaTalk Relay wird initialisiert"
    );

    let server = Server::neu(config);
    server.starten().await?;

    Ok(())
}
