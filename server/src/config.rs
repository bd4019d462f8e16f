//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Relay ohne Konfigurationsdatei
//! lauffaehig ist.

use instatalk_chat::MAX_NACHRICHTEN_LAENGE;
use instatalk_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const ENV_CONFIG_PFAD: &str = "INSTATALK_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Einstellungen (Keepalive, Limits)
    pub relay: RelayEinstellungen,
    /// Identitaets-Aufloesung beim Handshake
    pub identitaet: IdentitaetEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Relays
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "InstaTalk Relay".into(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    /// Port fuer HTTP und WebSocket (`/ws`)
    pub port: u16,
    /// CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 5000,
            cors_origins: vec![],
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Ohne empfangenen Frame wird nach dieser Zeit getrennt
    pub verbindungs_timeout_sek: u64,
    /// Maximale gleichzeitige Verbindungen
    pub max_verbindungen: usize,
    /// Maximale Laenge einer Chat-Nachricht in Zeichen
    pub max_nachrichten_laenge: usize,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            keepalive_sek: 25,
            verbindungs_timeout_sek: 60,
            max_verbindungen: 10_000,
            max_nachrichten_laenge: MAX_NACHRICHTEN_LAENGE,
        }
    }
}

/// Wie ein Handshake-Token in eine User-ID aufgeloest wird
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitaetsModus {
    /// Token ist die User-ID
    #[default]
    Trusted,
    /// Token muss vorab in der Session-Tabelle hinterlegt sein
    Session,
}

/// Identitaets-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitaetEinstellungen {
    pub modus: IdentitaetsModus,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert `/metrics` und `/health`
    pub aktiviert: bool,
    /// Eigener Port; ohne Angabe laufen die Endpunkte auf dem Hauptport
    pub port: Option<u16>,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: None,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer HTTP und WebSocket zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Bind-Adresse fuer einen separaten Observability-Server
    pub fn observability_bind_adresse(&self) -> Option<String> {
        self.observability
            .port
            .map(|port| format!("{}:{}", self.netzwerk.bind_adresse, port))
    }

    /// Relay-Konfiguration fuer den Signaling-Zustand
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_verbindungen: self.relay.max_verbindungen,
            keepalive_sek: self.relay.keepalive_sek,
            verbindungs_timeout_sek: self.relay.verbindungs_timeout_sek,
        }
    }
}
