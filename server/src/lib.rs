//! instatalk-server – Bibliotheks-Root
//!
//! Baut den Relay-Zustand aus der Konfiguration, stellt den HTTP-Router
//! (`/ws`, `/stats`, `/health`, `/metrics`) bereit und betreibt ihn bis zum
//! Shutdown-Signal.

pub mod config;

use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use config::{IdentitaetsModus, ServerConfig};
use instatalk_auth::{IdentityResolver, SessionTokenResolver, TrustedIdentity};
use instatalk_chat::{ChatService, InMemoryStore};
use instatalk_signaling::{ClientConnection, SignalingState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Geteilter Zustand der HTTP-Handler
#[derive(Clone)]
struct AppState {
    relay: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    relay: Arc<SignalingState>,
    sessions: Option<Arc<SessionTokenResolver>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    ///
    /// Im Session-Modus muss ein vorgelagerter Auth-Dienst die Tokens ueber
    /// [`Server::sessions`] hinterlegen, bevor sich Clients verbinden.
    pub fn neu(config: ServerConfig) -> Self {
        let store = ChatService::mit_max_laenge(
            Arc::new(InMemoryStore::neu()),
            config.relay.max_nachrichten_laenge,
        );

        let sessions = match config.identitaet.modus {
            IdentitaetsModus::Trusted => None,
            IdentitaetsModus::Session => Some(SessionTokenResolver::neu()),
        };
        let identitaet: Arc<dyn IdentityResolver> = match &sessions {
            Some(sessions) => sessions.clone(),
            None => Arc::new(TrustedIdentity),
        };

        let relay = SignalingState::neu(config.signaling_config(), store, identitaet);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            relay,
            sessions,
            shutdown_tx,
        }
    }

    /// Gemeinsamer Relay-Zustand
    pub fn relay(&self) -> &Arc<SignalingState> {
        &self.relay
    }

    /// Session-Tabelle (nur im Session-Modus)
    pub fn sessions(&self) -> Option<&Arc<SessionTokenResolver>> {
        self.sessions.as_ref()
    }

    /// Baut den HTTP-Router mit allen Endpunkten
    pub fn router(&self) -> Result<Router> {
        let state = AppState {
            relay: Arc::clone(&self.relay),
            shutdown_rx: self.shutdown_tx.subscribe(),
        };

        let mut app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/stats", get(stats_handler))
            .with_state(state);

        if self.config.observability.aktiviert && self.config.observability.port.is_none() {
            app = app.merge(instatalk_observability::observability_router(Arc::clone(
                &self.relay,
            ))?);
        }

        Ok(app
            .layer(TraceLayer::new_for_http())
            .layer(self.cors_layer()))
    }

    /// CORS: entweder spezifische Origins oder alle
    fn cors_layer(&self) -> CorsLayer {
        let origins = &self.config.netzwerk.cors_origins;
        if origins.is_empty() {
            return CorsLayer::permissive();
        }

        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Session-Cleanup starten (Session-Modus)
    /// 2. Observability-Server auf eigenem Port (falls konfiguriert)
    /// 3. HTTP/WebSocket-Listener starten
    /// 4. Auf Ctrl-C warten, offene Verbindungen benachrichtigen
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %self.config.bind_adresse(),
            identitaet = ?self.config.identitaet.modus,
            max_verbindungen = self.config.relay.max_verbindungen,
            "Relay startet"
        );

        if let Some(sessions) = &self.sessions {
            SessionTokenResolver::mit_cleanup(Arc::clone(sessions));
        }

        if self.config.observability.aktiviert {
            if let Some(adresse) = self.config.observability_bind_adresse() {
                let bind_addr: SocketAddr = adresse.parse()?;
                let relay = Arc::clone(&self.relay);
                tokio::spawn(async move {
                    if let Err(e) =
                        instatalk_observability::observability_server_starten(bind_addr, relay).await
                    {
                        tracing::error!(fehler = %e, "Observability-Server beendet");
                    }
                });
            }
        }

        let app = self.router()?;
        let listener = tokio::net::TcpListener::bind(self.config.bind_adresse()).await?;
        tracing::info!(adresse = %self.config.bind_adresse(), "Relay laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");

        let shutdown_tx = self.shutdown_tx.clone();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht installiert werden");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown-Signal empfangen, Relay wird beendet");
            let _ = shutdown_tx.send(true);
        })
        .await?;

        Ok(())
    }
}

/// `GET /ws` – WebSocket-Upgrade, danach ein Task pro Verbindung
async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let peer_addr = connect_info.map(|ConnectInfo(addr)| addr);
    ws.on_upgrade(move |socket| {
        ClientConnection::neu(state.relay, peer_addr).verarbeiten(socket, state.shutdown_rx)
    })
}

/// `GET /stats` – Momentaufnahme des Relays
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.statistik())
}
