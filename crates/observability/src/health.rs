//! Health-Check-Endpunkt fuer den InstaTalk-Relay
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Verbindungsauslastung

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use instatalk_signaling::SignalingState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ab dieser Auslastung gilt der Relay als `degraded`
const AUSLASTUNG_DEGRADED: f64 = 0.9;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub open_connections: usize,
    pub max_connections: usize,
}

impl HealthResponse {
    /// Bewertet den aktuellen Relay-Zustand
    pub fn aus_relay(state: &SignalingState) -> Self {
        let offen = state.statistik().offene_verbindungen;
        let max = state.config.max_verbindungen;

        Self {
            status: status_fuer(offen, max),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.uptime_sek(),
            open_connections: offen,
            max_connections: max,
        }
    }
}

/// Voll ausgelastet: keine neuen Verbindungen moeglich
fn status_fuer(offen: usize, max: usize) -> HealthStatus {
    if offen >= max {
        HealthStatus::Unhealthy
    } else if offen as f64 >= max as f64 * AUSLASTUNG_DEGRADED {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(relay: Arc<SignalingState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(relay)
}

/// `GET /health` – gibt den Relay-Status zurueck
async fn health_handler(State(relay): State<Arc<SignalingState>>) -> impl IntoResponse {
    let response = HealthResponse::aus_relay(&relay);

    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // Health-Check bleibt bei hoher Last erfolgreich
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use instatalk_auth::TrustedIdentity;
    use instatalk_chat::InMemoryStore;
    use instatalk_signaling::SignalingConfig;

    #[test]
    fn status_nach_auslastung() {
        assert_eq!(status_fuer(0, 100), HealthStatus::Healthy);
        assert_eq!(status_fuer(89, 100), HealthStatus::Healthy);
        assert_eq!(status_fuer(90, 100), HealthStatus::Degraded);
        assert_eq!(status_fuer(100, 100), HealthStatus::Unhealthy);
    }

    #[test]
    fn frischer_relay_ist_healthy() {
        let state = SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(InMemoryStore::neu()),
            Arc::new(TrustedIdentity),
        );
        let response = HealthResponse::aus_relay(&state);
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.open_connections, 0);
        assert_eq!(response.max_connections, 10_000);
        assert!(response.uptime_seconds < 5);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Degraded,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            open_connections: 95,
            max_connections: 100,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"degraded\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"open_connections\":95"));
    }
}
