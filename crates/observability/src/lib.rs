//! # instatalk-observability
//!
//! Observability-Crate fuer den InstaTalk-Relay:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{health_router, HealthResponse, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, RelayMetrics};

use anyhow::Result;
use axum::Router;
use instatalk_signaling::SignalingState;
use std::net::SocketAddr;
use std::sync::Arc;

/// Router mit `/metrics` und `/health`
pub fn observability_router(relay: Arc<SignalingState>) -> Result<Router> {
    Ok(Router::new()
        .merge(metrics_router(Arc::clone(&relay))?)
        .merge(health_router(relay)))
}

/// Startet den Observability-HTTP-Server auf eigenem Port
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    relay: Arc<SignalingState>,
) -> Result<()> {
    let app = observability_router(relay)?;

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, app).await?;
    Ok(())
}
