//! Prometheus-kompatible Metriken fuer den InstaTalk-Relay
//!
//! Registrierte Metriken:
//! - `instatalk_open_connections` – Gauge: Offene WebSocket-Verbindungen
//! - `instatalk_online_users` – Gauge: Benutzer mit mindestens einer Verbindung
//! - `instatalk_active_rooms` – Gauge: Raeume mit mindestens einem Mitglied
//! - `instatalk_active_calls` – Gauge: Laufende Anruf-Sitzungen
//! - `instatalk_messages_relayed_total` – Counter: Persistierte und verteilte Nachrichten
//! - `instatalk_presence_broadcasts_total` – Counter: Presence-Snapshots an alle
//! - `instatalk_call_attempts_total` – Counter: Anrufversuche (result)
//!
//! Die Werte werden beim Scrape aus dem Relay-Zustand uebernommen.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use instatalk_signaling::{AnrufErgebnis, SignalingState};
use parking_lot::Mutex;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle InstaTalk-Prometheus-Metriken
#[derive(Clone)]
pub struct RelayMetrics {
    pub registry: Arc<Registry>,

    // Zustand
    pub open_connections: IntGauge,
    pub online_users: IntGauge,
    pub active_rooms: IntGauge,
    pub active_calls: IntGauge,

    // Ereignisse
    pub messages_relayed_total: IntCounter,
    pub presence_broadcasts_total: IntCounter,
    pub call_attempts_total: IntCounterVec,

    /// Serialisiert `aktualisieren` ueber parallele Scrapes
    abgleich: Arc<Mutex<()>>,
}

impl RelayMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let open_connections = IntGauge::with_opts(Opts::new(
            "instatalk_open_connections",
            "Anzahl offener WebSocket-Verbindungen",
        ))?;
        registry.register(Box::new(open_connections.clone()))?;

        let online_users = IntGauge::with_opts(Opts::new(
            "instatalk_online_users",
            "Anzahl online Benutzer",
        ))?;
        registry.register(Box::new(online_users.clone()))?;

        let active_rooms = IntGauge::with_opts(Opts::new(
            "instatalk_active_rooms",
            "Anzahl Raeume mit mindestens einem Mitglied",
        ))?;
        registry.register(Box::new(active_rooms.clone()))?;

        let active_calls = IntGauge::with_opts(Opts::new(
            "instatalk_active_calls",
            "Anzahl laufender Anruf-Sitzungen",
        ))?;
        registry.register(Box::new(active_calls.clone()))?;

        let messages_relayed_total = IntCounter::with_opts(Opts::new(
            "instatalk_messages_relayed_total",
            "Gesamtanzahl persistierter und verteilter Nachrichten",
        ))?;
        registry.register(Box::new(messages_relayed_total.clone()))?;

        let presence_broadcasts_total = IntCounter::with_opts(Opts::new(
            "instatalk_presence_broadcasts_total",
            "Gesamtanzahl Presence-Broadcasts",
        ))?;
        registry.register(Box::new(presence_broadcasts_total.clone()))?;

        let call_attempts_total = IntCounterVec::new(
            Opts::new("instatalk_call_attempts_total", "Anrufversuche nach Ergebnis"),
            &["result"],
        )?;
        registry.register(Box::new(call_attempts_total.clone()))?;

        // Alle Labels sofort sichtbar machen
        for ergebnis in AnrufErgebnis::ALLE {
            call_attempts_total.with_label_values(&[ergebnis.label()]);
        }

        Ok(Self {
            registry: Arc::new(registry),
            open_connections,
            online_users,
            active_rooms,
            active_calls,
            messages_relayed_total,
            presence_broadcasts_total,
            call_attempts_total,
            abgleich: Arc::new(Mutex::new(())),
        })
    }

    /// Uebernimmt den aktuellen Relay-Zustand
    ///
    /// Gauges werden gesetzt, Counter um die Differenz zum Relay-Zaehler
    /// erhoeht. Die Relay-Zaehler sind monoton, daher bleibt die Differenz
    /// nicht-negativ. Parallele Aufrufe laufen nacheinander.
    pub fn aktualisieren(&self, state: &SignalingState) {
        let _abgleich = self.abgleich.lock();
        let statistik = state.statistik();
        self.open_connections.set(statistik.offene_verbindungen as i64);
        self.online_users.set(statistik.online_user as i64);
        self.active_rooms.set(statistik.aktive_raeume as i64);
        self.active_calls.set(statistik.aktive_anrufe as i64);

        nachziehen(&self.messages_relayed_total, statistik.nachrichten_verteilt);
        nachziehen(&self.presence_broadcasts_total, statistik.presence_broadcasts);
        for ergebnis in AnrufErgebnis::ALLE {
            nachziehen(
                &self.call_attempts_total.with_label_values(&[ergebnis.label()]),
                state.zaehler.anruf_versuche_gesamt(ergebnis),
            );
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn nachziehen(counter: &IntCounter, ziel: u64) {
    let aktuell = counter.get();
    if ziel > aktuell {
        counter.inc_by(ziel - aktuell);
    }
}

#[derive(Clone)]
struct MetrikZustand {
    metriken: RelayMetrics,
    relay: Arc<SignalingState>,
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(relay: Arc<SignalingState>) -> Result<Router> {
    let zustand = MetrikZustand {
        metriken: RelayMetrics::neu()?,
        relay,
    };

    Ok(Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(zustand))
}

async fn metrics_handler(State(zustand): State<MetrikZustand>) -> impl IntoResponse {
    zustand.metriken.aktualisieren(&zustand.relay);

    match zustand.metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instatalk_auth::TrustedIdentity;
    use instatalk_chat::InMemoryStore;
    use instatalk_signaling::{ConnectionLifecycleManager, SignalingConfig};

    fn relay() -> Arc<SignalingState> {
        SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(InMemoryStore::neu()),
            Arc::new(TrustedIdentity),
        )
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = RelayMetrics::neu().unwrap();
        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        assert!(namen.contains(&"instatalk_open_connections"));
        assert!(namen.contains(&"instatalk_online_users"));
        assert!(namen.contains(&"instatalk_active_rooms"));
        assert!(namen.contains(&"instatalk_active_calls"));
        assert!(namen.contains(&"instatalk_messages_relayed_total"));
        assert!(namen.contains(&"instatalk_presence_broadcasts_total"));
        assert!(namen.contains(&"instatalk_call_attempts_total"));
    }

    #[tokio::test]
    async fn aktualisieren_uebernimmt_relay_zustand() {
        let state = relay();
        let lifecycle = ConnectionLifecycleManager::neu(Arc::clone(&state));
        let (a, _rx_a) = lifecycle.verbinden().unwrap();
        let (_b, _rx_b) = lifecycle.verbinden().unwrap();
        lifecycle.identitaet_ankuendigen(a, "alice", 1).await.unwrap();
        state.zaehler.anruf_versuch(AnrufErgebnis::Besetzt);

        let metriken = RelayMetrics::neu().unwrap();
        metriken.aktualisieren(&state);
        assert_eq!(metriken.open_connections.get(), 2);
        assert_eq!(metriken.online_users.get(), 1);
        assert_eq!(metriken.presence_broadcasts_total.get(), 1);
        assert_eq!(
            metriken.call_attempts_total.with_label_values(&["busy"]).get(),
            1
        );

        // Zweiter Scrape zaehlt nicht doppelt
        metriken.aktualisieren(&state);
        assert_eq!(metriken.presence_broadcasts_total.get(), 1);
    }

    #[test]
    fn parallele_scrapes_zaehlen_nicht_doppelt() {
        let state = relay();
        let metriken = RelayMetrics::neu().unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..200 {
                        state.zaehler.presence_veroeffentlicht();
                        state.zaehler.nachricht_verteilt();
                        metriken.aktualisieren(&state);
                    }
                });
            }
        });
        metriken.aktualisieren(&state);

        assert_eq!(metriken.presence_broadcasts_total.get(), 1600);
        assert_eq!(metriken.messages_relayed_total.get(), 1600);
        assert_eq!(
            metriken.presence_broadcasts_total.get(),
            state.zaehler.presence_broadcasts_gesamt()
        );
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken.aktualisieren(&relay());

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("instatalk_open_connections 0"));
        assert!(output.contains("instatalk_call_attempts_total{result=\"started\"} 0"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
