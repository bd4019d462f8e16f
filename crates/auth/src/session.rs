//! Session-Token-Aufloesung
//!
//! Ein externer Auth-Dienst hinterlegt kurzlebige Tokens, der Relay loest
//! sie beim Identitaets-Handshake auf. Sessions werden im Speicher
//! gehalten (HashMap mit TTL). Ein Hintergrund-Task bereinigt abgelaufene
//! Sessions automatisch.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use instatalk_core::UserId;
use tokio::sync::RwLock;

use crate::error::{AuthError, AuthResult};
use crate::identity::IdentityResolver;

/// Intervall fuer den automatischen Cleanup-Task: 15 Minuten
const CLEANUP_INTERVALL: Duration = Duration::from_secs(15 * 60);

/// Ein hinterlegtes Session-Token
#[derive(Debug, Clone)]
pub struct Session {
    /// ID des Benutzers dem diese Session gehoert
    pub user_id: UserId,
    /// Zeitpunkt der Hinterlegung
    pub erstellt_am: DateTime<Utc>,
    /// Zeitpunkt des Session-Ablaufs (None = unbegrenzt)
    pub laeuft_ab_am: Option<DateTime<Utc>>,
}

impl Session {
    /// Gibt `true` zurueck wenn die Session noch gueltig ist
    pub fn ist_gueltig(&self) -> bool {
        self.laeuft_ab_am.map_or(true, |ablauf| Utc::now() < ablauf)
    }
}

/// In-Memory Token-Tabelle mit TTL-Unterstuetzung
#[derive(Debug, Default)]
pub struct SessionTokenResolver {
    /// token -> Session
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionTokenResolver {
    /// Erstellt eine neue leere Token-Tabelle
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Startet den periodischen Cleanup-Task fuer die Tabelle
    pub fn mit_cleanup(store: Arc<Self>) -> Arc<Self> {
        let store_klon = Arc::clone(&store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEANUP_INTERVALL).await;
                let entfernt = store_klon.cleanup_abgelaufene().await;
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Abgelaufene Sessions bereinigt");
                }
            }
        });
        store
    }

    /// Hinterlegt ein Token fuer einen Benutzer
    ///
    /// `ttl` = None bedeutet: gueltig bis zum Invalidieren.
    pub async fn hinterlegen(
        &self,
        token: impl Into<String>,
        user_id: UserId,
        ttl: Option<chrono::Duration>,
    ) {
        let jetzt = Utc::now();
        let session = Session {
            user_id,
            erstellt_am: jetzt,
            laeuft_ab_am: ttl.map(|d| jetzt + d),
        };
        tracing::debug!(user_id = %session.user_id, "Session-Token hinterlegt");
        self.sessions.write().await.insert(token.into(), session);
    }

    /// Invalidiert (loescht) ein Token
    pub async fn invalidieren(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Invalidiert alle Tokens eines Benutzers
    pub async fn alle_invalidieren(&self, user_id: &UserId) -> usize {
        let mut sessions = self.sessions.write().await;
        let vorher = sessions.len();
        sessions.retain(|_, s| &s.user_id != user_id);
        vorher - sessions.len()
    }

    /// Bereinigt abgelaufene Sessions und gibt die Anzahl der entfernten zurueck
    pub async fn cleanup_abgelaufene(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let vorher = sessions.len();
        sessions.retain(|_, s| s.ist_gueltig());
        vorher - sessions.len()
    }

    /// Anzahl der aktiven (nicht abgelaufenen) Sessions
    pub async fn anzahl_aktive(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|s| s.ist_gueltig()).count()
    }
}

#[async_trait]
impl IdentityResolver for SessionTokenResolver {
    async fn aufloesen(&self, token: &str) -> AuthResult<UserId> {
        if token.is_empty() {
            return Err(AuthError::TokenFehlt);
        }
        let sessions = self.sessions.read().await;
        match sessions.get(token) {
            None => Err(AuthError::SessionUngueltig),
            Some(session) if !session.ist_gueltig() => Err(AuthError::SessionAbgelaufen),
            Some(session) => Ok(session.user_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn token_hinterlegen_und_aufloesen() {
        let store = SessionTokenResolver::neu();
        store.hinterlegen("tok-a", uid("alice"), None).await;

        let aufgeloest = store.aufloesen("tok-a").await.expect("Aufloesung fehlgeschlagen");
        assert_eq!(aufgeloest, uid("alice"));
    }

    #[tokio::test]
    async fn unbekanntes_token_gibt_fehler() {
        let store = SessionTokenResolver::neu();
        let ergebnis = store.aufloesen("kein_gueltiger_token").await;
        assert!(matches!(ergebnis, Err(AuthError::SessionUngueltig)));
    }

    #[tokio::test]
    async fn abgelaufenes_token_gibt_fehler() {
        let store = SessionTokenResolver::neu();
        store
            .hinterlegen("alt", uid("alice"), Some(chrono::Duration::seconds(-1)))
            .await;
        let ergebnis = store.aufloesen("alt").await;
        assert!(matches!(ergebnis, Err(AuthError::SessionAbgelaufen)));
        assert_eq!(store.cleanup_abgelaufene().await, 1);
    }

    #[tokio::test]
    async fn alle_user_tokens_invalidieren() {
        let store = SessionTokenResolver::neu();
        store.hinterlegen("t1", uid("alice"), None).await;
        store.hinterlegen("t2", uid("alice"), None).await;
        store.hinterlegen("t3", uid("bob"), None).await;

        assert_eq!(store.alle_invalidieren(&uid("alice")).await, 2);
        assert_eq!(store.anzahl_aktive().await, 1);
        assert!(store.invalidieren("t3").await);
        assert!(!store.invalidieren("t3").await);
    }
}
