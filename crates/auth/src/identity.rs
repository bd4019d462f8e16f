//! Identity-Resolver – Handshake-Token -> User-ID
//!
//! Wird genau einmal pro Verbindung beim `announce_identity` befragt.
//! Schlaegt die Aufloesung fehl, wird die Verbindung geschlossen ohne
//! irgendwo registriert zu werden.

use async_trait::async_trait;
use instatalk_core::UserId;

use crate::error::{AuthError, AuthResult};

/// Abstrakte Identitaets-Aufloesung
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Loest ein Handshake-Token in eine authentifizierte User-ID auf
    async fn aufloesen(&self, token: &str) -> AuthResult<UserId>;
}

/// Vertraut dem Token als User-ID
///
/// Fuer Deployments hinter einem Gateway, das die Authentifizierung
/// bereits erledigt hat. Prueft nur das Format der ID.
#[derive(Debug, Clone, Default)]
pub struct TrustedIdentity;

#[async_trait]
impl IdentityResolver for TrustedIdentity {
    async fn aufloesen(&self, token: &str) -> AuthResult<UserId> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::TokenFehlt);
        }
        Ok(UserId::parse(token)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trusted_identity_uebernimmt_token() {
        let resolver = TrustedIdentity;
        let uid = resolver.aufloesen("64f1c2a9").await.unwrap();
        assert_eq!(uid.as_str(), "64f1c2a9");
    }

    #[tokio::test]
    async fn trusted_identity_trimmt() {
        let uid = TrustedIdentity.aufloesen("  alice ").await.unwrap();
        assert_eq!(uid.as_str(), "alice");
    }

    #[tokio::test]
    async fn leeres_token_abgelehnt() {
        let ergebnis = TrustedIdentity.aufloesen("   ").await;
        assert!(matches!(ergebnis, Err(AuthError::TokenFehlt)));
    }

    #[tokio::test]
    async fn ungueltiges_format_abgelehnt() {
        let ergebnis = TrustedIdentity.aufloesen("a b").await;
        assert!(matches!(ergebnis, Err(AuthError::TokenUngueltig(_))));
    }
}
