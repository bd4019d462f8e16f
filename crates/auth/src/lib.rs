//! instatalk-auth – Identitaets-Aufloesung
//!
//! Der Relay stellt selbst keine Credentials aus. Er vertraut einer
//! Identitaet, die ihm beim `announce_identity` uebergeben wird, und loest
//! sie ueber einen `IdentityResolver` auf:
//! - `TrustedIdentity`: Token ist die User-ID (vorgelagerte Auth)
//! - `SessionTokenResolver`: In-Memory Token-Tabelle mit TTL, von einem
//!   externen Auth-Dienst befuellt

pub mod error;
pub mod identity;
pub mod session;

// Bequeme Re-Exporte
pub use error::{AuthError, AuthResult};
pub use identity::{IdentityResolver, TrustedIdentity};
pub use session::{Session, SessionTokenResolver};
