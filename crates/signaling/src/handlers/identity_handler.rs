//! Identity-Handler – announce_identity
//!
//! Die Antwort (`identified`) reiht der Lifecycle-Manager selbst ein, damit
//! sie vor dem Presence-Snapshot beim Client ankommt.

use instatalk_core::types::{ConnectionId, UserId};
use instatalk_protocol::control::AnnounceIdentityRequest;

use crate::error::SignalingResult;
use crate::lifecycle::ConnectionLifecycleManager;

/// Verarbeitet die Identitaets-Ankuendigung einer Verbindung
pub async fn handle_announce_identity(
    request: AnnounceIdentityRequest,
    request_id: u32,
    connection_id: ConnectionId,
    lifecycle: &ConnectionLifecycleManager,
) -> SignalingResult<UserId> {
    lifecycle
        .identitaet_ankuendigen(connection_id, &request.token, request_id)
        .await
}
