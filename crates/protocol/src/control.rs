//! Control-Protokoll (WebSocket, JSON-Textframes)
//!
//! Definiert alle Nachrichten die zwischen Client und Relay ausgetauscht
//! werden.
//!
//! ## Design
//! - Request/Response Pattern: jede Nachricht hat eine `request_id: u32`,
//!   direkte Antworten kopieren sie, Server-Pushes tragen `0`
//! - JSON-Serialisierung via serde
//! - Tagged Enums fuer typsichere Nachrichtentypen, getrennt nach Richtung
//! - Offer/Answer/ICE-Payloads sind opak (`serde_json::Value`) und werden
//!   unveraendert weitergereicht

use serde::{Deserialize, Serialize};
use instatalk_core::types::{CallId, ConnectionId, RoomId, UserId};

/// `request_id` fuer unaufgeforderte Server-Pushes
pub const PUSH_REQUEST_ID: u32 = 0;

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    InvalidRequest,
    // Identitaet
    NotIdentified,
    AlreadyIdentified,
    IdentityRejected,
    // Chat
    PersistenceFailed,
    // Anruf
    CallAlreadyActive,
    NoActiveCall,
    InvalidCallState,
    // Server
    ServerFull,
}

// ---------------------------------------------------------------------------
// Anruf-Typen
// ---------------------------------------------------------------------------

/// Art des Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

/// Grund fuer das Ende eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// Angenommen und danach aufgelegt
    AcceptedThenHangup,
    /// Vom Angerufenen abgelehnt
    Rejected,
    /// Vom Anrufer vor der Annahme abgebrochen
    CallerCancelled,
    /// Verbindung eines Teilnehmers getrennt
    PeerDisconnected,
    /// Client-seitiges Klingel-Timeout
    Timeout,
}

// ---------------------------------------------------------------------------
// Client -> Relay
// ---------------------------------------------------------------------------

/// Identitaet der Verbindung bekanntgeben
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceIdentityRequest {
    /// Handshake-Token, wird vom Identity-Resolver in eine User-ID aufgeloest
    pub token: String,
}

/// Raum betreten oder verlassen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRequest {
    pub room_id: RoomId,
}

/// Chat-Nachricht senden (wird zuerst persistiert)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub content: String,
}

/// Tipp-Indikator (Start oder Stop)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingRequest {
    pub room_id: RoomId,
}

/// Anruf starten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInitiateRequest {
    /// Angerufener Benutzer
    pub target: UserId,
    /// SDP-Offer (opak)
    pub offer: serde_json::Value,
    pub kind: CallKind,
    /// Anzeigename des Anrufers fuer den Klingel-Dialog
    #[serde(default)]
    pub caller_name: Option<String>,
    /// Avatar-URL des Anrufers
    #[serde(default)]
    pub caller_avatar: Option<String>,
}

/// Anruf annehmen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAnswerRequest {
    /// Der Anrufer
    pub target: UserId,
    /// SDP-Answer (opak)
    pub answer: serde_json::Value,
}

/// ICE-Kandidat an die Gegenseite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub target: UserId,
    pub candidate: serde_json::Value,
}

/// Anruf beenden (Auflegen, Ablehnen, Abbrechen)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEndRequest {
    pub target: UserId,
    /// Ohne Angabe leitet der Relay den Grund aus dem Zustand ab
    #[serde(default)]
    pub reason: Option<EndReason>,
}

/// Nachrichten-History eines Raums laden (Cursor-Pagination)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub room_id: RoomId,
    /// Nur Nachrichten vor diesem Zeitpunkt (RFC 3339)
    #[serde(default)]
    pub before: Option<String>,
    /// Maximale Anzahl
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Ping (Client -> Server oder Server -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Alle Nachrichten vom Client an den Relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPayload {
    // Identitaet
    AnnounceIdentity(AnnounceIdentityRequest),

    // Raeume
    JoinRoom(RoomRequest),
    LeaveRoom(RoomRequest),

    // Chat
    SendMessage(SendMessageRequest),
    TypingStart(TypingRequest),
    TypingStop(TypingRequest),
    LoadHistory(HistoryRequest),

    // Anruf-Signaling
    CallInitiate(CallInitiateRequest),
    CallAnswer(CallAnswerRequest),
    IceCandidate(IceCandidateRequest),
    CallEnd(CallEndRequest),

    // Keepalive
    Ping(PingMessage),
    Pong(PongMessage),
}

// ---------------------------------------------------------------------------
// Relay -> Client
// ---------------------------------------------------------------------------

/// Bestaetigung der Identitaet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiedResponse {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
}

/// Vollstaendige Liste aller online Benutzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub online: Vec<UserId>,
}

/// Bestaetigung fuer Raum-Beitritt / -Austritt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomAck {
    pub room_id: RoomId,
}

/// Persistierte Chat-Nachricht (Echo des Persistenz-Dienstes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub message_id: String,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    /// RFC 3339
    pub created_at: String,
}

/// Umschlag fuer `message_sent` und `message_received`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message: MessageInfo,
}

/// Antwort auf `load_history`, aufsteigend nach `created_at`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub room_id: RoomId,
    pub messages: Vec<MessageInfo>,
}

/// Tipp-Indikator an die anderen Raum-Mitglieder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingEvent {
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// Antwort an den Anrufer nach erfolgreichem Start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStartedResponse {
    pub call_id: CallId,
    pub callee: UserId,
    /// Ob der Angerufene zum Zeitpunkt des Anrufs online war (nur Info)
    pub callee_online: bool,
}

/// Eingehender Anruf (an alle Geraete des Angerufenen)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallIncoming {
    pub call_id: CallId,
    pub from: UserId,
    pub kind: CallKind,
    pub offer: serde_json::Value,
    pub caller_name: Option<String>,
    pub caller_avatar: Option<String>,
}

/// Anruf wurde angenommen (an den Anrufer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAccepted {
    pub call_id: CallId,
    pub from: UserId,
    pub answer: serde_json::Value,
}

/// Anruf wurde auf einem anderen Geraet angenommen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAnsweredElsewhere {
    pub call_id: CallId,
}

/// Weitergeleiteter ICE-Kandidat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateEvent {
    pub call_id: CallId,
    pub from: UserId,
    pub candidate: serde_json::Value,
}

/// Anruf beendet (an beide Seiten)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEnded {
    pub call_id: CallId,
    /// Die jeweils andere Partei aus Sicht des Empfaengers
    pub peer: UserId,
    pub reason: EndReason,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    /// Originaler Timestamp aus dem Ping
    pub echo_timestamp_ms: u64,
    /// Server-eigener Timestamp
    pub server_timestamp_ms: u64,
}

/// Standardisierte Fehler-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

/// Alle Nachrichten vom Relay an den Client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPayload {
    // Identitaet & Presence
    Identified(IdentifiedResponse),
    PresenceSnapshot(PresenceSnapshot),

    // Raeume
    RoomJoined(RoomAck),
    RoomLeft(RoomAck),

    // Chat
    MessageSent(MessageEvent),
    MessageReceived(MessageEvent),
    TypingStart(TypingEvent),
    TypingStop(TypingEvent),
    History(HistoryResponse),

    // Anruf-Signaling
    CallStarted(CallStartedResponse),
    CallIncoming(CallIncoming),
    CallAccepted(CallAccepted),
    CallAnsweredElsewhere(CallAnsweredElsewhere),
    IceCandidate(IceCandidateEvent),
    CallEnded(CallEnded),

    // Keepalive
    Ping(PingMessage),
    Pong(PongMessage),

    // Error
    Error(ErrorResponse),
}

// ---------------------------------------------------------------------------
// Umschlaege
// ---------------------------------------------------------------------------

/// Nachricht vom Client mit Request-Zuordnung
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Vom Client vergebene ID, wird in direkten Antworten gespiegelt
    #[serde(default)]
    pub request_id: u32,
    pub payload: ClientPayload,
}

impl ClientMessage {
    /// Erstellt eine neue Client-Nachricht
    pub fn new(request_id: u32, payload: ClientPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Nachricht vom Relay an den Client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    pub request_id: u32,
    pub payload: ServerPayload,
}

impl ServerMessage {
    /// Erstellt eine direkte Antwort
    pub fn new(request_id: u32, payload: ServerPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Erstellt einen unaufgeforderten Push
    pub fn push(payload: ServerPayload) -> Self {
        Self::new(PUSH_REQUEST_ID, payload)
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(timestamp_ms: u64) -> Self {
        Self::push(ServerPayload::Ping(PingMessage { timestamp_ms }))
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ServerPayload::Pong(PongMessage {
                echo_timestamp_ms,
                server_timestamp_ms,
            }),
        )
    }

    /// Erstellt eine Fehler-Antwort
    pub fn error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ServerPayload::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }

    /// Gibt den Fehler-Code zurueck falls es eine Fehler-Antwort ist
    pub fn fehler_code(&self) -> Option<ErrorCode> {
        match &self.payload {
            ServerPayload::Error(e) => Some(e.code),
            _ => None,
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_json_format_ist_stabil() {
        let json = r#"{"request_id":7,"payload":{"type":"join_room","room_id":"r1"}}"#;
        let msg = ClientMessage::from_json(json).unwrap();
        assert_eq!(msg.request_id, 7);
        match msg.payload {
            ClientPayload::JoinRoom(r) => assert_eq!(r.room_id.as_str(), "r1"),
            andere => panic!("Erwartet JoinRoom, erhalten {andere:?}"),
        }
    }

    #[test]
    fn request_id_ist_optional() {
        let json = r#"{"payload":{"type":"typing_stop","room_id":"r1"}}"#;
        let msg = ClientMessage::from_json(json).unwrap();
        assert_eq!(msg.request_id, 0);
    }

    #[test]
    fn call_initiate_mit_opakem_offer() {
        let json = r#"{"request_id":1,"payload":{"type":"call_initiate","target":"bob",
            "offer":{"type":"offer","sdp":"v=0"},"kind":"video"}}"#;
        let msg = ClientMessage::from_json(json).unwrap();
        if let ClientPayload::CallInitiate(req) = msg.payload {
            assert_eq!(req.kind, CallKind::Video);
            assert_eq!(req.offer["sdp"], "v=0");
            assert!(req.caller_name.is_none());
        } else {
            panic!("Erwartet CallInitiate-Payload");
        }
    }

    #[test]
    fn end_reason_kebab_case() {
        let json = serde_json::to_string(&EndReason::PeerDisconnected).unwrap();
        assert_eq!(json, "\"peer-disconnected\"");
        let grund: EndReason = serde_json::from_str("\"caller-cancelled\"").unwrap();
        assert_eq!(grund, EndReason::CallerCancelled);
    }

    #[test]
    fn error_response_serialisierung() {
        let msg = ServerMessage::error(42, ErrorCode::CallAlreadyActive, "Anruf laeuft bereits");
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("CALL_ALREADY_ACTIVE"));
        let decoded = ServerMessage::from_json(&json).unwrap();
        assert_eq!(decoded.request_id, 42);
        assert_eq!(decoded.fehler_code(), Some(ErrorCode::CallAlreadyActive));
    }

    #[test]
    fn push_traegt_request_id_null() {
        let msg = ServerMessage::push(ServerPayload::PresenceSnapshot(PresenceSnapshot {
            online: vec![UserId("a".into())],
        }));
        assert_eq!(msg.request_id, PUSH_REQUEST_ID);
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"presence_snapshot\""));
        assert!(json.contains("\"online\":[\"a\"]"));
    }

    #[test]
    fn load_history_ohne_cursor() {
        let json = r#"{"request_id":3,"payload":{"type":"load_history","room_id":"r1"}}"#;
        match ClientMessage::from_json(json).unwrap().payload {
            ClientPayload::LoadHistory(r) => {
                assert!(r.before.is_none());
                assert!(r.limit.is_none());
            }
            andere => panic!("Erwartet LoadHistory, erhalten {andere:?}"),
        }
    }

    #[test]
    fn unbekannter_typ_wird_abgelehnt() {
        let json = r#"{"request_id":1,"payload":{"type":"delete_message","room_id":"r1"}}"#;
        assert!(ClientMessage::from_json(json).is_err());

        // Server-Events sind keine gueltigen Client-Nachrichten
        let json = r#"{"request_id":1,"payload":{"type":"call_ended","call_id":"x"}}"#;
        assert!(ClientMessage::from_json(json).is_err());
    }
}
