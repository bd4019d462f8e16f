//! instatalk-signaling – WebSocket-Relay
//!
//! Dieser Crate implementiert den Echtzeit-Relay fuer InstaTalk. Er verwaltet
//! WebSocket-Verbindungen, Presence, Raum-Mitgliedschaften, das Verteilen
//! persistierter Nachrichten, Tipp-Indikatoren und das Anruf-Signaling.
//!
//! ## Architektur
//!
//! ```text
//! /ws (axum WebSocketUpgrade)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task + Schreib-Task + Chat-Worker)
//!     |  Lifecycle: Verbindend -> Identifiziert -> Geschlossen
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- IdentityHandler  (announce_identity)
//!     +-- RoomHandler      (join_room, leave_room)
//!     +-- ChatHandler      (send_message, typing_*, load_history)
//!     +-- CallHandler      (call_initiate, call_answer, ice_candidate, call_end)
//!
//! RelayTabellen (eine Sperre)
//!     ConnectionRegistry        – Wer ist online, mit welchen Verbindungen
//!     RoomMultiplexer           – Welche Verbindung ist in welchem Raum
//!     CallSignalingStateMachine – Laufende Anrufe pro User-Paar
//!
//! EventBroadcaster – Ausgangs-Queue pro Verbindung
//! ```

pub mod broadcast;
pub mod call;
pub mod chat_worker;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod message_relay;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod server_state;
pub mod typing;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use call::CallSignalingStateMachine;
pub use chat_worker::ChatWorker;
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use lifecycle::ConnectionLifecycleManager;
pub use message_relay::MessageRelay;
pub use presence::PresenceBroadcaster;
pub use registry::ConnectionRegistry;
pub use rooms::RoomMultiplexer;
pub use server_state::{
    AnrufErgebnis, RelayStatistik, SignalingConfig, SignalingState, VerbindungsZustand,
};
pub use typing::TypingCoordinator;
