//! instatalk-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen, Enums und Strukturen
//! die zwischen Client und Relay ausgetauscht werden.

pub mod control;

pub use control::{
    CallKind, ClientMessage, ClientPayload, EndReason, ErrorCode, ServerMessage, ServerPayload,
};
