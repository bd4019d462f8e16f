//! Handler fuer alle Client-Nachrichten
//!
//! Jeder Handler ist fuer einen bestimmten Nachrichtentyp zustaendig
//! und hat Zugriff auf den gemeinsamen SignalingState.

pub mod call_handler;
pub mod chat_handler;
pub mod identity_handler;
pub mod room_handler;
