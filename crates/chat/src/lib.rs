//! instatalk-chat – Nachrichten-Persistenz fuer den Relay
//!
//! Dieses Crate implementiert:
//! - MessageStore: Persistenz-Schnittstelle, die der Relay vor jedem Fan-out aufruft
//! - ChatService: Validierung (leer, Maximallaenge) vor dem Speichern
//! - InMemoryStore: Referenz-Implementierung mit History pro Raum
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use instatalk_chat::{ChatService, InMemoryStore, MessageStore};
//! use instatalk_core::{RoomId, UserId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryStore::neu());
//!     let chat = ChatService::neu(store);
//!
//!     let raum = RoomId::parse("r1").unwrap();
//!     let sender = UserId::parse("alice").unwrap();
//!     let nachricht = chat.nachricht_anhaengen(&raum, &sender, "Hallo").await.unwrap();
//!     println!("{}", nachricht.id);
//! }
//! ```

pub mod error;
pub mod memory;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use error::{ChatError, ChatResult};
pub use memory::InMemoryStore;
pub use service::{ChatService, MAX_NACHRICHTEN_LAENGE};
pub use store::MessageStore;
pub use types::{GespeicherteNachricht, HistoryAnfrage};
