//! Unit-Tests fuer den InMemoryStore

use instatalk_core::{RoomId, UserId};

use crate::{memory::InMemoryStore, store::MessageStore, types::HistoryAnfrage};

fn raum(s: &str) -> RoomId {
    RoomId::parse(s).expect("Raum-ID ungueltig")
}

fn user(s: &str) -> UserId {
    UserId::parse(s).expect("User-ID ungueltig")
}

#[tokio::test]
async fn test_history_aufsteigend_sortiert() {
    let store = InMemoryStore::neu();
    let r = raum("r1");
    for text in ["eins", "zwei", "drei"] {
        store
            .nachricht_anhaengen(&r, &user("alice"), text)
            .await
            .expect("Speichern fehlgeschlagen");
    }

    let verlauf = store
        .history_laden(HistoryAnfrage::neueste(r))
        .await
        .expect("History laden fehlgeschlagen");

    let inhalte: Vec<_> = verlauf.iter().map(|n| n.content.as_str()).collect();
    assert_eq!(inhalte, vec!["eins", "zwei", "drei"]);
    assert!(verlauf.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn test_history_limit_liefert_neueste() {
    let store = InMemoryStore::neu();
    let r = raum("r1");
    for i in 0..10 {
        store
            .nachricht_anhaengen(&r, &user("bob"), &format!("n{i}"))
            .await
            .expect("Speichern fehlgeschlagen");
    }

    let verlauf = store
        .history_laden(HistoryAnfrage {
            room_id: r,
            before: None,
            limit: Some(3),
        })
        .await
        .expect("History laden fehlgeschlagen");

    let inhalte: Vec<_> = verlauf.iter().map(|n| n.content.as_str()).collect();
    assert_eq!(inhalte, vec!["n7", "n8", "n9"]);
}

#[tokio::test]
async fn test_history_before_cursor() {
    let store = InMemoryStore::neu();
    let r = raum("r1");
    let erste = store
        .nachricht_anhaengen(&r, &user("alice"), "alt")
        .await
        .expect("Speichern fehlgeschlagen");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let zweite = store
        .nachricht_anhaengen(&r, &user("alice"), "neu")
        .await
        .expect("Speichern fehlgeschlagen");

    let verlauf = store
        .history_laden(HistoryAnfrage {
            room_id: r,
            before: Some(zweite.created_at),
            limit: None,
        })
        .await
        .expect("History laden fehlgeschlagen");

    assert_eq!(verlauf.len(), 1);
    assert_eq!(verlauf[0].id, erste.id);
}

#[tokio::test]
async fn test_raeume_getrennt() {
    let store = InMemoryStore::neu();
    store
        .nachricht_anhaengen(&raum("a"), &user("alice"), "x")
        .await
        .expect("Speichern fehlgeschlagen");

    let leer = store
        .history_laden(HistoryAnfrage::neueste(raum("b")))
        .await
        .expect("History laden fehlgeschlagen");
    assert!(leer.is_empty());
    assert_eq!(store.anzahl_in(&raum("a")), 1);
}
