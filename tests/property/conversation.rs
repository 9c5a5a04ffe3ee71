#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Property-based tests for conversation history.
//!
//! Uses proptest to verify, for both store backends:
//! 1. A conversation reads the same from either participant.
//! 2. Every message between the pair appears exactly once, text unchanged.
//! 3. Messages involving a third member never leak into the pair's history.
//! 4. History is ordered by `createdAt`, ties in insertion order.
//! 5. Arbitrary text frames never panic the event decoder.

use matchchat_proto::event::{self, ClientEvent};
use matchchat_proto::message::{Draft, Message, UserId};
use matchchat_server::sqlite::SqliteStore;
use matchchat_server::store::{MemoryStore, MessageStore};
use proptest::prelude::*;

const MEMBERS: [&str; 3] = ["alice", "bob", "carol"];

/// Strategy for a `(sender, receiver, text)` triple among three members.
fn arb_send() -> impl Strategy<Value = (usize, usize, String)> {
    (0..MEMBERS.len(), 0..MEMBERS.len(), "[a-zA-Z0-9 ]{0,7}[a-zA-Z0-9]")
}

fn append_all(store: &dyn MessageStore, sends: &[(usize, usize, String)]) -> Vec<Message> {
    sends
        .iter()
        .map(|(from, to, text)| {
            store
                .append(Draft::new(MEMBERS[*from], MEMBERS[*to], text.clone()))
                .unwrap()
        })
        .collect()
}

fn check_conversation(store: &dyn MessageStore, sends: &[(usize, usize, String)]) {
    let stored = append_all(store, sends);
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    let forward = store.list_conversation(&alice, &bob).unwrap();
    let backward = store.list_conversation(&bob, &alice).unwrap();
    assert_eq!(forward, backward);

    let expected: Vec<&Message> = stored.iter().filter(|m| m.is_between(&alice, &bob)).collect();
    assert_eq!(forward.len(), expected.len());
    for (got, want) in forward.iter().zip(&expected) {
        assert_eq!(got, *want);
    }

    assert!(forward.iter().all(|m| m.is_between(&alice, &bob)));
    assert!(forward.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

proptest! {
    #[test]
    fn memory_conversation_is_complete_and_ordered(sends in prop::collection::vec(arb_send(), 0..40)) {
        check_conversation(&MemoryStore::new(), &sends);
    }

    #[test]
    fn sqlite_conversation_is_complete_and_ordered(sends in prop::collection::vec(arb_send(), 0..40)) {
        check_conversation(&SqliteStore::open_in_memory().unwrap(), &sends);
    }

    #[test]
    fn arbitrary_frames_never_panic_decoder(frame in "\\PC{0,256}") {
        let _ = event::decode::<ClientEvent>(&frame);
    }
}
