mod common;

use devtalk::chats::{ChatError, events::ServerEvent, ws::dispatch};
use serde_json::json;

use crate::common::*;

#[tokio::test]
async fn message_to_an_absent_receiver_is_stored_but_not_relayed() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let (alice_conn, mut alice_rx) = chats.relay().connect();
    let (_bob_conn, mut bob_rx) = chats.relay().connect();
    chats.relay().join(alice_conn, alice.id, bob.id);

    let delivery = chats.handle_incoming_live_message(alice.id, bob.id, "hello").await.unwrap();
    assert_eq!(delivery.message.text, "hello");

    // Bob is connected but never opened the conversation.
    assert!(drain(&mut bob_rx).is_empty());
    // The room echoes to the sender's own joined connection.
    assert_eq!(received_texts(&mut alice_rx), vec![(alice.id, "hello".to_owned())]);

    let view = chats.open_conversation(bob.id, &alice.id.to_string()).await.unwrap();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].sender_id, alice.id);
    assert_eq!(view.messages[0].text, "hello");
}

#[tokio::test]
async fn nobody_joined_is_not_an_error() {
    let state = test_state().await;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let delivery = state.chats.handle_incoming_live_message(alice.id, bob.id, "anyone?").await.unwrap();
    assert_eq!(delivery.delivered, 0);

    let conversation = state.chats.store().find_or_create(alice.id, bob.id).await.unwrap();
    assert_eq!(conversation.messages, vec![delivery.message]);
}

#[tokio::test]
async fn both_participants_receive() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let (alice_conn, mut alice_rx) = chats.relay().connect();
    let (bob_conn, mut bob_rx) = chats.relay().connect();
    chats.relay().join(alice_conn, alice.id, bob.id);
    chats.relay().join(bob_conn, bob.id, alice.id);

    let delivery = chats.handle_incoming_live_message(alice.id, bob.id, "hi").await.unwrap();
    assert_eq!(delivery.delivered, 2);

    for rx in [&mut alice_rx, &mut bob_rx] {
        let events = drain(rx);
        assert_eq!(events.len(), 1);
        let ServerEvent::ReceiveMessage(msg) = &events[0] else {
            panic!("expected receiveMessage, got {events:?}");
        };
        assert_eq!((msg.sender_id, msg.receiver_id, msg.text.as_str()), (alice.id, bob.id, "hi"));
        assert_eq!(msg.created_at, delivery.message.created_at);
    }
}

#[tokio::test]
async fn every_open_tab_receives() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let (tab1, mut tab1_rx) = chats.relay().connect();
    let (tab2, mut tab2_rx) = chats.relay().connect();
    chats.relay().join(tab1, alice.id, bob.id);
    chats.relay().join(tab2, alice.id, bob.id);

    chats.handle_incoming_live_message(bob.id, alice.id, "yo").await.unwrap();

    assert_eq!(received_texts(&mut tab1_rx), vec![(bob.id, "yo".to_owned())]);
    assert_eq!(received_texts(&mut tab2_rx), vec![(bob.id, "yo".to_owned())]);
}

#[tokio::test]
async fn disconnected_connection_gets_nothing() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let (alice_conn, mut alice_rx) = chats.relay().connect();
    chats.relay().join(alice_conn, alice.id, bob.id);
    chats.relay().disconnect(alice_conn);

    let delivery = chats.handle_incoming_live_message(bob.id, alice.id, "still there?").await.unwrap();
    assert_eq!(delivery.delivered, 0);
    assert!(drain(&mut alice_rx).is_empty());
}

#[tokio::test]
async fn rejected_messages_have_no_effect() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;
    let ghost = uuid::Uuid::new_v4();

    let (conn, mut rx) = chats.relay().connect();
    chats.relay().join(conn, alice.id, bob.id);
    chats.relay().join(conn, alice.id, ghost);

    let empty = chats.handle_incoming_live_message(alice.id, bob.id, "  ").await;
    assert!(matches!(empty, Err(ChatError::Validation(_))), "got {empty:?}");

    let unknown = chats.handle_incoming_live_message(alice.id, ghost, "hello?").await;
    assert!(matches!(unknown, Err(ChatError::NotFound(_))), "got {unknown:?}");

    let to_self = chats.handle_incoming_live_message(alice.id, alice.id, "me").await;
    assert!(matches!(to_self, Err(ChatError::Validation(_))), "got {to_self:?}");

    assert!(drain(&mut rx).is_empty());
    assert!(chats.store().list_for_participant(alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn open_conversation_validates_target() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;

    let malformed = chats.open_conversation(alice.id, "not-an-id").await;
    assert!(matches!(malformed, Err(ChatError::Validation(_))), "got {malformed:?}");

    let myself = chats.open_conversation(alice.id, &alice.id.to_string()).await;
    assert!(matches!(myself, Err(ChatError::Validation(_))), "got {myself:?}");

    let unknown = chats.open_conversation(alice.id, &uuid::Uuid::new_v4().to_string()).await;
    assert!(matches!(unknown, Err(ChatError::NotFound(_))), "got {unknown:?}");

    assert!(chats.store().list_for_participant(alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn open_conversation_resolves_self_and_other() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let from_alice = chats.open_conversation(alice.id, &bob.id.to_string()).await.unwrap();
    let from_bob = chats.open_conversation(bob.id, &alice.id.to_string()).await.unwrap();

    assert_eq!(from_alice.chat_id, from_bob.chat_id);
    assert_eq!(from_alice.current_user.id, alice.id);
    assert_eq!(from_alice.other_user.id, bob.id);
    assert_eq!(from_alice.other_user.display_name, bob.name);
    assert_eq!(from_bob.current_user.display_name, bob.name);
    assert_eq!(from_bob.other_user.display_name, alice.name);
    assert_eq!(from_alice.participants, from_bob.participants);
}

#[tokio::test]
async fn list_conversations_enriches_summaries() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;
    let carol = seed_user(&state.db_pool, "Carol", "Cruz").await;

    chats.open_conversation(alice.id, &carol.id.to_string()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    chats.handle_incoming_live_message(bob.id, alice.id, "hey alice").await.unwrap();

    let list = chats.list_conversations(alice.id).await.unwrap();
    assert_eq!(list.len(), 2);

    assert_eq!(list[0].other_user.as_ref().unwrap().id, bob.id);
    let last = list[0].last_message.as_ref().unwrap();
    assert_eq!(last.text, "hey alice");
    assert_eq!(last.sender_id, bob.id);
    assert_eq!(last.sender_name.as_deref(), Some(bob.name.as_str()));
    assert_eq!(list[0].message_count, 1);

    assert_eq!(list[1].other_user.as_ref().unwrap().display_name, carol.name);
    assert!(list[1].last_message.is_none());
}

#[tokio::test]
async fn socket_frames_join_and_send() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let (alice_conn, mut alice_rx) = chats.relay().connect();
    let (bob_conn, mut bob_rx) = chats.relay().connect();

    let join = |me: &TestUser, them: &TestUser| {
        json!({ "event": "joinChat", "data": { "senderId": me.id, "receiverId": them.id } }).to_string()
    };
    dispatch(chats, alice_conn, alice.id, &join(&alice, &bob)).await;
    dispatch(chats, bob_conn, bob.id, &join(&bob, &alice)).await;

    let send = json!({
        "event": "sendMessage",
        "data": { "senderId": alice.id, "receiverId": bob.id, "text": "over the wire" }
    });
    dispatch(chats, alice_conn, alice.id, &send.to_string()).await;

    assert_eq!(received_texts(&mut alice_rx), vec![(alice.id, "over the wire".to_owned())]);
    assert_eq!(received_texts(&mut bob_rx), vec![(alice.id, "over the wire".to_owned())]);
}

#[tokio::test]
async fn socket_frames_are_checked() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let (conn, mut rx) = chats.relay().connect();

    dispatch(chats, conn, alice.id, "{not json").await;

    // Alice's socket may not speak for Bob.
    let spoofed = json!({
        "event": "sendMessage",
        "data": { "senderId": bob.id, "receiverId": alice.id, "text": "it's me, bob" }
    });
    dispatch(chats, conn, alice.id, &spoofed.to_string()).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, ServerEvent::Error { .. })));
    assert!(chats.store().list_for_participant(bob.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn leave_chat_frame_stops_delivery() {
    let state = test_state().await;
    let chats = &state.chats;
    let alice = seed_user(&state.db_pool, "Alice", "Anders").await;
    let bob = seed_user(&state.db_pool, "Bob", "Berg").await;

    let (conn, mut rx) = chats.relay().connect();
    let pair = json!({ "senderId": alice.id, "receiverId": bob.id });
    dispatch(chats, conn, alice.id, &json!({ "event": "joinChat", "data": pair.clone() }).to_string()).await;
    dispatch(chats, conn, alice.id, &json!({ "event": "leaveChat", "data": pair }).to_string()).await;

    chats.handle_incoming_live_message(bob.id, alice.id, "gone?").await.unwrap();
    assert!(drain(&mut rx).is_empty());
}
