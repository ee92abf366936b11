//! End-to-end coverage of the envelope protocol: inbound frames through the
//! dispatcher and use-case layer, outbound envelopes through the hub, with
//! in-memory collaborators standing in for the store.

use axum::extract::ws::Utf8Bytes;
use chat_service::entities::users::User;
use chat_service::events;
use chat_service::hub::connection::ConnInfo;
use chat_service::hub::{ConnHandle, Hub};
use chat_service::models::envelopes::ServerEnvelope;
use chat_service::repositories::memory::MemoryContext;
use chat_service::repositories::messages::MessageStore;
use tokio::sync::mpsc;
use uuid::Uuid;

const TEAM: i64 = 7;
const ALICE: i64 = 1;
const BOB: i64 = 2;

struct TestClient {
    conn: ConnInfo,
    rx: mpsc::Receiver<Utf8Bytes>,
}

impl TestClient {
    async fn connect(hub: &Hub, user_id: i64, team_id: i64) -> Self {
        let conn = ConnInfo {
            conn_id: Uuid::new_v4(),
            user_id,
            team_id,
        };
        let (handle, rx) = ConnHandle::channel(conn.conn_id, user_id, team_id);
        hub.register(handle).await;
        Self { conn, rx }
    }

    async fn recv(&mut self) -> ServerEnvelope {
        let frame = self.rx.recv().await.expect("expected an outbound frame");
        serde_json::from_str(frame.as_str()).expect("outbound frame should decode")
    }

    fn try_recv(&mut self) -> Option<ServerEnvelope> {
        self.rx
            .try_recv()
            .ok()
            .map(|frame| serde_json::from_str(frame.as_str()).expect("outbound frame should decode"))
    }
}

fn user(id: i64, display_name: &str) -> User {
    User {
        id,
        display_name: display_name.to_owned(),
        avatar_url: None,
        accent_color: None,
    }
}

async fn setup() -> (MemoryContext, Hub) {
    let ctx = MemoryContext::new();
    ctx.join_team(user(ALICE, "Alice"), TEAM).await;
    ctx.join_team(user(BOB, "Bob"), TEAM).await;
    (ctx, Hub::spawn())
}

#[tokio::test]
async fn new_message_fans_out_personalized_copies() {
    let (ctx, hub) = setup().await;
    ctx.store.set_next_message_id(101);
    let mut alice = TestClient::connect(&hub, ALICE, TEAM).await;
    let mut bob = TestClient::connect(&hub, BOB, TEAM).await;

    let frame = r#"{"type":"new-message","payload":{"text":"hi","client_message_id":"c1"}}"#;
    events::handle_frame(&ctx, &hub, alice.conn, frame).await;

    let ServerEnvelope::MessageReceived(to_alice) = alice.recv().await else {
        panic!("expected message-received for the author");
    };
    let ServerEnvelope::MessageReceived(to_bob) = bob.recv().await else {
        panic!("expected message-received for the teammate");
    };

    assert_eq!(to_alice.id, "101");
    assert_eq!(to_bob.id, "101");
    assert_eq!(to_alice.text, "hi");
    assert!(to_alice.is_current_user);
    assert!(!to_bob.is_current_user);
    assert_eq!(to_alice.client_message_id.as_deref(), Some("c1"));
    assert_eq!(to_alice.sender.display_name, "Alice");
}

#[tokio::test]
async fn edit_by_non_author_errors_to_the_caller_only() {
    let (ctx, hub) = setup().await;
    ctx.store.set_next_message_id(101);
    let mut alice = TestClient::connect(&hub, ALICE, TEAM).await;
    let mut bob = TestClient::connect(&hub, BOB, TEAM).await;

    events::handle_frame(
        &ctx,
        &hub,
        alice.conn,
        r#"{"type":"new-message","payload":{"text":"hi"}}"#,
    )
    .await;
    alice.recv().await;
    bob.recv().await;

    let frame = r#"{"type":"edit-message","payload":{"message_id":"101","new_text":"mine now"}}"#;
    events::handle_frame(&ctx, &hub, bob.conn, frame).await;

    let ServerEnvelope::Error(error) = bob.recv().await else {
        panic!("expected an error envelope for the caller");
    };
    assert_eq!(error.original_type, "edit-message");
    assert_eq!(error.message, "access to task denied");
    assert!(alice.try_recv().is_none());

    // The store kept the original content.
    let stored = ctx
        .store
        .get_message_by_id(101)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.content, "hi");
}

#[tokio::test]
async fn delete_broadcasts_and_later_history_excludes_the_message() {
    let (ctx, hub) = setup().await;
    ctx.store.set_next_message_id(101);
    let mut alice = TestClient::connect(&hub, ALICE, TEAM).await;
    let mut bob = TestClient::connect(&hub, BOB, TEAM).await;

    events::handle_frame(
        &ctx,
        &hub,
        alice.conn,
        r#"{"type":"new-message","payload":{"text":"hi"}}"#,
    )
    .await;
    alice.recv().await;
    bob.recv().await;

    events::handle_frame(
        &ctx,
        &hub,
        alice.conn,
        r#"{"type":"delete-message","payload":{"message_id":"101"}}"#,
    )
    .await;

    let ServerEnvelope::MessageDeleted(to_alice) = alice.recv().await else {
        panic!("expected message-deleted broadcast");
    };
    let ServerEnvelope::MessageDeleted(to_bob) = bob.recv().await else {
        panic!("expected message-deleted broadcast");
    };
    assert_eq!(to_alice.id, "101");
    assert_eq!(to_bob.id, "101");

    events::handle_frame(
        &ctx,
        &hub,
        bob.conn,
        r#"{"type":"load-history-request","payload":{}}"#,
    )
    .await;
    let ServerEnvelope::HistoryLoaded(page) = bob.recv().await else {
        panic!("expected history-loaded");
    };
    assert!(page.messages.is_empty());
    assert!(!page.has_more);
}

#[tokio::test]
async fn history_pages_go_only_to_the_requester() {
    let (ctx, hub) = setup().await;
    let mut alice = TestClient::connect(&hub, ALICE, TEAM).await;
    let mut bob = TestClient::connect(&hub, BOB, TEAM).await;

    for text in ["m1", "m2", "m3"] {
        let frame =
            format!(r#"{{"type":"new-message","payload":{{"text":"{text}"}}}}"#);
        events::handle_frame(&ctx, &hub, alice.conn, &frame).await;
        alice.recv().await;
        bob.recv().await;
    }

    events::handle_frame(
        &ctx,
        &hub,
        bob.conn,
        r#"{"type":"load-history-request","payload":{"limit":2}}"#,
    )
    .await;
    let ServerEnvelope::HistoryLoaded(first) = bob.recv().await else {
        panic!("expected history-loaded");
    };
    assert_eq!(first.messages.len(), 2);
    assert!(first.has_more);
    assert_eq!(first.team_id, "7");
    assert!(alice.try_recv().is_none());

    let cursor = &first.messages[0].id;
    let frame = format!(
        r#"{{"type":"load-history-request","payload":{{"before_message_id":"{cursor}","limit":2}}}}"#
    );
    events::handle_frame(&ctx, &hub, bob.conn, &frame).await;
    let ServerEnvelope::HistoryLoaded(second) = bob.recv().await else {
        panic!("expected history-loaded");
    };
    assert_eq!(second.messages.len(), 1);
    assert!(!second.has_more);
    assert_eq!(second.messages[0].text, "m1");
}

#[tokio::test]
async fn mark_as_read_notifies_every_session_of_the_author() {
    let (ctx, hub) = setup().await;
    ctx.store.set_next_message_id(101);
    let mut alice_desktop = TestClient::connect(&hub, ALICE, TEAM).await;
    let mut alice_mobile = TestClient::connect(&hub, ALICE, TEAM).await;
    let mut bob = TestClient::connect(&hub, BOB, TEAM).await;

    events::handle_frame(
        &ctx,
        &hub,
        alice_desktop.conn,
        r#"{"type":"new-message","payload":{"text":"hi"}}"#,
    )
    .await;
    alice_desktop.recv().await;
    alice_mobile.recv().await;
    bob.recv().await;

    events::handle_frame(
        &ctx,
        &hub,
        bob.conn,
        r#"{"type":"mark-as-read","payload":{"message_ids":["101"]}}"#,
    )
    .await;

    for client in [&mut alice_desktop, &mut alice_mobile] {
        let ServerEnvelope::StatusUpdate(update) = client.recv().await else {
            panic!("expected status-update for the author");
        };
        assert_eq!(update.message_id, "101");
        assert_eq!(update.team_id, "7");
        assert_eq!(update.target_user, BOB.to_string());
    }
    // The reader gets no echo of its own acknowledgement.
    assert!(bob.try_recv().is_none());
}

#[tokio::test]
async fn decode_failure_answers_the_sender_and_keeps_the_connection_alive() {
    let (ctx, hub) = setup().await;
    let mut alice = TestClient::connect(&hub, ALICE, TEAM).await;
    let mut bob = TestClient::connect(&hub, BOB, TEAM).await;

    events::handle_frame(&ctx, &hub, alice.conn, "{ not json").await;
    let ServerEnvelope::Error(error) = alice.recv().await else {
        panic!("expected an error envelope");
    };
    assert_eq!(error.original_type, "unknown");
    assert!(bob.try_recv().is_none());

    // The same connection still processes well-formed frames.
    events::handle_frame(
        &ctx,
        &hub,
        alice.conn,
        r#"{"type":"new-message","payload":{"text":"still here"}}"#,
    )
    .await;
    let ServerEnvelope::MessageReceived(message) = alice.recv().await else {
        panic!("expected message-received");
    };
    assert_eq!(message.text, "still here");
}

#[tokio::test]
async fn unknown_envelope_type_is_reported_with_the_original_tag() {
    let (ctx, hub) = setup().await;
    let mut alice = TestClient::connect(&hub, ALICE, TEAM).await;

    events::handle_frame(
        &ctx,
        &hub,
        alice.conn,
        r#"{"type":"subscribe","payload":{}}"#,
    )
    .await;
    let ServerEnvelope::Error(error) = alice.recv().await else {
        panic!("expected an error envelope");
    };
    assert_eq!(error.original_type, "subscribe");
    assert_eq!(error.message, "unknown message type");
}

#[tokio::test]
async fn validation_error_echoes_the_correlation_id() {
    let (ctx, hub) = setup().await;
    let mut alice = TestClient::connect(&hub, ALICE, TEAM).await;

    let frame = r#"{"type":"new-message","payload":{"text":"","client_message_id":"c9"}}"#;
    events::handle_frame(&ctx, &hub, alice.conn, frame).await;

    let ServerEnvelope::Error(error) = alice.recv().await else {
        panic!("expected an error envelope");
    };
    assert_eq!(error.original_type, "new-message");
    assert_eq!(error.client_message_id.as_deref(), Some("c9"));
}
