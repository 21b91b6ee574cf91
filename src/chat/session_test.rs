use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;

use super::*;
use crate::auth::TokenCache;
use crate::conversation::ConversationStateManager;
use crate::models::ConversationState;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::transport::{ChatApi, ChatApiError};

struct Fixture {
    store: Arc<MemoryStore>,
    conversations: ArcConversations,
    transport: ArcTransport,
}

async fn setup(server_url: &str) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    store.set("auth_token", "t1").await.unwrap();

    let auth = TokenCache::new(store.clone())
        .unwrap()
        .with_session_endpoint(format!("{}/api/auth/session", server_url));
    let transport: ArcTransport =
        Arc::new(ChatApi::new(Arc::new(auth)).with_endpoint(server_url));
    let conversations = Arc::new(ConversationStateManager::new(store.clone()));

    Fixture {
        store,
        conversations,
        transport,
    }
}

fn session(fixture: &Fixture) -> ChatSession {
    ChatSession::new("u1", fixture.transport.clone(), fixture.conversations.clone())
}

fn reply_body(conversation_id: &str, response: &str) -> String {
    json!({
        "conversation_id": conversation_id,
        "response": response,
        "tool_calls": [],
    })
    .to_string()
}

#[tokio::test]
async fn test_send_first_message() {
    let mut server = mockito::Server::new_async().await;
    let chat = server
        .mock("POST", "/api/u1/chat")
        .match_body(Matcher::PartialJson(json!({
            "message": "hi",
            "conversation_id": null,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(reply_body("c1", "hello"))
        .expect(1)
        .create_async()
        .await;

    let fixture = setup(&server.url()).await;
    let mut session = session(&fixture);

    let outcome = session.send("  hi  ").await.unwrap();

    assert_eq!(outcome.conversation_id, "c1");
    assert_eq!(outcome.reply.content(), "hello");
    assert!(!outcome.tasks_changed);
    assert_eq!(session.conversation_id(), Some("c1"));

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content(), "hi");
    assert_eq!(messages[0].status(), MessageStatus::Sent);
    assert_eq!(messages[0].conversation_id(), "c1");
    assert_eq!(messages[1].sender(), Sender::Assistant);

    let conversations = &fixture.conversations;
    assert_eq!(
        conversations.get_active_conversation_id().await.unwrap().as_deref(),
        Some("c1")
    );
    assert_eq!(conversations.get_recent_conversations().await.unwrap(), vec!["c1"]);

    let stored = conversations.get_conversation_messages("c1").await.unwrap();
    assert_eq!(
        stored.iter().map(|m| m.content()).collect::<Vec<_>>(),
        vec!["hi", "hello"]
    );
    chat.assert_async().await;
}

#[tokio::test]
async fn test_send_continues_conversation() {
    let mut server = mockito::Server::new_async().await;
    let chat = server
        .mock("POST", "/api/u1/chat")
        .match_body(Matcher::PartialJson(json!({"conversation_id": "c1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(reply_body("c1", "Task **Buy milk** added to your list"))
        .expect(1)
        .create_async()
        .await;

    let fixture = setup(&server.url()).await;
    let conversations = &fixture.conversations;
    conversations.set_active_conversation_id("c1").await.unwrap();
    conversations
        .save_conversation_state("c1", &ConversationState::new("c1"))
        .await
        .unwrap();
    conversations
        .add_message_to_conversation("c1", ChatMessage::new_assistant("c1", "earlier"))
        .await
        .unwrap();

    let mut session = session(&fixture).resume().await.unwrap();
    assert_eq!(session.conversation_id(), Some("c1"));
    assert_eq!(session.messages().len(), 1);

    let outcome = session.send("add buy milk").await.unwrap();
    assert!(outcome.tasks_changed);
    assert_eq!(session.messages().len(), 3);
    assert_eq!(
        conversations.get_conversation_messages("c1").await.unwrap().len(),
        3
    );
    chat.assert_async().await;
}

#[tokio::test]
async fn test_send_in_local_conversation_adopts_server_id() {
    let mut server = mockito::Server::new_async().await;
    let chat = server
        .mock("POST", "/api/u1/chat")
        .match_body(Matcher::PartialJson(json!({"conversation_id": null})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response":"hello","conversation_id":7,"tool_calls":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let fixture = setup(&server.url()).await;
    let conversations = &fixture.conversations;
    let local = conversations.create_new_conversation().await.unwrap();
    let local_id = local.conversation_id().to_string();
    conversations
        .set_active_conversation_id(&local_id)
        .await
        .unwrap();

    let mut session = session(&fixture).resume().await.unwrap();
    assert_eq!(session.conversation_id(), Some(local_id.as_str()));

    let outcome = session.send("hi").await.unwrap();
    assert_eq!(outcome.conversation_id, "7");
    assert_eq!(session.conversation_id(), Some("7"));
    assert!(session.messages().iter().all(|m| m.conversation_id() == "7"));

    assert!(
        conversations
            .load_conversation_state(&local_id)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(conversations.get_recent_conversations().await.unwrap(), vec!["7"]);
    assert_eq!(
        conversations.get_active_conversation_id().await.unwrap().as_deref(),
        Some("7")
    );
    assert_eq!(conversations.get_conversation_messages("7").await.unwrap().len(), 2);
    chat.assert_async().await;
}

#[tokio::test]
async fn test_send_rejects_empty_input() {
    let mut server = mockito::Server::new_async().await;
    let chat = server
        .mock("POST", "/api/u1/chat")
        .expect(0)
        .create_async()
        .await;

    let fixture = setup(&server.url()).await;
    let mut session = session(&fixture);

    assert!(session.send("   ").await.is_err());
    assert!(session.messages().is_empty());
    chat.assert_async().await;
}

#[tokio::test]
async fn test_send_failure_marks_message() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/u1/chat")
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail":"Internal server error: boom"}"#)
        .create_async()
        .await;

    let fixture = setup(&server.url()).await;
    let mut session = session(&fixture);

    let err = session.send("hi").await.unwrap_err();
    let api_err = err
        .downcast_ref::<ChatApiError>()
        .expect("transport error is kept");
    assert_eq!(
        api_err.user_message(),
        "Internal server error. Please contact support."
    );

    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].status(), MessageStatus::Error);
    assert!(session.conversation_id().is_none());

    // Nothing reaches the store except the auth token
    assert_eq!(fixture.store.len().await, 1);
}

#[tokio::test]
async fn test_start_new_conversation() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/u1/chat")
        .match_body(Matcher::PartialJson(json!({"conversation_id": "c1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(reply_body("c1", "hello"))
        .create_async()
        .await;
    let fresh = server
        .mock("POST", "/api/u1/chat")
        .match_body(Matcher::PartialJson(json!({"conversation_id": null})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(reply_body("c2", "new one"))
        .expect(1)
        .create_async()
        .await;

    let fixture = setup(&server.url()).await;
    fixture
        .conversations
        .set_active_conversation_id("c1")
        .await
        .unwrap();

    let mut session = session(&fixture).resume().await.unwrap();
    session.start_new_conversation();
    assert!(session.conversation_id().is_none());
    assert!(session.messages().is_empty());

    session.send("start over").await.unwrap();
    assert_eq!(session.conversation_id(), Some("c2"));
    assert_eq!(
        fixture.conversations.get_recent_conversations().await.unwrap(),
        vec!["c2"]
    );
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_sync_history() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/u1/chat/c1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "conversation_id": "c1",
                "messages": [
                    {"message_id": "m1", "content": "hi", "sender": "user"},
                    {"message_id": "m2", "content": "hello", "sender": "assistant"}
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let fixture = setup(&server.url()).await;
    fixture
        .conversations
        .set_active_conversation_id("c1")
        .await
        .unwrap();

    let mut session = session(&fixture).resume().await.unwrap();
    assert_eq!(session.sync_history().await.unwrap(), 2);
    assert_eq!(session.messages()[1].id(), "m2");

    let stored = fixture
        .conversations
        .get_conversation_messages("c1")
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn test_sync_history_without_conversation() {
    let server = mockito::Server::new_async().await;
    let fixture = setup(&server.url()).await;
    let mut session = session(&fixture);

    assert!(session.sync_history().await.is_err());
}

#[test]
fn test_mentions_task_change() {
    assert!(mentions_task_change("Task **Buy milk** added"));
    assert!(mentions_task_change("I have Created a reminder"));
    assert!(!mentions_task_change("Here are your tasks"));
}
