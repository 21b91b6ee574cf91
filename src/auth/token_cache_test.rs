use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use super::*;
use crate::storage::{KeyValueStore, MemoryStore};

const SESSION_PATH: &str = "/api/auth/session";

fn setup_cache(server_url: &str) -> (Arc<MemoryStore>, TokenCache) {
    let store = Arc::new(MemoryStore::new());
    let cache = TokenCache::new(store.clone())
        .expect("failed to build token cache")
        .with_session_endpoint(format!("{}{}", server_url, SESSION_PATH));
    (store, cache)
}

fn jwt_expiring_at(exp: i64) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp))
    )
}

#[tokio::test]
async fn test_session_unauthorized_yields_no_token() {
    let mut server = mockito::Server::new_async().await;
    let session = server
        .mock("GET", SESSION_PATH)
        .with_status(401)
        .with_body(r#"{"detail":"not logged in"}"#)
        .expect(2)
        .create_async()
        .await;

    let (store, cache) = setup_cache(&server.url());

    assert!(cache.get_token().await.is_none());
    assert!(!cache.is_authenticated().await);
    assert!(store.is_empty().await);
    session.assert_async().await;
}

#[tokio::test]
async fn test_session_token_is_cached() {
    let mut server = mockito::Server::new_async().await;
    let session = server
        .mock("GET", SESSION_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"session-token"}"#)
        .expect(1)
        .create_async()
        .await;

    let (store, cache) = setup_cache(&server.url());

    assert_eq!(cache.get_token().await.as_deref(), Some("session-token"));
    assert_eq!(cache.get_token().await.as_deref(), Some("session-token"));
    assert_eq!(
        store.get(AUTH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("session-token")
    );
    session.assert_async().await;
}

#[tokio::test]
async fn test_nested_session_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", SESSION_PATH)
        .with_status(200)
        .with_body(r#"{"session":{"token":"nested"},"user":{"id":"u1"}}"#)
        .create_async()
        .await;

    let (_, cache) = setup_cache(&server.url());
    assert_eq!(cache.get_token().await.as_deref(), Some("nested"));
}

#[tokio::test]
async fn test_session_without_token_field() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", SESSION_PATH)
        .with_status(200)
        .with_body(r#"{"user":{"id":"u1"}}"#)
        .create_async()
        .await;

    let (_, cache) = setup_cache(&server.url());
    assert!(cache.get_token().await.is_none());
}

#[tokio::test]
async fn test_session_with_non_json_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", SESSION_PATH)
        .with_status(200)
        .with_body("<html>login</html>")
        .create_async()
        .await;

    let (_, cache) = setup_cache(&server.url());
    assert!(cache.get_token().await.is_none());
}

#[tokio::test]
async fn test_unreachable_session_endpoint() {
    let store = Arc::new(MemoryStore::new());
    let cache = TokenCache::new(store)
        .unwrap()
        .with_session_endpoint("http://127.0.0.1:1/api/auth/session")
        .with_timeout(std::time::Duration::from_secs(2));

    assert!(cache.get_token().await.is_none());
}

#[tokio::test]
async fn test_stored_token_skips_network() {
    let mut server = mockito::Server::new_async().await;
    let session = server
        .mock("GET", SESSION_PATH)
        .expect(0)
        .create_async()
        .await;

    let (store, cache) = setup_cache(&server.url());
    store.set(AUTH_TOKEN_KEY, "stored-token").await.unwrap();

    assert_eq!(cache.get_token().await.as_deref(), Some("stored-token"));
    session.assert_async().await;
}

#[tokio::test]
async fn test_custom_token_key() {
    let mut server = mockito::Server::new_async().await;
    let (store, cache) = setup_cache(&server.url());
    let cache = cache.with_token_key("better-auth-token");
    store.set("better-auth-token", "legacy").await.unwrap();

    let session = server
        .mock("GET", SESSION_PATH)
        .expect(0)
        .create_async()
        .await;

    assert_eq!(cache.token_key(), "better-auth-token");
    assert_eq!(cache.get_token().await.as_deref(), Some("legacy"));
    session.assert_async().await;
}

#[tokio::test]
async fn test_expired_stored_token_is_discarded() {
    let mut server = mockito::Server::new_async().await;
    let session = server
        .mock("GET", SESSION_PATH)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let (store, cache) = setup_cache(&server.url());
    let expired = jwt_expiring_at(Utc::now().timestamp() - 10);
    store.set(AUTH_TOKEN_KEY, &expired).await.unwrap();

    assert!(cache.get_token().await.is_none());
    assert!(store.get(AUTH_TOKEN_KEY).await.unwrap().is_none());
    session.assert_async().await;
}

#[tokio::test]
async fn test_valid_jwt_is_kept() {
    let server = mockito::Server::new_async().await;
    let (_, cache) = setup_cache(&server.url());
    let valid = jwt_expiring_at(Utc::now().timestamp() + 3600);

    cache.set_token(&valid).await.unwrap();
    assert_eq!(cache.get_token().await, Some(valid));
}

#[tokio::test]
async fn test_clear_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", SESSION_PATH)
        .with_status(401)
        .create_async()
        .await;

    let (store, cache) = setup_cache(&server.url());
    cache.set_token("t1").await.unwrap();
    assert!(cache.is_authenticated().await);

    cache.clear_token().await;
    assert!(store.get(AUTH_TOKEN_KEY).await.unwrap().is_none());
    assert!(!cache.is_authenticated().await);
}

#[tokio::test]
async fn test_authenticated_request_requires_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", SESSION_PATH)
        .with_status(401)
        .create_async()
        .await;
    let tasks = server
        .mock("GET", "/api/tasks")
        .expect(0)
        .create_async()
        .await;

    let (_, cache) = setup_cache(&server.url());
    let url = format!("{}/api/tasks", server.url());
    let err = cache
        .make_authenticated_request(cache.request(Method::GET, &url))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::AuthenticationRequired));
    tasks.assert_async().await;
}

#[tokio::test]
async fn test_authenticated_request_attaches_headers() {
    let mut server = mockito::Server::new_async().await;
    let tasks = server
        .mock("POST", "/api/tasks")
        .match_header("authorization", "Bearer t1")
        .match_header("content-type", "application/json")
        .with_status(201)
        .with_body(r#"{"id":1}"#)
        .expect(1)
        .create_async()
        .await;

    let (_, cache) = setup_cache(&server.url());
    cache.set_token("t1").await.unwrap();

    let url = format!("{}/api/tasks", server.url());
    let res = cache
        .make_authenticated_request(cache.request(Method::POST, &url).body(r#"{"title":"x"}"#))
        .await
        .expect("request should be sent");

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(cache.get_token().await.as_deref(), Some("t1"));
    tasks.assert_async().await;
}

#[tokio::test]
async fn test_authenticated_request_unauthorized_clears_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/tasks")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("GET", SESSION_PATH)
        .with_status(401)
        .create_async()
        .await;

    let (store, cache) = setup_cache(&server.url());
    cache.set_token("stale").await.unwrap();

    let url = format!("{}/api/tasks", server.url());
    let res = cache
        .make_authenticated_request(cache.request(Method::GET, &url))
        .await
        .expect("response is returned to the caller");

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(store.get(AUTH_TOKEN_KEY).await.unwrap().is_none());
    assert!(cache.get_token().await.is_none());
}

#[tokio::test]
async fn test_from_config() {
    let store = Arc::new(MemoryStore::new());
    let cfg = AuthConfig {
        session_endpoint: "https://example.com/session".to_string(),
        token_key: "custom".to_string(),
        timeout_secs: Some(5),
    };
    let cache = TokenCache::new(store).unwrap().from_config(&cfg);

    assert_eq!(cache.session_endpoint(), "https://example.com/session");
    assert_eq!(cache.token_key(), "custom");
}
