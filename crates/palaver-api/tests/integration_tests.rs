//! Integration tests for the Palaver API.
//!
//! Each test builds its own router over an in-memory database. Conversation
//! tests run the real streaming client against a stub generation service
//! bound to an ephemeral local port.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use palaver_api::create_router;
use palaver_api::handlers::{ChatResponse, HealthResponse, TokenResponse};
use palaver_api::state::AppState;
use palaver_auth::TokenIssuer;
use palaver_core::config::PalaverConfig;
use palaver_core::types::Item;
use palaver_storage::Database;

// =============================================================================
// Helpers
// =============================================================================

const TEST_SECRET: &str = "integration-secret";

fn test_config(endpoint: &str) -> PalaverConfig {
    let mut config = PalaverConfig::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.generation.endpoint = endpoint.to_string();
    config
}

fn make_state(config: PalaverConfig) -> AppState {
    AppState::from_config(config, Database::in_memory().unwrap()).unwrap()
}

/// State whose generation endpoint is never contacted.
fn make_app() -> (axum::Router, AppState) {
    let state = make_state(test_config("http://127.0.0.1:9/api/generate"));
    (create_router(state.clone()), state)
}

/// Prompts received by a stub generation service.
type Prompts = Arc<Mutex<Vec<String>>>;

/// Serve `body` as the response to every `POST /api/generate`.
async fn stub_generation(status: StatusCode, body: &'static str) -> (String, Prompts) {
    let prompts: Prompts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&prompts);

    let app = Router::new().route(
        "/api/generate",
        post(move |Json(req): Json<Value>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock()
                    .unwrap()
                    .push(req["prompt"].as_str().unwrap_or_default().to_string());
                (status, body)
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api/generate", addr), prompts)
}

/// A local address with nothing listening on it.
async fn unreachable_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api/generate", addr)
}

/// A server that starts a chunked stream and hangs up mid-body.
async fn truncating_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_http_request(&mut socket).await;
        let line = "{\"response\":\"partial\",\"done\":false}\n";
        let head = "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n";
        let chunk = format!("{:x}\r\n{}\r\n", line.len(), line);
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(chunk.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        // Close without the terminating zero-length chunk.
        drop(socket);
    });
    format!("http://{}/api/generate", addr)
}

async fn read_http_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|l| {
                    let lower = l.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn authed(method: &str, uri: &str, token: &str, json: Option<&str>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));
    match json {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register_and_login(app: &axum::Router, username: &str, password: &str) -> String {
    let creds = format!(r#"{{"username":"{}","password":"{}"}}"#, username, password);
    let resp = app
        .clone()
        .oneshot(post_json("/register", &creds))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(post_json("/login", &creds))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json::<TokenResponse>(resp).await.token
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_no_auth_required() {
    let (app, _) = make_app();
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = body_json(resp).await;
    assert_eq!(health.status, "healthy");
}

// =============================================================================
// Register and login
// =============================================================================

#[tokio::test]
async fn test_register_returns_created() {
    let (app, _) = make_app();
    let resp = app
        .oneshot(post_json("/register", r#"{"username":"alice","password":"pw1"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let json: Value = body_json(resp).await;
    assert_eq!(json["message"], "User registered");
}

#[tokio::test]
async fn test_register_duplicate_conflicts() {
    let (app, _) = make_app();
    register_and_login(&app, "alice", "pw1").await;
    let resp = app
        .oneshot(post_json("/register", r#"{"username":"alice","password":"x"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let json: Value = body_json(resp).await;
    assert_eq!(json["error"], "conflict");
}

#[tokio::test]
async fn test_register_bad_input() {
    let (app, _) = make_app();
    for body in [
        r#"{"username":"alice"}"#,
        r#"{"username":"","password":"pw"}"#,
        r#"{"username":"alice","password":""}"#,
        "not json",
    ] {
        let resp = app.clone().oneshot(post_json("/register", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {}", body);
    }
}

#[tokio::test]
async fn test_login_failures() {
    let (app, _) = make_app();
    register_and_login(&app, "alice", "pw1").await;

    let resp = app
        .clone()
        .oneshot(post_json("/login", r#"{"username":"alice","password":"pw2"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(post_json("/login", r#"{"username":"ghost","password":"pw"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .oneshot(post_json("/login", r#"{"username":"alice"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_identity_cannot_login() {
    let (url, _) = stub_generation(StatusCode::OK, "{\"response\":\"hey\",\"done\":true}\n").await;
    let app = create_router(make_state(test_config(&url)));

    let resp = app
        .clone()
        .oneshot(post_json("/chat-ai", r#"{"user":"carol","text":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(post_json("/login", r#"{"username":"carol","password":""}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(post_json("/register", r#"{"username":"carol","password":"pw"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

// =============================================================================
// Access gate
// =============================================================================

#[tokio::test]
async fn test_gate_rejects_missing_header_without_running_handler() {
    let (app, state) = make_app();
    let resp = app
        .oneshot(post_json("/items", r#"{"name":"pen","price":1.5}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json: Value = body_json(resp).await;
    assert_eq!(json["error"], "unauthorized");
    assert_eq!(state.items.count().unwrap(), 0);
}

#[tokio::test]
async fn test_gate_rejects_foreign_secret() {
    let (app, state) = make_app();
    let foreign = TokenIssuer::new("some-other-secret", Duration::hours(72))
        .issue("alice")
        .unwrap();
    let resp = app
        .oneshot(authed("POST", "/items", &foreign.token, Some(r#"{"name":"pen","price":1.5}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.items.count().unwrap(), 0);
}

#[tokio::test]
async fn test_gate_rejects_expired_token() {
    let (app, state) = make_app();
    let expired = TokenIssuer::new(TEST_SECRET, Duration::hours(72))
        .issue_at("alice", Utc::now() - Duration::hours(73))
        .unwrap();
    let resp = app
        .oneshot(authed("POST", "/items", &expired.token, Some(r#"{"name":"pen","price":1.5}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.items.count().unwrap(), 0);
}

#[tokio::test]
async fn test_gate_requires_bearer_prefix() {
    let (app, state) = make_app();
    let token = register_and_login(&app, "alice", "pw1").await;
    for header in [token.clone(), format!("Token {}", token), format!("bearer {}", token)] {
        let resp = app
            .clone()
            .oneshot(
                Request::post("/items")
                    .header("authorization", header)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"pen","price":1.5}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(state.items.count().unwrap(), 0);
}

// =============================================================================
// Items
// =============================================================================

#[tokio::test]
async fn test_item_crud_lifecycle() {
    let (app, _) = make_app();
    let token = register_and_login(&app, "alice", "pw1").await;

    let resp = app
        .clone()
        .oneshot(authed("GET", "/items", &token, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_json::<Vec<Item>>(resp).await.is_empty());

    let resp = app
        .clone()
        .oneshot(authed("POST", "/items", &token, Some(r#"{"name":"pen","price":1.5}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Item = body_json(resp).await;
    assert_eq!(created.name, "pen");
    assert_eq!(created.price, 1.5);

    let uri = format!("/items/{}", created.id);
    let resp = app
        .clone()
        .oneshot(authed("GET", &uri, &token, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json::<Item>(resp).await, created);

    let resp = app
        .clone()
        .oneshot(authed("PUT", &uri, &token, Some(r#"{"name":"ink pen","price":2.25}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Item = body_json(resp).await;
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name, "ink pen");

    let resp = app
        .clone()
        .oneshot(authed("DELETE", &uri, &token, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .oneshot(authed("GET", &uri, &token, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_item_missing_and_invalid() {
    let (app, _) = make_app();
    let token = register_and_login(&app, "alice", "pw1").await;

    let resp = app
        .clone()
        .oneshot(authed("PUT", "/items/999", &token, Some(r#"{"name":"x","price":1}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(authed("DELETE", "/items/999", &token, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(authed("POST", "/items", &token, Some(r#"{"name":"x"}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(authed("POST", "/items", &token, Some(r#"{"name":"  ","price":3}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_unknown_item_is_not_found_before_body_checks() {
    let (app, _) = make_app();
    let token = register_and_login(&app, "alice", "pw1").await;

    for body in [r#"{"name":"x"}"#, r#"{"name":"  ","price":3}"#, "not json"] {
        let resp = app
            .clone()
            .oneshot(authed("PUT", "/items/999", &token, Some(body)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "body: {}", body);
    }

    let resp = app
        .clone()
        .oneshot(authed("POST", "/items", &token, Some(r#"{"name":"pen","price":1.5}"#)))
        .await
        .unwrap();
    let created: Item = body_json(resp).await;

    let resp = app
        .oneshot(authed(
            "PUT",
            &format!("/items/{}", created.id),
            &token,
            Some(r#"{"name":"x"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Keyword chat
// =============================================================================

#[tokio::test]
async fn test_keyword_chat_is_stateless() {
    let (app, state) = make_app();
    let resp = app
        .oneshot(post_json("/chat", r#"{"user":"alice","text":"bye!"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json::<ChatResponse>(resp).await.bot, "Au revoir 👋");
    assert!(state.engine.history("alice").unwrap().is_empty());
}

// =============================================================================
// Conversational chat
// =============================================================================

#[tokio::test]
async fn test_register_login_then_converse() {
    let (url, prompts) =
        stub_generation(StatusCode::OK, "{\"response\":\"hello\",\"done\":true}\n").await;
    let state = make_state(test_config(&url));
    let app = create_router(state.clone());

    let token = register_and_login(&app, "alice", "pw1").await;
    assert!(!token.is_empty());

    let resp = app
        .oneshot(post_json("/chat-ai", r#"{"user":"alice","text":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = body_json(resp).await;
    assert_eq!(json, serde_json::json!({"bot": "hello"}));

    let history = state.engine.history("alice").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sender, "alice");
    assert_eq!(history[0].message, "hi");
    assert_eq!(history[1].sender, "bot");
    assert_eq!(history[1].message, "hello");
    assert_eq!(prompts.lock().unwrap().as_slice(), ["alice: hi\nBot:"]);
}

#[tokio::test]
async fn test_fragments_concatenated_and_history_replayed() {
    let body = "{\"model\":\"mistral\",\"created_at\":\"t\",\"response\":\"Hel\",\"done\":false}\n\
                not-json\n\
                {\"model\":\"mistral\",\"created_at\":\"t\",\"response\":\"lo\",\"done\":true}\n";
    let (url, prompts) = stub_generation(StatusCode::OK, body).await;
    let state = make_state(test_config(&url));
    let app = create_router(state.clone());

    for text in ["one", "two", "three"] {
        let resp = app
            .clone()
            .oneshot(post_json(
                "/chat-ai",
                &format!(r#"{{"user":"dave","text":"{}"}}"#, text),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json::<ChatResponse>(resp).await.bot, "Hello");
    }

    let prompts = prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 3);
    assert_eq!(
        prompts[2],
        "dave: one\nbot: Hello\ndave: two\nbot: Hello\ndave: three\nBot:"
    );
    assert_eq!(state.engine.history("dave").unwrap().len(), 6);
}

#[tokio::test]
async fn test_empty_stream_records_empty_reply() {
    let (url, _) = stub_generation(StatusCode::OK, "").await;
    let state = make_state(test_config(&url));
    let app = create_router(state.clone());

    let resp = app
        .oneshot(post_json("/chat-ai", r#"{"user":"erin","text":"anyone?"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json::<ChatResponse>(resp).await.bot, "");

    let history = state.engine.history("erin").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].message, "");
}

#[tokio::test]
async fn test_unreachable_generator_is_internal_error() {
    let url = unreachable_endpoint().await;
    let state = make_state(test_config(&url));
    let app = create_router(state.clone());

    let resp = app
        .oneshot(post_json("/chat-ai", r#"{"user":"frank","text":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = body_json(resp).await;
    assert_eq!(json["error"], "internal_error");
    assert!(state.engine.history("frank").unwrap().is_empty());
}

#[tokio::test]
async fn test_upstream_error_status_is_internal_error() {
    let (url, _) = stub_generation(StatusCode::NOT_FOUND, "model 'mistral' not found").await;
    let state = make_state(test_config(&url));
    let app = create_router(state.clone());

    let resp = app
        .oneshot(post_json("/chat-ai", r#"{"user":"gina","text":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = body_json(resp).await;
    assert!(json["message"].as_str().unwrap().contains("404"));
    assert!(state.engine.history("gina").unwrap().is_empty());
}

#[tokio::test]
async fn test_truncated_stream_returns_no_partial_text() {
    let url = truncating_endpoint().await;
    let state = make_state(test_config(&url));
    let app = create_router(state.clone());

    let resp = app
        .oneshot(post_json("/chat-ai", r#"{"user":"hank","text":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = body_json(resp).await;
    assert!(json.get("bot").is_none());
    assert!(state.engine.history("hank").unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_ai_malformed_body() {
    let (app, _) = make_app();
    let resp = app
        .oneshot(post_json("/chat-ai", r#"{"text":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_ai_gate_when_enabled() {
    let (url, _) = stub_generation(StatusCode::OK, "{\"response\":\"ok\",\"done\":true}\n").await;
    let mut config = test_config(&url);
    config.chat.require_auth = true;
    let state = make_state(config);
    let app = create_router(state.clone());

    let resp = app
        .clone()
        .oneshot(post_json("/chat-ai", r#"{"user":"alice","text":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(state.engine.history("alice").unwrap().is_empty());

    let token = register_and_login(&app, "alice", "pw1").await;

    let resp = app
        .clone()
        .oneshot(authed("POST", "/chat-ai", &token, Some(r#"{"user":"bob","text":"hi"}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(state.engine.history("bob").unwrap().is_empty());

    let resp = app
        .oneshot(authed("POST", "/chat-ai", &token, Some(r#"{"user":"alice","text":"hi"}"#)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.engine.history("alice").unwrap().len(), 2);
}
