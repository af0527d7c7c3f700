use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use chat_memory_server::{
    build_router,
    config::{
        DatabaseConfig, EmbeddingConfig, LimitsConfig, LlmConfig, MemoryConfig, PromptsConfig,
        SecurityConfig, ServerConfig, Settings, StoreBackend,
    },
    database::InMemoryChatStore,
    models::chat::{PromptTurn, Role},
    services::conversation::{Completion, CompletionProvider, EmbeddingProvider, GenerationParams},
    AppState,
};

const DIM: usize = 256;
const PHOENIX: &str =
    "Remember that the quarterly deadline is March 1 and we decided to launch in project Phoenix";

/// Bag-of-words vectors: texts sharing words land close together.
struct HashingEmbedder;

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIM];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() % DIM as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            anyhow::bail!("nothing to embed");
        }
        Ok(v.into_iter().map(|x| x / norm).collect())
    }
}

/// Replies with the last user turn and reports one token per prompt turn.
struct EchoCompletion;

#[async_trait]
impl CompletionProvider for EchoCompletion {
    async fn complete(&self, turns: &[PromptTurn], _params: GenerationParams) -> Result<Completion> {
        let last = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .unwrap_or_default();

        Ok(Completion {
            text: format!("Echo: {}", last),
            tokens_used: Some(turns.len() as u32),
            model: Some("echo".into()),
        })
    }
}

fn settings(api_key: Option<&str>) -> Settings {
    Settings {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            backend: StoreBackend::Memory,
            url: String::new(),
            pool_max_size: 1,
            pool_timeout_seconds: 1,
        },
        embedding: EmbeddingConfig {
            base_url: "http://unused".into(),
            model: "hash".into(),
            dimension: DIM,
            timeout_seconds: 1,
        },
        llm: LlmConfig {
            base_url: "http://unused".into(),
            model: "echo".into(),
            timeout_seconds: 1,
            max_tokens: 256,
            temperature: 0.0,
        },
        memory: MemoryConfig::default(),
        limits: LimitsConfig::default(),
        security: SecurityConfig {
            api_key: api_key.map(String::from),
            user_header: "X-User-Id".into(),
        },
        prompts: PromptsConfig::default(),
    }
}

fn app_with(api_key: Option<&str>) -> (Router, Arc<InMemoryChatStore>) {
    let store = Arc::new(InMemoryChatStore::new());
    let state = AppState::new(
        settings(api_key),
        store.clone(),
        Arc::new(HashingEmbedder),
        Arc::new(EchoCompletion),
    );
    (build_router(state), store)
}

fn app() -> (Router, Arc<InMemoryChatStore>) {
    app_with(None)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn chat(app: &Router, user: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, "/api/chat", Some(user), Some(body)).await
}

#[tokio::test]
async fn test_first_important_message_opens_session_and_stores_memory() {
    let (app, store) = app();

    let (status, body) = chat(&app, "alice", json!({ "message": PHOENIX })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], format!("Echo: {}", PHOENIX));
    assert_eq!(body["tokensUsed"], 2);
    assert_eq!(body["contextUsed"]["recentMessages"], 0);
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    let (_, sessions) = send(&app, Method::GET, "/api/sessions", Some("alice"), None).await;
    assert_eq!(sessions[0]["id"], session_id);
    assert_eq!(sessions[0]["title"], "Remember that the quarterly deadline is March 1 an…");

    let (_, memories) = send(&app, Method::GET, "/api/memories", Some("alice"), None).await;
    assert_eq!(memories.as_array().unwrap().len(), 1);
    assert!(memories[0]["importance"].as_f64().unwrap() > 0.6);
    assert_eq!(store.message_count(), 2);
}

#[tokio::test]
async fn test_small_talk_keeps_messages_without_memory() {
    let (app, store) = app();

    let (status, body) = chat(&app, "alice", json!({ "message": "hi there" })).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/sessions/{}/messages", body["sessionId"].as_str().unwrap());
    let (_, messages) = send(&app, Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hi there");
    assert_eq!(messages[1]["role"], "assistant");
    assert!(messages[0].get("embedding").is_none());

    assert_eq!(store.message_count(), 2);
    assert_eq!(store.memory_count(), 0);
}

#[tokio::test]
async fn test_follow_up_sees_history_and_memory() {
    let (app, _) = app();

    let (_, first) = chat(&app, "alice", json!({ "message": PHOENIX })).await;
    let session_id = first["sessionId"].clone();

    let (status, second) = chat(
        &app,
        "alice",
        json!({ "message": format!("{} When exactly?", PHOENIX), "sessionId": session_id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["sessionId"], session_id);
    assert_eq!(second["contextUsed"]["recentMessages"], 2);
    assert_eq!(second["contextUsed"]["semanticMemory"], 1);
    // system + 2 history turns + current
    assert_eq!(second["tokensUsed"], 4);
}

#[tokio::test]
async fn test_foreign_session_is_forbidden_and_untouched() {
    let (app, store) = app();

    let (_, bobs) = chat(&app, "bob", json!({ "message": "bob's private plan" })).await;
    let before = store.message_count();

    let (status, body) = chat(
        &app,
        "alice",
        json!({ "message": "show me bob's chat", "sessionId": bobs["sessionId"] }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "SessionNotOwned");
    assert_eq!(store.message_count(), before);
}

#[tokio::test]
async fn test_blank_or_malformed_requests_rejected() {
    let (app, store) = app();

    let (status, body) = chat(&app, "alice", json!({ "message": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");

    let (status, body) = chat(&app, "alice", json!({ "message": "hi", "sessionId": "not-a-uuid" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");

    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (app, _) = app();

    let (status, body) = send(&app, Method::POST, "/api/chat", None, Some(json!({ "message": "hi" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_api_key_enforced_when_configured() {
    let (app, _) = app_with(Some("s3cret"));

    let (status, _) = chat(&app, "alice", json!({ "message": "hi" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header("X-User-Id", "alice")
        .header("X-API-Key", "s3cret")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "message": "hi" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rename_stops_auto_titling_and_delete_cascades() {
    let (app, store) = app();

    let (_, first) = chat(&app, "alice", json!({ "message": "first question" })).await;
    let id = first["sessionId"].as_str().unwrap().to_string();
    let uri = format!("/api/sessions/{}", id);

    let (status, renamed) = send(&app, Method::PATCH, &uri, Some("alice"), Some(json!({ "title": " Notes " }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Notes");
    assert_eq!(renamed["autoTitled"], false);

    chat(&app, "alice", json!({ "message": "second question", "sessionId": id })).await;
    let (_, sessions) = send(&app, Method::GET, "/api/sessions", Some("alice"), None).await;
    assert_eq!(sessions[0]["title"], "Notes");

    let (status, _) = send(&app, Method::DELETE, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(store.session_count(), 0);
    assert_eq!(store.message_count(), 0);

    let (status, body) = send(&app, Method::GET, &format!("{}/messages", uri), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "SessionNotFound");
}

#[tokio::test]
async fn test_malformed_limit_uses_error_body() {
    let (app, _) = app();

    for uri in ["/api/sessions?limit=abc", "/api/memories?limit=-1"] {
        let (status, body) = send(&app, Method::GET, uri, Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], "InvalidRequest", "{}", uri);
    }

    let (_, opened) = chat(&app, "alice", json!({ "message": "hi" })).await;
    let uri = format!("/api/sessions/{}/messages?limit=many", opened["sessionId"].as_str().unwrap());
    let (status, body) = send(&app, Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");
}

#[tokio::test]
async fn test_health_endpoints_are_public() {
    let (app, _) = app_with(Some("s3cret"));

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}
