//! End-to-end tests for Mindkeep.
//!
//! These drive the HTTP router against a real SQLite store and a scripted
//! language model, covering the normal flow and each degradation path a
//! caller can observe.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use mindkeep_assistant::test_helpers::{Script, ScriptedModel};
use mindkeep_assistant::{
    DegradationController, DegradationLevel, LOCAL_FALLBACK_CONFIDENCE, respond_locally,
};
use mindkeep_core::error::LmError;
use mindkeep_core::message::OwnerId;
use mindkeep_gateway::api_v1::{ChatResponse, MessageListResponse};
use mindkeep_gateway::{ApiV1State, HealthResponse, SharedApiState, build_router};
use mindkeep_store::SqliteStore;

// ── Fixtures ─────────────────────────────────────────────────────────────

async fn migrated_store() -> Arc<SqliteStore> {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    store.add_owner(&OwnerId::from("alice")).await.unwrap();
    Arc::new(store)
}

async fn unmigrated_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap())
}

fn state(lm: Arc<ScriptedModel>, store: Arc<SqliteStore>) -> SharedApiState {
    let controller = DegradationController::new(lm, store.clone(), store.clone())
        .with_timeout(Duration::from_millis(200));
    Arc::new(ApiV1State {
        controller: Arc::new(controller),
        conversations: store,
        default_owner: Some("alice".into()),
        start_time: std::time::Instant::now(),
    })
}

async fn post_chat(state: &SharedApiState, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_json<T: serde::de::DeserializeOwned>(state: &SharedApiState, uri: &str) -> (StatusCode, T) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn chat(value: serde_json::Value) -> ChatResponse {
    serde_json::from_value(value).unwrap()
}

// ── Normal flow ──────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_conversation_round_trip() {
    let lm = Arc::new(ScriptedModel::new(vec![
        Script::Reply("Start with the riskiest assumption.".into()),
        Script::Reply("Then build a prototype around it.".into()),
    ]));
    let state = state(lm.clone(), migrated_store().await);

    let (status, body) = post_chat(
        &state,
        serde_json::json!({ "message": "How should I plan my project launch?" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let first = chat(body);
    assert!(first.success);
    assert_eq!(first.message.role, "assistant");
    assert_eq!(first.message.content, "Start with the riskiest assumption.");
    assert_eq!(first.message.metadata.level, DegradationLevel::Full);
    assert!(first.message.metadata.persisted);
    let conversation_id = first.conversation_id.clone().unwrap();

    let (status, body) = post_chat(
        &state,
        serde_json::json!({
            "ownerId": "alice",
            "conversationId": conversation_id,
            "message": "And after that?"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = chat(body);
    assert_eq!(second.conversation_id.as_deref(), Some(conversation_id.as_str()));
    assert_eq!(second.message.metadata.level, DegradationLevel::Full);

    // The second prompt replays the first exchange.
    let prompt = lm.last_prompt().unwrap();
    assert!(prompt.iter().any(|t| t.content == "Start with the riskiest assumption."));
    assert_eq!(prompt.last().unwrap().content, "And after that?");

    let (status, list): (_, MessageListResponse) = get_json(
        &state,
        &format!("/v1/conversations/{conversation_id}/messages"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.count, 4);
    let roles: Vec<&str> = list.messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, ["user", "assistant", "user", "assistant"]);
    assert_eq!(list.messages[3].content, "Then build a prototype around it.");
}

#[tokio::test]
async fn e2e_health_reports_store_and_model() {
    let state = state(
        Arc::new(ScriptedModel::replying("hi")),
        migrated_store().await,
    );

    let (status, health): (_, HealthResponse) = get_json(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "ok");
    assert_eq!(health.store.name, "sqlite");
    assert!(health.store.healthy);
}

// ── Degradation paths ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_model_timeout_answers_from_templates() {
    let message = "What's the next milestone for this project?";
    let state = state(
        Arc::new(ScriptedModel::new(vec![Script::Hang])),
        migrated_store().await,
    );

    let (status, body) = post_chat(&state, serde_json::json!({ "message": message })).await;
    assert_eq!(status, StatusCode::OK);
    let reply = chat(body);
    assert!(reply.success);
    assert_eq!(reply.message.metadata.level, DegradationLevel::LmFailureLocal);
    assert_eq!(reply.message.metadata.confidence, LOCAL_FALLBACK_CONFIDENCE);
    assert!(!reply.message.metadata.persisted);
    assert_eq!(reply.message.content, respond_locally(message).text);

    // The user message stays on record; the template reply does not.
    let id = reply.conversation_id.unwrap();
    let (_, list): (_, MessageListResponse) =
        get_json(&state, &format!("/v1/conversations/{id}/messages")).await;
    assert_eq!(list.count, 1);
    assert_eq!(list.messages[0].role, "user");
}

#[tokio::test]
async fn e2e_unmigrated_store_still_answers() {
    let lm = Arc::new(ScriptedModel::replying("Here is an answer anyway."));
    let state = state(lm.clone(), unmigrated_store().await);

    let (status, body) = post_chat(&state, serde_json::json!({ "message": "hello" })).await;
    assert_eq!(status, StatusCode::OK);
    let reply = chat(body);
    assert!(reply.success);
    assert_eq!(reply.message.metadata.level, DegradationLevel::SchemaUnavailable);
    assert!(!reply.message.metadata.persisted);
    assert!(reply.conversation_id.is_none());
    assert_eq!(reply.message.content, "Here is an answer anyway.");
    assert_eq!(lm.calls(), 1);

    let (_, health): (_, HealthResponse) = get_json(&state, "/health").await;
    assert_eq!(health.status, "degraded");
    assert!(!health.store.healthy);
}

#[tokio::test]
async fn e2e_unknown_owner_is_unprovisioned() {
    let state = state(
        Arc::new(ScriptedModel::replying("Hello stranger.")),
        migrated_store().await,
    );

    let (status, body) = post_chat(
        &state,
        serde_json::json!({ "ownerId": "mallory", "message": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reply = chat(body);
    assert_eq!(reply.message.metadata.level, DegradationLevel::OwnerUnprovisioned);
    assert!(!reply.message.metadata.persisted);
    assert_eq!(reply.message.content, "Hello stranger.");
}

#[tokio::test]
async fn e2e_store_and_model_both_down() {
    let message = "I need to make a decision about hiring";
    let lm = Arc::new(ScriptedModel::new(vec![Script::Fail(LmError::ServiceError {
        status_code: 503,
        message: "overloaded".into(),
    })]));
    let state = state(lm, unmigrated_store().await);

    let (status, body) = post_chat(&state, serde_json::json!({ "message": message })).await;
    assert_eq!(status, StatusCode::OK);
    let reply = chat(body);
    assert!(reply.success);
    assert_eq!(reply.message.metadata.level, DegradationLevel::LmFailureLocal);
    assert!(!reply.message.metadata.persisted);
    assert!(!reply.message.content.is_empty());
    assert_eq!(reply.message.content, respond_locally(message).text);
}

#[tokio::test]
async fn e2e_unknown_conversation_is_a_persist_failure() {
    let state = state(
        Arc::new(ScriptedModel::replying("unused")),
        migrated_store().await,
    );

    let (status, body) = post_chat(
        &state,
        serde_json::json!({ "conversationId": "does-not-exist", "message": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["retryable"], true);
    assert_eq!(body["conversationId"], "does-not-exist");
    assert!(body.get("message").is_none());
}

#[tokio::test]
async fn e2e_confidence_stays_in_range_across_paths() {
    let scripts = vec![
        Script::Reply("short".into()),
        Script::Fail(LmError::EmptyCompletion),
        Script::Reply("Here is a longer answer. For example, consider these steps:\n1. Plan\n2. Build".into()),
    ];
    let state = state(Arc::new(ScriptedModel::new(scripts)), migrated_store().await);

    for message in ["one", "two", "three"] {
        let (_, body) = post_chat(&state, serde_json::json!({ "message": message })).await;
        let confidence = chat(body).message.metadata.confidence;
        assert!((0.0..=1.0).contains(&confidence), "confidence {confidence}");
    }
}
