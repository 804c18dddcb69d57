//! HTTP API gateway for Mindkeep.
//!
//! Exposes the chat endpoint, a message re-read endpoint for callers whose
//! request was cancelled, and a health check.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, extract::State, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use mindkeep_assistant::DegradationController;
use mindkeep_config::AppConfig;
use mindkeep_core::language_model::LanguageModel;
use mindkeep_core::message::OwnerId;
use mindkeep_core::repository::{ConversationRepository, PreferenceRepository};
use mindkeep_store::InMemoryStore;

pub use api_v1::{ApiV1State, SharedApiState};

/// Upper bound on each health probe.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the full router.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Open the configured store as the two repository handles.
pub async fn open_store(
    config: &AppConfig,
) -> Result<(Arc<dyn ConversationRepository>, Arc<dyn PreferenceRepository>), Box<dyn std::error::Error>>
{
    match config.store.backend.as_str() {
        "memory" => {
            let store = InMemoryStore::new();
            if let Some(owner) = &config.assistant.default_owner {
                store.add_owner(&OwnerId::from(owner)).await;
            }
            let store = Arc::new(store);
            Ok((store.clone(), store))
        }
        _ => {
            let url = &config.store.database_url;
            if !url.starts_with("sqlite:") {
                if let Some(parent) = std::path::Path::new(url).parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        warn!(dir = %parent.display(), error = %e, "Cannot create store directory; chats will run detached");
                    }
                }
            }
            let store = Arc::new(mindkeep_store::SqliteStore::connect(url).await?);
            Ok((store.clone(), store))
        }
    }
}

/// Build everything a request needs, once.
///
/// An unreachable store does not fail this; requests degrade instead.
pub async fn build_state(config: &AppConfig) -> Result<SharedApiState, Box<dyn std::error::Error>> {
    build_state_with(config, mindkeep_providers::build_from_config(config)).await
}

/// [`build_state`] with an explicitly chosen language model.
pub async fn build_state_with(
    config: &AppConfig,
    lm: Arc<dyn LanguageModel>,
) -> Result<SharedApiState, Box<dyn std::error::Error>> {
    let (conversations, preferences) = open_store(config).await?;

    let controller = DegradationController::from_config(config, lm, conversations.clone(), preferences);

    Ok(Arc::new(ApiV1State {
        controller: Arc::new(controller),
        conversations,
        default_owner: config.assistant.default_owner.clone(),
        start_time: std::time::Instant::now(),
    }))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    if !config.has_api_key() {
        warn!("No API key configured; generations will fail and fall back to templates");
    }

    let state = build_state(&config).await?;
    let app = build_router(state);

    info!(addr = %addr, store = %config.store.backend, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Debug, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "ok" when every probe passes, otherwise "degraded"
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub store: ProbeResult,
    pub language_model: ProbeResult,
}

#[derive(Debug, Serialize, serde::Deserialize)]
pub struct ProbeResult {
    pub name: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn probe<E, F>(name: &str, check: F) -> ProbeResult
where
    E: std::fmt::Display,
    F: std::future::Future<Output = Result<bool, E>>,
{
    let (healthy, error) = match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, check).await {
        Ok(Ok(healthy)) => (healthy, None),
        Ok(Err(e)) => (false, Some(e.to_string())),
        Err(_) => (false, Some("probe timed out".to_string())),
    };
    ProbeResult {
        name: name.to_string(),
        healthy,
        error,
    }
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    let conversations = state.controller.conversations();
    let lm = state.controller.language_model();

    let (store, language_model) = tokio::join!(
        probe(conversations.name(), conversations.health_check()),
        probe(lm.name(), lm.health_check()),
    );

    let status = if store.healthy && language_model.healthy {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        store,
        language_model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use mindkeep_assistant::test_helpers::ScriptedModel;
    use tower::ServiceExt;

    fn test_state() -> SharedApiState {
        let store = Arc::new(InMemoryStore::new().with_owner("alice"));
        let controller =
            DegradationController::new(Arc::new(ScriptedModel::replying("hi")), store.clone(), store.clone());
        Arc::new(ApiV1State {
            controller: Arc::new(controller),
            conversations: store,
            default_owner: None,
            start_time: std::time::Instant::now(),
        })
    }

    #[tokio::test]
    async fn health_reports_probes() {
        let app = build_router(test_state());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(health.store.name, "in_memory");
        assert_eq!(health.language_model.name, "scripted");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = build_router(test_state());
        let message = "x".repeat(2 * 1024 * 1024);
        let body = serde_json::json!({ "ownerId": "alice", "message": message });

        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unreachable_store_still_builds_and_answers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.store.database_url = format!(
            "sqlite://{}",
            dir.path().join("absent").join("mindkeep.db").display()
        );
        config.assistant.default_owner = Some("alice".into());

        assert!(build_state(&config).await.is_ok());

        let state = build_state_with(&config, Arc::new(ScriptedModel::replying("Still here.")))
            .await
            .unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message":"hello"}"#))
            .unwrap();

        let response = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let chat: api_v1::ChatResponse = serde_json::from_slice(&body).unwrap();
        assert!(chat.success);
        assert_eq!(
            chat.message.metadata.level,
            mindkeep_assistant::DegradationLevel::SchemaUnavailable
        );
        assert_eq!(chat.message.content, "Still here.");
        assert!(!chat.message.metadata.persisted);
    }

    #[tokio::test]
    async fn memory_backend_provisions_default_owner() {
        let mut config = AppConfig::default();
        config.store.backend = "memory".into();
        config.assistant.default_owner = Some("alice".into());

        let (conversations, _) = open_store(&config).await.unwrap();
        assert!(
            conversations
                .create_conversation(&OwnerId::from("alice"), "t")
                .await
                .is_ok()
        );
    }
}
