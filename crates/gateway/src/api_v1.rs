//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`: Send a message, get a response
//! - `GET  /v1/conversations/{id}/messages`: Re-read stored messages

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use mindkeep_assistant::{ChatRequest, DegradationController, DegradationLevel, ResponseEnvelope};
use mindkeep_core::error::RepositoryError;
use mindkeep_core::message::{ConversationId, Message, MessageMetadata, OwnerId};
use mindkeep_core::repository::ConversationRepository;

// ── State ─────────────────────────────────────────────────────────────────

/// Default page size for message listings.
const DEFAULT_MESSAGE_LIMIT: usize = 50;
/// Largest page a caller may request.
const MAX_MESSAGE_LIMIT: usize = 500;

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub controller: Arc<DegradationController>,
    pub conversations: Arc<dyn ConversationRepository>,
    /// Owner assumed when a request names none.
    pub default_owner: Option<String>,
    pub start_time: std::time::Instant,
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/conversations/{id}/messages", get(list_messages_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub owner_id: Option<String>,

    /// Existing conversation ID (omit to create new).
    #[serde(default)]
    pub conversation_id: Option<String>,

    pub message: String,

    #[serde(default)]
    pub title: Option<String>,
}

/// The success wire shape.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub conversation_id: Option<String>,
    pub message: WireMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub metadata: WireMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetadata {
    pub level: DegradationLevel,
    pub confidence: f32,
    pub tokens_used: u32,
    pub processing_time_ms: u64,
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl From<ResponseEnvelope> for ChatResponse {
    fn from(envelope: ResponseEnvelope) -> Self {
        Self {
            success: true,
            conversation_id: envelope.conversation_id.map(|id| id.0),
            message: WireMessage {
                id: envelope.message_id.0,
                role: "assistant".into(),
                content: envelope.content,
                metadata: WireMetadata {
                    level: envelope.level,
                    confidence: envelope.confidence,
                    tokens_used: envelope.tokens_used,
                    processing_time_ms: envelope.processing_time_ms,
                    persisted: envelope.persisted,
                    model: envelope.model,
                },
            },
        }
    }
}

/// The failure wire shape.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFailure {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<DegradationLevel>,
    /// Whether resending the same message may succeed.
    pub retryable: bool,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "MessageMetadata::is_empty")]
    pub metadata: MessageMetadata,
    pub created_at: String,
}

impl From<Message> for StoredMessage {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.0,
            role: message.role.as_str().to_string(),
            content: message.content,
            metadata: message.metadata,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListResponse {
    pub conversation_id: String,
    pub messages: Vec<StoredMessage>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// Answer a chat message.
///
/// The controller runs on its own task so a client disconnect cannot cancel
/// a store write halfway through.
async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatBody>,
) -> Response {
    // An unnamed owner is never provisioned; the controller degrades it.
    let owner = payload
        .owner_id
        .or_else(|| state.default_owner.clone())
        .unwrap_or_else(|| {
            warn!("v1/chat request names no owner and no default owner is configured");
            String::new()
        });

    let request = ChatRequest {
        owner_id: OwnerId(owner),
        conversation_id: payload.conversation_id.map(ConversationId),
        message: payload.message,
        title: payload.title,
    };

    info!(
        owner = %request.owner_id,
        new_thread = request.conversation_id.is_none(),
        message_len = request.message.len(),
        "v1/chat request"
    );

    let controller = state.controller.clone();
    let outcome = tokio::spawn(async move { controller.handle(request).await }).await;

    match outcome {
        Ok(Ok(envelope)) => (StatusCode::OK, Json(ChatResponse::from(envelope))).into_response(),
        Ok(Err(err)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ChatFailure {
                success: false,
                conversation_id: Some(err.conversation_id().to_string()),
                error: "Your message could not be saved. Please try again.".into(),
                level: Some(DegradationLevel::MessagePersistFailure),
                retryable: true,
            }),
        )
            .into_response(),
        Err(join_error) => {
            error!(error = %join_error, "Chat task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatFailure {
                    success: false,
                    conversation_id: None,
                    error: "The request could not be completed. Please try again.".into(),
                    level: None,
                    retryable: true,
                }),
            )
                .into_response()
        }
    }
}

/// Re-read the most recent messages of a conversation, oldest first.
async fn list_messages_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessageListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .min(MAX_MESSAGE_LIMIT);

    let messages = state
        .conversations
        .list_recent_messages(&ConversationId(id.clone()), limit)
        .await
        .map_err(|e| {
            let status = match e {
                RepositoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ErrorResponse { error: e.to_string() }))
        })?;

    let messages: Vec<StoredMessage> = messages.into_iter().map(StoredMessage::from).collect();
    Ok(Json(MessageListResponse {
        conversation_id: id,
        count: messages.len(),
        messages,
    }))
}
