//! The degradation controller: answers every chat request it can.
//!
//! The normal flow is a left-to-right pipeline of fallible stages:
//! open session → compile → generate → record reply. A stage either hands
//! its result to the next one or short-circuits with a [`Detour`], and each
//! detour is settled exactly once into an envelope (or, for a lost message,
//! into a [`ChatError`]).
//!
//! | Detour | Settled as |
//! |--------|------------|
//! | store cannot host the thread | pipeline continues detached, level `SCHEMA_UNAVAILABLE` / `OWNER_UNPROVISIONED` |
//! | language model fails | `LM_FAILURE_LOCAL` template reply |
//! | malformed data or a panic | one bare retry, `EMERGENCY` or `TERMINAL` |
//! | message write fails | `ChatError::MessagePersistFailure` |

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use mindkeep_config::AppConfig;
use mindkeep_core::error::{ChatError, LmError, RepositoryError};
use mindkeep_core::language_model::{Generation, GenerationParams, LanguageModel, PromptTurn};
use mindkeep_core::message::{
    Conversation, ConversationId, Message, MessageId, MessageMetadata, OwnerId, Role,
};
use mindkeep_core::preference::UserPreference;
use mindkeep_core::repository::{ConversationRepository, PreferenceRepository};
use tracing::{debug, error, info, warn};

use crate::context::{AssembledContext, ContextAssembler, PERSONA, compile_prompt};
use crate::envelope::{DegradationLevel, ResponseEnvelope};
use crate::responder::respond_locally;
use crate::scorer::score_confidence;

/// Confidence reported for template replies.
pub const LOCAL_FALLBACK_CONFIDENCE: f32 = 0.6;

/// The reply when every attempt has failed.
pub const TERMINAL_APOLOGY: &str = "I'm sorry, I wasn't able to process your message just now. \
Please try again in a moment.";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub owner_id: OwnerId,

    /// Continue this thread; `None` starts a new one.
    pub conversation_id: Option<ConversationId>,

    pub message: String,

    /// Title for a new thread; derived from the message when absent.
    pub title: Option<String>,
}

impl ChatRequest {
    pub fn new(owner_id: OwnerId, message: impl Into<String>) -> Self {
        Self {
            owner_id,
            conversation_id: None,
            message: message.into(),
            title: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// State gathered by the open-session stage.
struct Session {
    /// `None` when the store could not host the thread.
    conversation_id: Option<ConversationId>,

    /// `Full` for a stored thread, otherwise the detached level.
    level: DegradationLevel,

    history: Vec<Message>,

    preference: Option<UserPreference>,
}

/// Why the pipeline left the normal flow.
enum Detour {
    LmFailed { session: Session, cause: LmError },
    Emergency {
        conversation_id: Option<ConversationId>,
        cause: String,
    },
    Fatal(ChatError),
}

/// Sequences the store, the language model and the template responder.
///
/// Holds only immutable configuration and shared collaborators, so one
/// instance serves any number of concurrent requests.
pub struct DegradationController {
    lm: Arc<dyn LanguageModel>,
    conversations: Arc<dyn ConversationRepository>,
    preferences: Arc<dyn PreferenceRepository>,

    /// Fixed sampling parameters
    params: GenerationParams,

    /// Upper bound on one generation call
    timeout: Duration,

    assembler: ContextAssembler,

    persona: String,
}

impl DegradationController {
    pub fn new(
        lm: Arc<dyn LanguageModel>,
        conversations: Arc<dyn ConversationRepository>,
        preferences: Arc<dyn PreferenceRepository>,
    ) -> Self {
        Self {
            lm,
            conversations,
            preferences,
            params: GenerationParams::default(),
            timeout: DEFAULT_TIMEOUT,
            assembler: ContextAssembler::default(),
            persona: PERSONA.to_string(),
        }
    }

    /// Build a controller with everything configuration decides.
    pub fn from_config(
        config: &AppConfig,
        lm: Arc<dyn LanguageModel>,
        conversations: Arc<dyn ConversationRepository>,
        preferences: Arc<dyn PreferenceRepository>,
    ) -> Self {
        let controller = Self::new(lm, conversations, preferences)
            .with_params(config.generation.params())
            .with_timeout(config.generation.timeout())
            .with_context_window(config.assistant.context_window);

        match &config.assistant.persona_override {
            Some(persona) => controller.with_persona(persona.clone()),
            None => controller,
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many prior messages are replayed to the model.
    pub fn with_context_window(mut self, window: usize) -> Self {
        self.assembler = ContextAssembler::new(window);
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn language_model(&self) -> &Arc<dyn LanguageModel> {
        &self.lm
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationRepository> {
        &self.conversations
    }

    /// Answer one chat request.
    ///
    /// Returns an envelope for every outcome except a message that could not
    /// be written to an existing conversation.
    pub async fn handle(&self, request: ChatRequest) -> Result<ResponseEnvelope, ChatError> {
        let started = Instant::now();

        match AssertUnwindSafe(self.run(&request, started))
            .catch_unwind()
            .await
        {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(Detour::LmFailed { session, cause })) => {
                Ok(self.settle_local(session, &request.message, &cause, started))
            }
            Ok(Err(Detour::Emergency {
                conversation_id,
                cause,
            })) => Ok(self
                .settle_emergency(conversation_id, &request.message, &cause, started)
                .await),
            Ok(Err(Detour::Fatal(err))) => {
                error!(
                    conversation = %err.conversation_id(),
                    level = %DegradationLevel::MessagePersistFailure,
                    error = %err,
                    "Message lost; surfacing to caller"
                );
                Err(err)
            }
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                Ok(self
                    .settle_emergency(request.conversation_id.clone(), &request.message, &cause, started)
                    .await)
            }
        }
    }

    // ── Pipeline ──────────────────────────────────────────────────────────

    async fn run(&self, request: &ChatRequest, started: Instant) -> Result<ResponseEnvelope, Detour> {
        let session = self.open_session(request).await?;
        let context = self
            .assembler
            .assemble(&session.history, session.preference.as_ref());
        let prompt = compile_prompt(&self.persona, &context, &request.message);

        let generation = match self.generate(&prompt).await {
            Ok(generation) => generation,
            Err(cause) => return Err(Detour::LmFailed { session, cause }),
        };

        self.record_reply(session, generation, started).await
    }

    /// Resolve the thread, read its context, and store the user message.
    async fn open_session(&self, request: &ChatRequest) -> Result<Session, Detour> {
        let (conversation_id, is_new) = match &request.conversation_id {
            Some(id) => (id.clone(), false),
            None => match self.open_conversation(request).await? {
                Ok(conversation) => (conversation.id, true),
                Err(level) => {
                    return Ok(Session {
                        conversation_id: None,
                        level,
                        history: Vec::new(),
                        preference: None,
                    });
                }
            },
        };

        let history = if is_new {
            Vec::new()
        } else {
            match self
                .conversations
                .list_recent_messages(&conversation_id, self.assembler.window())
                .await
            {
                Ok(history) => history,
                Err(RepositoryError::Malformed(cause)) => {
                    return Err(Detour::Emergency {
                        conversation_id: Some(conversation_id),
                        cause,
                    });
                }
                Err(e) => {
                    warn!(conversation = %conversation_id, error = %e, "History unavailable; continuing without it");
                    Vec::new()
                }
            }
        };

        let preference = match self.preferences.get_preferences(&request.owner_id).await {
            Ok(Some(preference)) => preference,
            Ok(None) => UserPreference::default_for(request.owner_id.clone()),
            Err(RepositoryError::Malformed(cause)) => {
                return Err(Detour::Emergency {
                    conversation_id: Some(conversation_id),
                    cause,
                });
            }
            Err(e) => {
                warn!(owner = %request.owner_id, error = %e, "Preferences unavailable; using defaults");
                UserPreference::default_for(request.owner_id.clone())
            }
        };

        self.conversations
            .append_message(
                &conversation_id,
                Role::User,
                &request.message,
                MessageMetadata::default(),
            )
            .await
            .map_err(|source| {
                Detour::Fatal(ChatError::MessagePersistFailure {
                    conversation_id: conversation_id.clone(),
                    source,
                })
            })?;

        Ok(Session {
            conversation_id: Some(conversation_id),
            level: DegradationLevel::Full,
            history,
            preference: Some(preference),
        })
    }

    /// Create a new thread, or name the detached level to continue at.
    async fn open_conversation(
        &self,
        request: &ChatRequest,
    ) -> Result<Result<Conversation, DegradationLevel>, Detour> {
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Conversation::title_from_message(&request.message));

        match self
            .conversations
            .create_conversation(&request.owner_id, &title)
            .await
        {
            Ok(conversation) => {
                debug!(conversation = %conversation.id, owner = %request.owner_id, "Conversation opened");
                Ok(Ok(conversation))
            }
            Err(RepositoryError::OwnerNotFound(cause)) => {
                let level = DegradationLevel::OwnerUnprovisioned;
                warn!(%level, owner = %request.owner_id, cause = %cause, "Answering without persistence");
                Ok(Err(level))
            }
            Err(RepositoryError::Malformed(cause)) => Err(Detour::Emergency {
                conversation_id: None,
                cause,
            }),
            Err(e) => {
                let level = DegradationLevel::SchemaUnavailable;
                warn!(%level, store = self.conversations.name(), error = %e, "Answering without persistence");
                Ok(Err(level))
            }
        }
    }

    /// One bounded call to the language model.
    async fn generate(&self, prompt: &[PromptTurn]) -> Result<Generation, LmError> {
        match tokio::time::timeout(self.timeout, self.lm.generate(prompt, &self.params)).await {
            Ok(result) => result,
            Err(_) => Err(LmError::Timeout(format!(
                "no completion within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Score the reply and, for a stored thread, persist it.
    async fn record_reply(
        &self,
        session: Session,
        generation: Generation,
        started: Instant,
    ) -> Result<ResponseEnvelope, Detour> {
        let confidence = score_confidence(&generation.text);

        let Some(conversation_id) = session.conversation_id else {
            info!(level = %session.level, confidence, "Answered without persistence");
            return Ok(ResponseEnvelope {
                conversation_id: None,
                message_id: MessageId::new(),
                content: generation.text,
                level: session.level,
                confidence,
                persisted: false,
                tokens_used: generation.tokens_used,
                processing_time_ms: elapsed_ms(started),
                model: Some(generation.model),
            });
        };

        let metadata = MessageMetadata {
            model: Some(generation.model.clone()),
            tokens_used: Some(generation.tokens_used),
            latency_ms: Some(generation.latency_ms),
            confidence: Some(confidence),
        };
        let message = self
            .conversations
            .append_message(&conversation_id, Role::Assistant, &generation.text, metadata)
            .await
            .map_err(|source| {
                Detour::Fatal(ChatError::MessagePersistFailure {
                    conversation_id: conversation_id.clone(),
                    source,
                })
            })?;

        debug!(
            conversation = %conversation_id,
            tokens = generation.tokens_used,
            latency_ms = generation.latency_ms,
            confidence,
            "Reply recorded"
        );

        Ok(ResponseEnvelope {
            conversation_id: Some(conversation_id),
            message_id: message.id,
            content: message.content,
            level: DegradationLevel::Full,
            confidence,
            persisted: true,
            tokens_used: generation.tokens_used,
            processing_time_ms: elapsed_ms(started),
            model: Some(generation.model),
        })
    }

    // ── Settlement ────────────────────────────────────────────────────────

    fn settle_local(
        &self,
        session: Session,
        message: &str,
        cause: &LmError,
        started: Instant,
    ) -> ResponseEnvelope {
        let reply = respond_locally(message);
        let level = DegradationLevel::LmFailureLocal;
        warn!(
            %level,
            lm = self.lm.name(),
            error = %cause,
            category = %reply.category,
            "Language model failed; answering from templates"
        );

        ResponseEnvelope {
            conversation_id: session.conversation_id,
            message_id: MessageId::new(),
            content: reply.text,
            level,
            confidence: LOCAL_FALLBACK_CONFIDENCE,
            persisted: false,
            tokens_used: 0,
            processing_time_ms: elapsed_ms(started),
            model: None,
        }
    }

    /// Retry once with only the persona and the raw message; nothing is read
    /// or written.
    async fn settle_emergency(
        &self,
        conversation_id: Option<ConversationId>,
        message: &str,
        cause: &str,
        started: Instant,
    ) -> ResponseEnvelope {
        warn!(level = %DegradationLevel::Emergency, cause, "Normal flow broke; retrying bare");

        let prompt = compile_prompt(&self.persona, &AssembledContext::default(), message);
        let retry = AssertUnwindSafe(self.generate(&prompt)).catch_unwind().await;

        match retry {
            Ok(Ok(generation)) => ResponseEnvelope {
                conversation_id,
                message_id: MessageId::new(),
                confidence: score_confidence(&generation.text),
                content: generation.text,
                level: DegradationLevel::Emergency,
                persisted: false,
                tokens_used: generation.tokens_used,
                processing_time_ms: elapsed_ms(started),
                model: Some(generation.model),
            },
            Ok(Err(e)) => self.settle_terminal(conversation_id, &e.to_string(), started),
            Err(panic) => {
                self.settle_terminal(conversation_id, &panic_message(panic.as_ref()), started)
            }
        }
    }

    fn settle_terminal(
        &self,
        conversation_id: Option<ConversationId>,
        cause: &str,
        started: Instant,
    ) -> ResponseEnvelope {
        error!(level = %DegradationLevel::Terminal, cause, "All attempts exhausted");
        ResponseEnvelope {
            conversation_id,
            message_id: MessageId::new(),
            content: TERMINAL_APOLOGY.to_string(),
            level: DegradationLevel::Terminal,
            confidence: 0.0,
            persisted: false,
            tokens_used: 0,
            processing_time_ms: elapsed_ms(started),
            model: None,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".into()
    }
}
