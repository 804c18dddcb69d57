//! The response envelope and the degradation levels it is tagged with.

use mindkeep_core::message::{ConversationId, MessageId};
use serde::{Deserialize, Serialize};

/// Which response strategy produced an answer.
///
/// Serialized in `SCREAMING_SNAKE_CASE`; these tags are part of the wire
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DegradationLevel {
    /// Everything worked and both messages are stored.
    Full,
    /// The store or its schema could not be reached.
    SchemaUnavailable,
    /// The store rejected the owner reference.
    OwnerUnprovisioned,
    /// A message could not be written to an existing conversation.
    /// Never carried by an envelope; reported as an error instead.
    MessagePersistFailure,
    /// The language model failed; a template answered.
    LmFailureLocal,
    /// The normal flow broke; a bare retry answered.
    Emergency,
    /// Nothing worked; a fixed apology answered.
    Terminal,
}

impl DegradationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::SchemaUnavailable => "SCHEMA_UNAVAILABLE",
            Self::OwnerUnprovisioned => "OWNER_UNPROVISIONED",
            Self::MessagePersistFailure => "MESSAGE_PERSIST_FAILURE",
            Self::LmFailureLocal => "LM_FAILURE_LOCAL",
            Self::Emergency => "EMERGENCY",
            Self::Terminal => "TERMINAL",
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer and its provenance. Transient; never stored as a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// The thread the answer belongs to; `None` when no thread could be opened.
    pub conversation_id: Option<ConversationId>,

    /// The stored assistant message id, or a fresh id when nothing was stored.
    pub message_id: MessageId,

    pub content: String,

    pub level: DegradationLevel,

    /// Always within `[0, 1]`.
    pub confidence: f32,

    /// True only when both the user and the assistant message were written.
    pub persisted: bool,

    pub tokens_used: u32,

    pub processing_time_ms: u64,

    /// The model that produced `content`, if one did.
    pub model: Option<String>,
}
