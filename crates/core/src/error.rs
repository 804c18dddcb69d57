//! Error types for the Mindkeep domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum; the assistant decides
//! which of them are recoverable and which surface to the caller.

use thiserror::Error;

use crate::message::ConversationId;

/// Failures reported by the conversation and preference repositories.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    /// The owning user is not provisioned in the store.
    #[error("Owner not found: {0}")]
    OwnerNotFound(String),

    /// The store (or its schema) cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The store answered, but with data that does not decode.
    #[error("Malformed data: {0}")]
    Malformed(String),
}

/// Failures from a single language-model call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LmError {
    #[error("Language model timed out: {0}")]
    Timeout(String),

    #[error("Language model service error: {message} (status: {status_code})")]
    ServiceError { status_code: u16, message: String },

    #[error("Language model returned an empty completion")]
    EmptyCompletion,
}

/// The one failure the assistant refuses to mask.
///
/// A conversation record exists but a message the caller expects to be in
/// it was never written. Transports surface this as an explicit retry prompt.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message could not be persisted to conversation {conversation_id}: {source}")]
    MessagePersistFailure {
        conversation_id: ConversationId,
        #[source]
        source: RepositoryError,
    },
}

impl ChatError {
    /// The conversation left without its expected message.
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::MessagePersistFailure {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_displays_status() {
        let err = LmError::ServiceError {
            status_code: 503,
            message: "overloaded".into(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn persist_failure_keeps_conversation_and_source() {
        let err = ChatError::MessagePersistFailure {
            conversation_id: ConversationId::from("conv-1"),
            source: RepositoryError::WriteFailed("disk full".into()),
        };
        assert_eq!(err.conversation_id().as_str(), "conv-1");
        assert!(err.to_string().contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
