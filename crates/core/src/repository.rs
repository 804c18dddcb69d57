//! Repository traits: the persistence collaborators of the assistant.
//!
//! The assistant never talks to a database directly. It asks a
//! [`ConversationRepository`] to create threads and append messages, and a
//! [`PreferenceRepository`] for per-user hints.
//!
//! Implementations: SQLite, in-memory (for testing and ephemeral use).

use async_trait::async_trait;

use crate::error::RepositoryError;
use crate::message::{Conversation, ConversationId, Message, MessageMetadata, OwnerId, Role};
use crate::preference::UserPreference;

/// Durable storage for conversations and their messages.
///
/// No method takes a lock across calls: two requests appending to the same
/// conversation may interleave, and message order is write order.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create a conversation for `owner`.
    ///
    /// Fails with `OwnerNotFound` if the owner is not provisioned and
    /// `Unavailable` if the store or its schema cannot be reached.
    async fn create_conversation(
        &self,
        owner: &OwnerId,
        title: &str,
    ) -> std::result::Result<Conversation, RepositoryError>;

    /// Append a message and advance the conversation's `updated_at`.
    ///
    /// Fails with `ConversationNotFound` or `WriteFailed`.
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> std::result::Result<Message, RepositoryError>;

    /// The most recent `limit` messages, oldest first.
    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, RepositoryError>;

    /// Health check: can we reach the store?
    async fn health_check(&self) -> std::result::Result<bool, RepositoryError> {
        Ok(true)
    }
}

/// Read access to user preferences.
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// `Ok(None)` when the owner has no stored preferences.
    async fn get_preferences(
        &self,
        owner: &OwnerId,
    ) -> std::result::Result<Option<UserPreference>, RepositoryError>;
}
