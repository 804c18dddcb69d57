//! # Mindkeep Core
//!
//! Domain types, collaborator traits, and error definitions for the Mindkeep
//! conversational assistant. This crate has **zero framework dependencies**:
//! it defines the model that the store, provider, and assistant crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in
//! their respective crates. This enables:
//! - Injecting the language model and repositories explicitly
//! - Deterministic test doubles for every failure combination
//! - A clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod language_model;
pub mod message;
pub mod preference;
pub mod repository;

// Re-export key types at crate root for ergonomics
pub use error::{ChatError, LmError, RepositoryError};
pub use language_model::{Generation, GenerationParams, LanguageModel, PromptTurn};
pub use message::{
    Conversation, ConversationId, ConversationStatus, Message, MessageId, MessageMetadata, OwnerId,
    Priority, Role,
};
pub use preference::UserPreference;
pub use repository::{ConversationRepository, PreferenceRepository};
