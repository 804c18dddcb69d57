//! Persistence backends for Mindkeep.
//!
//! Both backends implement `ConversationRepository` and
//! `PreferenceRepository` from `mindkeep-core`.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
