//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use mindkeep_core::error::RepositoryError;
use mindkeep_core::message::{
    Conversation, ConversationId, Message, MessageMetadata, OwnerId, Role,
};
use mindkeep_core::preference::UserPreference;
use mindkeep_core::repository::{ConversationRepository, PreferenceRepository};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Default)]
struct Inner {
    owners: HashSet<String>,
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
    preferences: HashMap<String, UserPreference>,
}

/// A store that keeps everything in process memory.
///
/// Owners must be registered before they can open conversations, mirroring
/// the provisioning rule of the durable backend.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style owner registration.
    pub fn with_owner(mut self, owner: &str) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => {
                inner.get_mut().owners.insert(owner.to_string());
            }
            // Shared with a clone.
            None => match self.inner.try_write() {
                Ok(mut inner) => {
                    inner.owners.insert(owner.to_string());
                }
                Err(_) => warn!(owner, "Store is locked; owner not registered"),
            },
        }
        self
    }

    pub async fn add_owner(&self, owner: &OwnerId) {
        self.inner
            .write()
            .await
            .owners
            .insert(owner.as_str().to_string());
    }

    pub async fn set_preferences(&self, preference: UserPreference) {
        self.inner
            .write()
            .await
            .preferences
            .insert(preference.owner_id.as_str().to_string(), preference);
    }

    pub async fn get_conversation(&self, id: &ConversationId) -> Option<Conversation> {
        self.inner.read().await.conversations.get(id.as_str()).cloned()
    }

    /// Every message in a conversation, in write order.
    pub async fn messages(&self, id: &ConversationId) -> Vec<Message> {
        self.inner
            .read()
            .await
            .messages
            .get(id.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.inner.read().await.conversations.len()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_conversation(
        &self,
        owner: &OwnerId,
        title: &str,
    ) -> Result<Conversation, RepositoryError> {
        let mut inner = self.inner.write().await;
        if !inner.owners.contains(owner.as_str()) {
            return Err(RepositoryError::OwnerNotFound(owner.to_string()));
        }
        let conversation = Conversation::new(owner.clone(), title);
        inner
            .conversations
            .insert(conversation.id.as_str().to_string(), conversation.clone());
        inner
            .messages
            .insert(conversation.id.as_str().to_string(), Vec::new());
        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<Message, RepositoryError> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(conversation_id.as_str())
            .ok_or_else(|| RepositoryError::ConversationNotFound(conversation_id.to_string()))?;

        let message = Message::new(conversation_id.clone(), role, content, metadata);
        conversation.updated_at = message.created_at;

        inner
            .messages
            .entry(conversation_id.as_str().to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let inner = self.inner.read().await;
        let all = inner
            .messages
            .get(conversation_id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryStore {
    async fn get_preferences(
        &self,
        owner: &OwnerId,
    ) -> Result<Option<UserPreference>, RepositoryError> {
        Ok(self.inner.read().await.preferences.get(owner.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerId {
        OwnerId::from("alice")
    }

    #[tokio::test]
    async fn unknown_owner_cannot_open_conversation() {
        let store = InMemoryStore::new();
        let err = store.create_conversation(&owner(), "t").await.unwrap_err();
        assert!(matches!(err, RepositoryError::OwnerNotFound(_)));
        assert_eq!(store.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn with_owner_registers_on_fresh_and_shared_stores() {
        let fresh = InMemoryStore::new().with_owner("alice");
        assert!(fresh.create_conversation(&owner(), "t").await.is_ok());

        let original = InMemoryStore::new();
        let shared = original.clone().with_owner("alice");
        assert!(shared.create_conversation(&owner(), "t").await.is_ok());
        assert!(original.create_conversation(&owner(), "t").await.is_ok());
        assert_eq!(original.conversation_count().await, 2);
    }

    #[tokio::test]
    async fn append_advances_updated_at() {
        let store = InMemoryStore::new().with_owner("alice");
        let conv = store.create_conversation(&owner(), "Plans").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let msg = store
            .append_message(&conv.id, Role::User, "hi", MessageMetadata::default())
            .await
            .unwrap();

        let stored = store.get_conversation(&conv.id).await.unwrap();
        assert_eq!(stored.updated_at, msg.created_at);
        assert!(stored.updated_at > conv.created_at);
    }

    #[tokio::test]
    async fn append_to_missing_conversation_fails() {
        let store = InMemoryStore::new();
        let err = store
            .append_message(
                &ConversationId::from("nope"),
                Role::User,
                "hi",
                MessageMetadata::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConversationNotFound(_)));
    }

    #[tokio::test]
    async fn recent_messages_are_bounded_and_oldest_first() {
        let store = InMemoryStore::new();
        store.add_owner(&owner()).await;
        let conv = store.create_conversation(&owner(), "t").await.unwrap();
        for i in 0..10 {
            store
                .append_message(&conv.id, Role::User, &format!("m{i}"), MessageMetadata::default())
                .await
                .unwrap();
        }

        let recent = store.list_recent_messages(&conv.id, 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m7", "m8", "m9"]);

        assert!(store.list_recent_messages(&conv.id, 0).await.unwrap().is_empty());
        assert_eq!(store.list_recent_messages(&conv.id, 50).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn preferences_round_trip() {
        let store = InMemoryStore::new();
        assert!(store.get_preferences(&owner()).await.unwrap().is_none());

        let mut pref = UserPreference::default_for(owner());
        pref.response_style = "concise".into();
        store.set_preferences(pref).await;

        let got = store.get_preferences(&owner()).await.unwrap().unwrap();
        assert_eq!(got.response_style, "concise");
    }
}
