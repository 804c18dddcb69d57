//! Scripted collaborators for controller tests.
//!
//! [`ScriptedModel`] plays back a queue of outcomes and records every prompt
//! it sees. [`FlakyStore`] is an in-process repository whose individual
//! operations can be told to fail or panic.

use async_trait::async_trait;
use mindkeep_core::error::{LmError, RepositoryError};
use mindkeep_core::language_model::{Generation, GenerationParams, LanguageModel, PromptTurn};
use mindkeep_core::message::{
    Conversation, ConversationId, Message, MessageMetadata, OwnerId, Role,
};
use mindkeep_core::preference::UserPreference;
use mindkeep_core::repository::{ConversationRepository, PreferenceRepository};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One scripted language-model outcome.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    Fail(LmError),
    /// Never completes; only a timeout ends the call.
    Hang,
    Panic,
}

/// A language model that plays back scripts in order.
///
/// The last script repeats once the queue is exhausted.
pub struct ScriptedModel {
    scripts: Mutex<Vec<Script>>,
    prompts: Mutex<Vec<Vec<PromptTurn>>>,
}

impl ScriptedModel {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `text`.
    pub fn replying(text: &str) -> Self {
        Self::new(vec![Script::Reply(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn last_prompt(&self) -> Option<Vec<PromptTurn>> {
        lock(&self.prompts).last().cloned()
    }

    fn next_script(&self) -> Script {
        let mut scripts = lock(&self.scripts);
        match scripts.len() {
            0 => Script::Fail(LmError::EmptyCompletion),
            1 => scripts[0].clone(),
            _ => scripts.remove(0),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &[PromptTurn],
        params: &GenerationParams,
    ) -> Result<Generation, LmError> {
        lock(&self.prompts).push(prompt.to_vec());

        match self.next_script() {
            Script::Reply(text) => Ok(Generation {
                tokens_used: u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX),
                text,
                latency_ms: 1,
                model: params.model.clone(),
            }),
            Script::Fail(e) => Err(e),
            Script::Hang => {
                std::future::pending::<()>().await;
                Err(LmError::EmptyCompletion)
            }
            Script::Panic => panic!("scripted model panic"),
        }
    }
}

#[derive(Default)]
struct StoreState {
    owners: HashSet<String>,
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    preferences: HashMap<String, UserPreference>,
}

#[derive(Default)]
struct Faults {
    create: Option<RepositoryError>,
    create_panics: bool,
    append: HashMap<&'static str, RepositoryError>,
    history: Option<RepositoryError>,
    preferences: Option<RepositoryError>,
}

/// An in-process repository with per-operation fault injection.
#[derive(Default)]
pub struct FlakyStore {
    state: Mutex<StoreState>,
    faults: Mutex<Faults>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(owner: &str) -> Self {
        let store = Self::new();
        lock(&store.state).owners.insert(owner.to_string());
        store
    }

    pub fn fail_create(&self, err: RepositoryError) {
        lock(&self.faults).create = Some(err);
    }

    pub fn panic_on_create(&self) {
        lock(&self.faults).create_panics = true;
    }

    /// Fail every append of messages with `role`.
    pub fn fail_append(&self, role: Role, err: RepositoryError) {
        lock(&self.faults).append.insert(role.as_str(), err);
    }

    pub fn fail_history(&self, err: RepositoryError) {
        lock(&self.faults).history = Some(err);
    }

    pub fn fail_preferences(&self, err: RepositoryError) {
        lock(&self.faults).preferences = Some(err);
    }

    pub fn set_preference(&self, preference: UserPreference) {
        lock(&self.state)
            .preferences
            .insert(preference.owner_id.as_str().to_string(), preference);
    }

    /// Create a conversation holding `n` alternating turns "seed 0".."seed n-1".
    pub fn seed_conversation(&self, owner: &str, n: usize) -> ConversationId {
        let mut state = lock(&self.state);
        let conversation = Conversation::new(OwnerId::from(owner), "seeded");
        let id = conversation.id.clone();
        let messages = (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new(id.clone(), role, format!("seed {i}"), MessageMetadata::default())
            })
            .collect();
        state.conversations.push(conversation);
        state.messages.insert(id.as_str().to_string(), messages);
        id
    }

    pub fn stored_messages(&self, id: &ConversationId) -> Vec<Message> {
        lock(&self.state)
            .messages
            .get(id.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_messages(&self) -> usize {
        lock(&self.state).messages.values().map(Vec::len).sum()
    }

    pub fn titles(&self) -> Vec<String> {
        lock(&self.state)
            .conversations
            .iter()
            .map(|c| c.title.clone())
            .collect()
    }
}

#[async_trait]
impl ConversationRepository for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create_conversation(
        &self,
        owner: &OwnerId,
        title: &str,
    ) -> Result<Conversation, RepositoryError> {
        {
            let faults = lock(&self.faults);
            if faults.create_panics {
                panic!("scripted store panic");
            }
            if let Some(err) = &faults.create {
                return Err(err.clone());
            }
        }

        let mut state = lock(&self.state);
        if !state.owners.contains(owner.as_str()) {
            return Err(RepositoryError::OwnerNotFound(owner.to_string()));
        }
        let conversation = Conversation::new(owner.clone(), title);
        state
            .messages
            .insert(conversation.id.as_str().to_string(), Vec::new());
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<Message, RepositoryError> {
        if let Some(err) = lock(&self.faults).append.get(role.as_str()) {
            return Err(err.clone());
        }

        let mut state = lock(&self.state);
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| RepositoryError::ConversationNotFound(conversation_id.to_string()))?;

        let message = Message::new(conversation_id.clone(), role, content, metadata);
        conversation.updated_at = message.created_at;
        state
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
        if let Some(err) = &lock(&self.faults).history {
            return Err(err.clone());
        }
        let all = self.stored_messages(conversation_id);
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }
}

#[async_trait]
impl PreferenceRepository for FlakyStore {
    async fn get_preferences(
        &self,
        owner: &OwnerId,
    ) -> Result<Option<UserPreference>, RepositoryError> {
        if let Some(err) = &lock(&self.faults).preferences {
            return Err(err.clone());
        }
        Ok(lock(&self.state).preferences.get(owner.as_str()).cloned())
    }
}
