//! LanguageModel trait: the abstraction over the external generation service.
//!
//! A LanguageModel takes an ordered prompt and fixed generation parameters
//! and makes exactly one remote call. It never retries: what to do after a
//! failure is the caller's decision.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LmError;
use crate::message::Role;

/// One entry of a compiled prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: Role,
    pub content: String,
}

impl PromptTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters. Fixed by configuration, never by the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// Temperature (0.0 = deterministic)
    pub temperature: f32,

    /// Nucleus-sampling cutoff
    pub top_p: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    pub frequency_penalty: f32,

    pub presence_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1000,
            frequency_penalty: 0.1,
            presence_penalty: 0.1,
        }
    }
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,

    /// Total tokens reported by the service (0 when not reported)
    pub tokens_used: u32,

    /// Wall-clock time of the single remote call
    pub latency_ms: u64,

    /// Which model actually responded
    pub model: String,
}

/// The core LanguageModel trait.
///
/// The degradation controller calls `generate()` without knowing which
/// backend sits behind it, which is what lets tests inject scripted doubles.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai").
    fn name(&self) -> &str;

    /// Make one generation call.
    async fn generate(
        &self,
        prompt: &[PromptTurn],
        params: &GenerationParams,
    ) -> std::result::Result<Generation, LmError>;

    /// Health check: can we reach the service?
    async fn health_check(&self) -> std::result::Result<bool, LmError> {
        Ok(true)
    }
}
