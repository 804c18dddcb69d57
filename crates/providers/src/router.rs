//! Client construction: builds the configured language model.
//!
//! Every well-known name maps to an OpenAI-compatible endpoint; an explicit
//! `provider.base_url` always wins.

use std::sync::Arc;

use mindkeep_config::AppConfig;
use mindkeep_core::language_model::LanguageModel;
use tracing::info;

use crate::openai_compat::OpenAiCompatClient;

/// Build the language model described by `config`.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn LanguageModel> {
    let name = config.provider.name.as_str();
    let base_url = config
        .provider
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(name));
    let api_key = config.api_key.clone().unwrap_or_default();

    info!(
        provider = name,
        base_url = %base_url,
        model = %config.generation.model,
        "Language model configured"
    );

    Arc::new(OpenAiCompatClient::new(
        name,
        base_url,
        api_key,
        config.generation.timeout(),
    ))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
