//! OpenAI-compatible language-model client.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, llama.cpp server, and any
//! endpoint exposing `/chat/completions`.
//!
//! One `generate()` is one HTTP request. Failures are classified into the
//! three [`LmError`] kinds and returned as-is; nothing here retries.

use async_trait::async_trait;
use mindkeep_core::error::LmError;
use mindkeep_core::language_model::{Generation, GenerationParams, LanguageModel, PromptTurn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// An OpenAI-compatible generation client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new client. `timeout` bounds each request end to end.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to a default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
            client,
        }
    }

    /// Convert prompt turns to the OpenAI message format.
    fn to_api_messages(prompt: &[PromptTurn]) -> Vec<ApiMessage> {
        prompt
            .iter()
            .map(|turn| ApiMessage {
                role: turn.role.as_str().to_string(),
                content: Some(turn.content.clone()),
            })
            .collect()
    }

    fn request_body(prompt: &[PromptTurn], params: &GenerationParams) -> serde_json::Value {
        serde_json::json!({
            "model": params.model,
            "messages": Self::to_api_messages(prompt),
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_tokens,
            "frequency_penalty": params.frequency_penalty,
            "presence_penalty": params.presence_penalty,
            "stream": false,
        })
    }

    /// Map a transport-level failure onto the LM failure taxonomy.
    fn classify_transport_error(&self, err: &reqwest::Error) -> LmError {
        if err.is_timeout() {
            LmError::Timeout(format!(
                "'{}' did not answer within {}ms",
                self.name,
                self.timeout.as_millis()
            ))
        } else {
            LmError::ServiceError {
                status_code: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }

    /// Turn a parsed response body into a generation, or `EmptyCompletion`.
    fn into_generation(api_response: ApiResponse, latency_ms: u64) -> Result<Generation, LmError> {
        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LmError::EmptyCompletion);
        }

        Ok(Generation {
            text,
            tokens_used: api_response.usage.map(|u| u.total_tokens).unwrap_or(0),
            latency_ms,
            model: api_response.model,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &[PromptTurn],
        params: &GenerationParams,
    ) -> std::result::Result<Generation, LmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(prompt, params);

        debug!(
            client = %self.name,
            model = %params.model,
            turns = prompt.len(),
            "Sending completion request"
        );

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(&e))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Language model returned error");
            return Err(LmError::ServiceError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.classify_transport_error(&e)
            } else {
                LmError::ServiceError {
                    status_code: 200,
                    message: format!("Failed to parse response: {e}"),
                }
            }
        })?;

        let latency_ms = started.elapsed().as_millis() as u64;
        Self::into_generation(api_response, latency_ms)
    }

    async fn health_check(&self) -> std::result::Result<bool, LmError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| self.classify_transport_error(&e))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    total_tokens: u32,
}
