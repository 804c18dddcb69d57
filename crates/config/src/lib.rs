//! Configuration loading, validation, and management for Mindkeep.
//!
//! Loads configuration from `~/.mindkeep/config.toml` with environment
//! variable overrides. Validates all settings at startup. The resulting
//! value is passed explicitly into every component that needs it; nothing
//! reads process-wide settings after startup.

use mindkeep_core::GenerationParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.mindkeep/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the language-model service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Which endpoint serves generations
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Fixed sampling parameters and the call timeout
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Context window, persona, and request defaults
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("generation", &self.generation)
            .field("assistant", &self.assistant)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Base URL of an OpenAI-compatible API; derived from `name` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_provider_name() -> String {
    "openai".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_penalty")]
    pub frequency_penalty: f32,

    #[serde(default = "default_penalty")]
    pub presence_penalty: f32,

    /// Upper bound on one generation call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_penalty() -> f32 {
    0.1
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            frequency_penalty: default_penalty(),
            presence_penalty: default_penalty(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    /// The parameters handed to every generation call.
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// How many prior messages are replayed to the model
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Replaces the built-in persona directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_override: Option<String>,

    /// Owner used when a request names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_owner: Option<String>,
}

fn default_context_window() -> usize {
    6
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            persona_override: None,
            default_owner: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_database_url() -> String {
    AppConfig::config_dir()
        .join("mindkeep.db")
        .display()
        .to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mindkeep/config.toml).
    ///
    /// Environment overrides:
    /// - `MINDKEEP_API_KEY`, then `OPENAI_API_KEY`, used only when the file
    ///   sets no `api_key`
    /// - `MINDKEEP_MODEL`
    /// - `MINDKEEP_BASE_URL`
    /// - `MINDKEEP_DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `var`.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("MINDKEEP_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }

        if let Some(model) = var("MINDKEEP_MODEL") {
            self.generation.model = model;
        }

        if let Some(url) = var("MINDKEEP_BASE_URL") {
            self.provider.base_url = Some(url);
        }

        if let Some(url) = var("MINDKEEP_DATABASE_URL") {
            self.store.database_url = url;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mindkeep")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generation;
        if !(0.0..=2.0).contains(&g.temperature) {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if g.top_p <= 0.0 || g.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "generation.top_p must be in (0.0, 1.0]".into(),
            ));
        }
        if g.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "generation.max_tokens must be at least 1".into(),
            ));
        }
        if g.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "generation.timeout_secs must be at least 1".into(),
            ));
        }
        if self.assistant.context_window == 0 {
            return Err(ConfigError::ValidationError(
                "assistant.context_window must be at least 1".into(),
            ));
        }
        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"memory\", got \"{}\"",
                self.store.backend
            )));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            generation: GenerationConfig::default(),
            assistant: AssistantConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
