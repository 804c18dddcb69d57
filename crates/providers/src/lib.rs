//! Language-model clients for Mindkeep.
//!
//! All clients implement the `mindkeep_core::LanguageModel` trait.
//! [`build_from_config`] selects the endpoint from configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatClient;
pub use router::build_from_config;
