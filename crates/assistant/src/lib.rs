//! The conversational assistant: orchestration and degradation.
//!
//! A chat request flows through a fixed pipeline:
//!
//! 1. **Open session**: create or reuse a conversation, read recent history
//!    and preferences, persist the user message
//! 2. **Compile**: persona, preference directive, history, new message
//! 3. **Generate**: one bounded call to the language model
//! 4. **Record**: score the reply and persist it
//!
//! Whenever a step fails the [`DegradationController`] retreats to a lower
//! [`DegradationLevel`] instead of failing the request. Only a message that
//! could not be written to an existing conversation surfaces as an error.

pub mod context;
pub mod controller;
pub mod envelope;
pub mod responder;
pub mod scorer;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use context::{AssembledContext, ContextAssembler, PERSONA, compile_prompt};
pub use controller::{ChatRequest, DegradationController, LOCAL_FALLBACK_CONFIDENCE, TERMINAL_APOLOGY};
pub use envelope::{DegradationLevel, ResponseEnvelope};
pub use responder::{Category, TemplateReply, respond_locally};
pub use scorer::score_confidence;
