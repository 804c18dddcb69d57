//! Prompt compilation.

use mindkeep_core::language_model::PromptTurn;

use crate::context::assembler::AssembledContext;

/// The built-in persona directive.
pub const PERSONA: &str = "You are Mindkeep, a strategic productivity assistant. \
Help the user think clearly about their projects, priorities and decisions. \
Be concrete and structured, surface trade-offs and alternatives where they \
matter, and close with practical next steps.";

/// Build the exact sequence passed to the language model.
///
/// Order is fixed: persona, preference directive, history, new message.
/// Nothing is reordered or deduplicated.
pub fn compile_prompt(persona: &str, context: &AssembledContext, message: &str) -> Vec<PromptTurn> {
    let mut prompt = Vec::with_capacity(context.len() + 2);
    prompt.push(PromptTurn::system(persona));
    prompt.extend(context.preference_directive.iter().cloned());
    prompt.extend(context.history.iter().cloned());
    prompt.push(PromptTurn::user(message));
    prompt
}
