//! Context assembly: bounds prior turns and shapes preference hints.
//!
//! The assembler never performs I/O. It is handed whatever history the
//! repository returned and keeps only the most recent `window` entries,
//! oldest first, so a repository that over-delivers cannot widen the prompt.
//!
//! # Determinism
//!
//! Identical inputs always produce identical outputs. No random or
//! time-dependent logic is used during assembly.

use mindkeep_core::language_model::PromptTurn;
use mindkeep_core::message::Message;
use mindkeep_core::preference::UserPreference;

// ── Types ─────────────────────────────────────────────────────────────────

/// Default number of prior messages replayed to the model.
pub const DEFAULT_WINDOW: usize = 6;

/// The reusable context block placed between the persona and the new message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    /// A synthetic system turn summarizing style and interests, if any.
    pub preference_directive: Option<PromptTurn>,

    /// At most `window` prior turns, oldest first.
    pub history: Vec<PromptTurn>,
}

impl AssembledContext {
    /// Total turns this block contributes to a prompt.
    pub fn len(&self) -> usize {
        self.history.len() + usize::from(self.preference_directive.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    window: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ContextAssembler {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Assemble the context block from an oldest-first history slice.
    pub fn assemble(
        &self,
        history: &[Message],
        preference: Option<&UserPreference>,
    ) -> AssembledContext {
        let start = history.len().saturating_sub(self.window);
        let history = history[start..]
            .iter()
            .map(|m| PromptTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();

        AssembledContext {
            preference_directive: preference.and_then(Self::preference_directive),
            history,
        }
    }

    fn preference_directive(preference: &UserPreference) -> Option<PromptTurn> {
        if !preference.personalization_enabled {
            return None;
        }

        let mut directive = format!(
            "User preference: respond in a {} style.",
            preference.response_style.trim()
        );
        if preference.cross_context_enabled && !preference.topic_interests.is_empty() {
            directive.push_str(" Where relevant, connect the answer to their interests: ");
            directive.push_str(&preference.topic_interests.join(", "));
            directive.push('.');
        }

        Some(PromptTurn::system(directive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindkeep_core::message::{ConversationId, MessageMetadata, OwnerId, Role};

    // ── Helpers ────────────────────────────────────────────────────────

    fn history(n: usize) -> Vec<Message> {
        let conv = ConversationId::from("c1");
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new(conv.clone(), role, format!("turn {i}"), MessageMetadata::default())
            })
            .collect()
    }

    fn preference() -> UserPreference {
        UserPreference::default_for(OwnerId::from("u1"))
    }

    #[test]
    fn window_keeps_most_recent_oldest_first() {
        let ctx = ContextAssembler::new(3).assemble(&history(10), None);
        let contents: Vec<_> = ctx.history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 7", "turn 8", "turn 9"]);
    }

    #[test]
    fn never_exceeds_window_for_any_length() {
        let assembler = ContextAssembler::new(DEFAULT_WINDOW);
        for n in 0..40 {
            let ctx = assembler.assemble(&history(n), None);
            assert_eq!(ctx.history.len(), n.min(DEFAULT_WINDOW));
        }
    }

    #[test]
    fn stored_roles_are_kept() {
        let ctx = ContextAssembler::new(2).assemble(&history(4), None);
        assert_eq!(ctx.history[0].role, Role::User);
        assert_eq!(ctx.history[1].role, Role::Assistant);
    }

    #[test]
    fn empty_history_without_preference_is_empty() {
        let ctx = ContextAssembler::default().assemble(&[], None);
        assert!(ctx.is_empty());
    }

    #[test]
    fn directive_names_style() {
        let mut pref = preference();
        pref.response_style = "concise".into();
        let ctx = ContextAssembler::default().assemble(&[], Some(&pref));

        let directive = ctx.preference_directive.unwrap();
        assert_eq!(directive.role, Role::System);
        assert!(directive.content.contains("concise"));
        assert!(!directive.content.contains("interests"));
    }

    #[test]
    fn interests_need_cross_context() {
        let mut pref = preference();
        pref.topic_interests = vec!["hiring".into(), "OKRs".into()];

        let without = ContextAssembler::default().assemble(&[], Some(&pref));
        assert!(!without.preference_directive.unwrap().content.contains("hiring"));

        pref.cross_context_enabled = true;
        let with = ContextAssembler::default().assemble(&[], Some(&pref));
        assert!(with.preference_directive.unwrap().content.contains("hiring, OKRs"));
    }

    #[test]
    fn personalization_off_drops_directive() {
        let mut pref = preference();
        pref.personalization_enabled = false;
        let ctx = ContextAssembler::default().assemble(&history(2), Some(&pref));
        assert!(ctx.preference_directive.is_none());
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn deterministic_assembly() {
        let h = history(9);
        let pref = preference();
        let assembler = ContextAssembler::new(4);
        assert_eq!(assembler.assemble(&h, Some(&pref)), assembler.assemble(&h, Some(&pref)));
    }
}
