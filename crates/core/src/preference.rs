//! User preference hints consumed by context assembly.

use serde::{Deserialize, Serialize};

use crate::message::OwnerId;

fn default_style() -> String {
    "balanced".into()
}

fn default_true() -> bool {
    true
}

/// Read-only hints about how a user likes to be answered.
///
/// A missing record is never an error: [`UserPreference::default_for`]
/// stands in for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    pub owner_id: OwnerId,

    /// Free-form style hint, e.g. "concise" or "detailed"
    #[serde(default = "default_style")]
    pub response_style: String,

    /// Topics the user cares about
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topic_interests: Vec<String>,

    /// Whether a preference directive is added to prompts at all
    #[serde(default = "default_true")]
    pub personalization_enabled: bool,

    /// Whether interests from the rest of the workspace are woven in
    #[serde(default)]
    pub cross_context_enabled: bool,
}

impl UserPreference {
    /// The preference substituted when the store has none for `owner_id`.
    pub fn default_for(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            response_style: default_style(),
            topic_interests: Vec::new(),
            personalization_enabled: true,
            cross_context_enabled: false,
        }
    }
}
