//! Engagement analysis result returned by the LLM collaborator.

use serde::{Deserialize, Serialize};

/// The collaborator's judgment on whether a bot should join a conversation.
///
/// Deserialization is defensive: a missing or mistyped `shouldEngage` is
/// treated as false, `reason` falls back to a placeholder, and `relevance`
/// defaults to zero. Malformed analyses must never produce engagement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementAnalysis {
    #[serde(rename = "shouldEngage", default)]
    pub should_engage: bool,
    #[serde(default = "default_reason")]
    pub reason: String,
    /// LLM-judged pertinence of engaging, in [0,1].
    #[serde(default)]
    pub relevance: f64,
}

fn default_reason() -> String {
    "No reason provided".to_string()
}

impl EngagementAnalysis {
    /// The silent analysis used when the collaborator call or parse fails.
    pub fn declined(reason: impl Into<String>) -> Self {
        Self {
            should_engage: false,
            reason: reason.into(),
            relevance: 0.0,
        }
    }
}
