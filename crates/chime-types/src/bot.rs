use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Unique identifier for a bot, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotId(pub Uuid);

impl BotId {
    /// Create a new BotId using UUID v7 (time-sortable, guaranteed ordering).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a BotId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for BotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A configured conversational agent.
///
/// Each bot carries its own LLM credential and model, a long-lived context
/// text injected into every prompt, an engagement factor governing how often
/// it speaks unprompted, and an optional linked delivery target (the chat it
/// sends to).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    /// Display name; also what users mention to address the bot directly.
    pub name: String,
    /// Model identifier used by the reply loop.
    pub model: String,
    /// Per-bot LLM credential. Absent means the bot cannot generate replies.
    pub api_key: Option<String>,
    /// Long-lived persona/context text prepended to prompts.
    pub context: String,
    /// Summaries of uploaded documents, appended to the system prompt.
    pub document_notes: Vec<String>,
    /// Probability in [0,1] of engaging when relevance is below maximum.
    pub engagement_factor: f64,
    /// Delivery target (chat identifier) for outbound messages, if linked.
    pub linked_chat_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bot {
    /// Whether this bot has a usable delivery target.
    pub fn has_delivery_target(&self) -> bool {
        self.linked_chat_id.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Partial update for a bot record. `None` fields are left untouched.
///
/// `linked_chat_id` is doubly optional: the outer `Option` is "change or
/// not", the inner one is the new value (including unlinking with `None`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotPatch {
    pub name: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<Option<String>>,
    pub context: Option<String>,
    pub document_notes: Option<Vec<String>>,
    pub engagement_factor: Option<f64>,
    pub linked_chat_id: Option<Option<String>>,
    pub active: Option<bool>,
}

impl BotPatch {
    /// Validate the patch at the mutation boundary.
    ///
    /// The engagement factor must lie in [0,1]; anything else is rejected
    /// before the patch reaches storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(factor) = self.engagement_factor {
            if !(0.0..=1.0).contains(&factor) {
                return Err(ValidationError::EngagementFactorOutOfRange(factor));
            }
        }
        Ok(())
    }
}
