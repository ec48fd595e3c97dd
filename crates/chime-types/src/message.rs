//! Persisted conversation turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bot::BotId;
use crate::llm::MessageRole;

/// A single persisted conversation turn for a bot.
///
/// Immutable once created (except deletion); ordering is by `created_at`.
/// `sender_name` carries the human sender's display name for user turns and
/// is empty for assistant/system turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub bot_id: BotId,
    pub role: MessageRole,
    pub content: String,
    pub sender_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Build a user turn from an inbound chat message.
    pub fn user(bot_id: BotId, content: impl Into<String>, sender_name: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            bot_id,
            role: MessageRole::User,
            content: content.into(),
            sender_name,
            created_at: Utc::now(),
        }
    }

    /// Build an assistant turn from a generated reply.
    pub fn assistant(bot_id: BotId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            bot_id,
            role: MessageRole::Assistant,
            content: content.into(),
            sender_name: None,
            created_at: Utc::now(),
        }
    }
}
