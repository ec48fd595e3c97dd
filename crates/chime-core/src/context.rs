//! Conversation context builder.
//!
//! Renders persisted history into prompt-ready structures. Each turn becomes
//! a JSON envelope carrying timestamp, author label, and content, giving the
//! LLM collaborator explicit temporal and speaker grounding rather than a
//! flat transcript.

use serde_json::json;
use tracing::debug;

use chime_types::bot::Bot;
use chime_types::error::RepositoryError;
use chime_types::llm::{ChatMessage, MessageRole};
use chime_types::message::StoredMessage;

use crate::persistence::PersistenceGateway;

/// Default history window for reply generation.
pub const HISTORY_LIMIT: u32 = 100;

/// Render one stored turn as its prompt envelope:
/// `{"timestamp": ..., "name": ..., "message": ...}`.
///
/// The author label is the sender's name when recorded, the bot's name for
/// assistant turns, and a generic fallback otherwise.
pub fn render_envelope(bot_name: &str, message: &StoredMessage) -> String {
    let name = match &message.sender_name {
        Some(name) if !name.is_empty() => name.clone(),
        _ if message.role == MessageRole::Assistant => bot_name.to_string(),
        _ => "User".to_string(),
    };

    json!({
        "timestamp": message.created_at.to_rfc3339(),
        "name": name,
        "message": message.content,
    })
    .to_string()
}

/// Map stored turns (chronological) onto typed chat messages with envelope
/// content.
pub fn to_chat_messages(bot: &Bot, messages: &[StoredMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| {
            let envelope = render_envelope(&bot.name, m);
            match m.role {
                MessageRole::System => ChatMessage::system(envelope),
                MessageRole::Assistant => ChatMessage::assistant(envelope),
                // Persisted tool turns re-enter the window as user-visible
                // context, not as live tool results.
                MessageRole::User | MessageRole::Tool => ChatMessage::user(envelope),
            }
        })
        .collect()
}

/// Fetch the last `limit` turns for a bot in chronological order and render
/// them as typed envelope messages.
pub async fn build_history<P: PersistenceGateway>(
    gateway: &P,
    bot: &Bot,
    limit: u32,
) -> Result<Vec<ChatMessage>, RepositoryError> {
    let mut recent = gateway.find_recent_messages(bot.id, limit).await?;
    // Gateway returns newest first; the prompt wants oldest first.
    recent.reverse();

    debug!(bot = %bot.name, turns = recent.len(), "built conversation context");
    Ok(to_chat_messages(bot, &recent))
}
