//! TelegramTransport -- concrete [`DeliveryTransport`] over the Telegram
//! Bot API via teloxide.

use std::path::PathBuf;

use teloxide::Bot;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, InputFile};
use tracing::debug;

use chime_core::delivery::{DeliveryTransport, MediaSource};
use chime_types::error::DeliveryError;

/// Telegram-backed delivery transport.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Wrap an existing bot client (shared with the update listener).
    pub fn from_bot(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Delivery targets are stringly-typed chat ids; Telegram wants them numeric.
fn parse_chat_id(target: &str) -> Result<ChatId, DeliveryError> {
    target
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| DeliveryError::InvalidTarget(target.to_string()))
}

fn input_file(source: &MediaSource) -> Result<InputFile, DeliveryError> {
    match source {
        MediaSource::Path(path) => Ok(InputFile::file(PathBuf::from(path))),
        MediaSource::Url(raw) => {
            let url = url::Url::parse(raw)
                .map_err(|_| DeliveryError::InvalidTarget(raw.to_string()))?;
            Ok(InputFile::url(url))
        }
    }
}

impl DeliveryTransport for TelegramTransport {
    async fn send_text(&self, target: &str, text: &str) -> Result<(), DeliveryError> {
        let chat_id = parse_chat_id(target)?;
        debug!(%chat_id, chars = text.len(), "sending text");
        self.bot
            .send_message(chat_id, text)
            .await
            .map_err(|e| DeliveryError::Send(e.to_string()))?;
        Ok(())
    }

    async fn send_photo(&self, target: &str, source: &MediaSource) -> Result<(), DeliveryError> {
        let chat_id = parse_chat_id(target)?;
        self.bot
            .send_photo(chat_id, input_file(source)?)
            .await
            .map_err(|e| DeliveryError::Send(e.to_string()))?;
        Ok(())
    }

    async fn send_video(&self, target: &str, source: &MediaSource) -> Result<(), DeliveryError> {
        let chat_id = parse_chat_id(target)?;
        self.bot
            .send_video(chat_id, input_file(source)?)
            .await
            .map_err(|e| DeliveryError::Send(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_id() {
        assert_eq!(parse_chat_id("12345").unwrap(), ChatId(12345));
        assert_eq!(parse_chat_id("-100987").unwrap(), ChatId(-100987));
        assert!(parse_chat_id("not-a-chat").is_err());
    }

    #[test]
    fn test_input_file_rejects_bad_url() {
        let err = input_file(&MediaSource::Url("not a url".to_string())).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidTarget(_)));
    }

    #[test]
    fn test_input_file_accepts_path_and_url() {
        assert!(input_file(&MediaSource::Path("uploads/cat.png".to_string())).is_ok());
        assert!(input_file(&MediaSource::Url("https://img.example/x.png".to_string())).is_ok());
    }
}
