//! Chime daemon entry point.
//!
//! Binary name: `chimed`
//!
//! Initializes tracing and application state, runs startup recovery, then
//! listens for Telegram updates and routes each message to the runtime of
//! the bot linked to that chat. Stops on ctrl-c and runs the shutdown hooks.

mod state;

use std::sync::Arc;

use anyhow::Context;
use teloxide::prelude::*;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let token = std::env::var("TELEGRAM_TOKEN")
        .context("TELEGRAM_TOKEN must be set to run the daemon")?;
    let bot = Bot::new(&token);

    let state = Arc::new(AppState::init(bot.clone()).await?);
    state.initialize().await?;

    if state.runtimes.is_empty() {
        info!("no bots are linked to a chat yet; the scheduler and listener will idle");
    } else {
        info!(bots = state.runtimes.len(), "daemon ready");
    }

    let handler_state = state.clone();
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let state = handler_state.clone();
        async move {
            let Some(text) = msg.text() else {
                return Ok(());
            };

            let chat_key = msg.chat.id.0.to_string();
            let Some(runtime) = state.runtimes.get(&chat_key) else {
                debug!(chat = %chat_key, "no bot linked to this chat, ignoring message");
                return Ok(());
            };

            let sender = msg.from.as_ref().map(|user| user.first_name.clone());
            match runtime.handle_inbound(text, sender).await {
                Ok(Some(_)) | Ok(None) => {}
                Err(e) => {
                    error!(chat = %chat_key, error = %e, "failed to handle message");
                    // The core has no fallback text of its own; the host
                    // supplies the user-facing apology.
                    let _ = bot
                        .send_message(msg.chat.id, "Sorry, I had trouble processing your message.")
                        .await;
                }
            }
            Ok(())
        }
    })
    .await;

    state.shutdown();
    info!("shutdown complete");
    Ok(())
}
