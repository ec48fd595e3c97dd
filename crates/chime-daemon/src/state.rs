//! Application state wiring the core to its concrete adapters.
//!
//! AppState pins the generic runtimes to the infra implementations: SQLite
//! gateway, Telegram transport, and an OpenAI client per bot (each bot
//! carries its own credential).

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use teloxide::Bot;
use tracing::{info, warn};

use chime_core::runtime::{BotRuntime, RuntimeError};
use chime_core::scheduler::JobScheduler;
use chime_infra::llm::OpenAiClient;
use chime_infra::sqlite::{DatabasePool, SqliteGateway};
use chime_infra::telegram::TelegramTransport;

/// Concrete type aliases for the core generics pinned to infra
/// implementations.
pub type ConcreteScheduler = JobScheduler<SqliteGateway, TelegramTransport>;
pub type ConcreteRuntime =
    BotRuntime<SqliteGateway, TelegramTransport, OpenAiClient, OpenAiClient>;

/// Shared application state: one runtime per linked bot, keyed by the
/// chat id its messages arrive from.
pub struct AppState {
    pub gateway: Arc<SqliteGateway>,
    pub scheduler: Arc<ConcreteScheduler>,
    pub runtimes: HashMap<String, Arc<ConcreteRuntime>>,
}

impl AppState {
    /// Initialize the application state: connect to the database and wire a
    /// runtime for every active bot with a linked chat.
    pub async fn init(bot_client: Bot) -> anyhow::Result<Self> {
        let data_dir = std::env::var("CHIME_DATA_DIR").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            format!("{home}/.chime")
        });
        tokio::fs::create_dir_all(&data_dir).await?;

        let db_url = format!("sqlite://{data_dir}/chime.db?mode=rwc");
        let pool = DatabasePool::new(&db_url).await?;
        let gateway = Arc::new(SqliteGateway::new(pool));
        let transport = Arc::new(TelegramTransport::from_bot(bot_client));
        let scheduler = Arc::new(JobScheduler::new(gateway.clone(), transport.clone()));

        let mut runtimes = HashMap::new();
        for bot in gateway.list_active_bots().await? {
            let Some(chat_id) = bot.linked_chat_id.clone().filter(|c| !c.is_empty()) else {
                warn!(bot = %bot.name, "bot has no linked chat, skipping");
                continue;
            };

            // Each bot talks to the LLM with its own credential; the same
            // client serves completions and image generation.
            let llm = Arc::new(OpenAiClient::new(SecretString::from(
                bot.api_key.clone().unwrap_or_default(),
            )));
            let runtime = BotRuntime::new(
                bot.id,
                gateway.clone(),
                transport.clone(),
                llm.clone(),
                llm,
                scheduler.clone(),
            );

            info!(bot = %bot.name, chat = %chat_id, "runtime wired");
            runtimes.insert(chat_id, Arc::new(runtime));
        }

        Ok(Self {
            gateway,
            scheduler,
            runtimes,
        })
    }

    /// Run each runtime's startup hook. Safe across runtimes sharing the
    /// scheduler: recovery scheduling is idempotent per job id and the
    /// reconcile timer is replaced rather than duplicated.
    pub async fn initialize(&self) -> Result<(), RuntimeError> {
        for runtime in self.runtimes.values() {
            runtime.initialize().await?;
        }
        Ok(())
    }

    /// Run the shutdown hooks: stops the reconcile timer and all job timers.
    pub fn shutdown(&self) {
        for runtime in self.runtimes.values() {
            runtime.shutdown();
        }
    }
}
