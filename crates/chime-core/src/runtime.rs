//! Bot runtime: the host-facing lifecycle and inbound-message pipeline.
//!
//! `BotRuntime` binds one bot to its collaborators and exposes the two hooks
//! the host process consumes: `initialize` (startup recovery scan plus the
//! periodic reconcile timer) and `shutdown` (stops the reconcile timer and
//! all live job timers). Inbound messages flow persist -> engagement gate ->
//! context -> reply loop -> persist -> deliver.

use std::sync::Arc;

use tracing::{info, warn};

use chime_types::bot::{Bot, BotId};
use chime_types::error::{DeliveryError, RepositoryError};
use chime_types::message::StoredMessage;

use crate::context;
use crate::delivery::DeliveryTransport;
use crate::engagement::EngagementEngine;
use crate::llm::{CompletionClient, ImageClient};
use crate::persistence::PersistenceGateway;
use crate::reply::{ReplyEngine, ReplyError};
use crate::scheduler::{JobScheduler, RECONCILE_INTERVAL, SchedulerError};

/// Errors from the runtime pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown bot {0}")]
    UnknownBot(BotId),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("reply error: {0}")]
    Reply(#[from] ReplyError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// One bot wired to its collaborators.
///
/// The scheduler is shared: when the host runs several bots it passes the
/// same `Arc<JobScheduler>` to each runtime, and calling `initialize` more
/// than once is safe (scheduling is idempotent and the reconcile timer is
/// replaced, not duplicated).
pub struct BotRuntime<P, D, L, I> {
    bot_id: BotId,
    gateway: Arc<P>,
    transport: Arc<D>,
    scheduler: Arc<JobScheduler<P, D>>,
    engagement: EngagementEngine<P, L>,
    reply: ReplyEngine<P, D, L, I>,
}

impl<P, D, L, I> BotRuntime<P, D, L, I>
where
    P: PersistenceGateway + 'static,
    D: DeliveryTransport + 'static,
    L: CompletionClient,
    I: ImageClient,
{
    pub fn new(
        bot_id: BotId,
        gateway: Arc<P>,
        transport: Arc<D>,
        llm: Arc<L>,
        images: Arc<I>,
        scheduler: Arc<JobScheduler<P, D>>,
    ) -> Self {
        let engagement = EngagementEngine::new(gateway.clone(), llm.clone());
        let reply = ReplyEngine::new(
            gateway.clone(),
            transport.clone(),
            llm,
            images,
            scheduler.clone(),
        );
        Self {
            bot_id,
            gateway,
            transport,
            scheduler,
            engagement,
            reply,
        }
    }

    pub fn bot_id(&self) -> BotId {
        self.bot_id
    }

    /// Startup hook: recover persisted jobs and arm the periodic reconcile.
    pub async fn initialize(&self) -> Result<(), RuntimeError> {
        let recovered = self.scheduler.recover_on_startup().await?;
        self.scheduler.start(RECONCILE_INTERVAL);
        info!(bot = %self.bot_id, jobs = recovered, "runtime initialized");
        Ok(())
    }

    /// Shutdown hook: stop the reconcile timer and every live job timer.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        info!(bot = %self.bot_id, "runtime shut down");
    }

    /// Handle one inbound chat message.
    ///
    /// Returns the generated reply text, or `None` when the engagement gate
    /// decided to stay silent. Reply-generation failures propagate so the
    /// host can supply its own user-facing fallback.
    pub async fn handle_inbound(
        &self,
        text: &str,
        sender_name: Option<String>,
    ) -> Result<Option<String>, RuntimeError> {
        let bot = self
            .gateway
            .get_bot(self.bot_id)
            .await?
            .ok_or(RuntimeError::UnknownBot(self.bot_id))?;

        self.gateway
            .create_message(&StoredMessage::user(bot.id, text, sender_name))
            .await?;

        if !self.engagement.should_respond(&bot, text).await {
            return Ok(None);
        }

        let history = context::build_history(self.gateway.as_ref(), &bot, context::HISTORY_LIMIT)
            .await?;
        let reply = self.reply.generate(&bot, history).await?;

        self.gateway
            .create_message(&StoredMessage::assistant(bot.id, reply.clone()))
            .await?;

        self.deliver(&bot, &reply).await;
        Ok(Some(reply))
    }

    async fn deliver(&self, bot: &Bot, reply: &str) {
        let Some(chat_id) = bot.linked_chat_id.as_deref().filter(|c| !c.is_empty()) else {
            warn!(bot = %bot.name, "reply generated but no chat is linked");
            return;
        };
        if let Err(e) = self.transport.send_text(chat_id, reply).await {
            warn!(bot = %bot.name, error = %e, "reply could not be delivered");
        }
    }
}
