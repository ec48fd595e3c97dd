//! The reply engine: bounded completion rounds with tool execution.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::json;
use tracing::{debug, error, info, warn};

use chime_types::bot::{Bot, BotPatch};
use chime_types::error::RepositoryError;
use chime_types::job::{Job, JobKind};
use chime_types::llm::{ChatMessage, CompletionRequest, LlmError, ToolCallRequest};

use crate::delivery::{DeliveryTransport, MediaSource};
use crate::engagement::strip_code_fences;
use crate::llm::{CompletionClient, ImageClient};
use crate::persistence::PersistenceGateway;
use crate::scheduler::{JobScheduler, parse_due_date};

use super::prompt::{CLOSING_INSTRUCTION, build_system_prompt};
use super::tools::{EngagementBand, ToolCall, tool_specs};

/// Maximum completion rounds before the loop forces a plain-text close.
pub const MAX_ROUNDS: usize = 5;

/// Errors from reply generation.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("bot has no API credential configured")]
    MissingCredential,

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("collaborator returned an empty reply")]
    EmptyReply,
}

/// Orchestrates the tool-augmented reply loop for a bot.
pub struct ReplyEngine<P, D, L, I> {
    gateway: Arc<P>,
    transport: Arc<D>,
    llm: Arc<L>,
    images: Arc<I>,
    scheduler: Arc<JobScheduler<P, D>>,
}

impl<P, D, L, I> ReplyEngine<P, D, L, I>
where
    P: PersistenceGateway + 'static,
    D: DeliveryTransport + 'static,
    L: CompletionClient,
    I: ImageClient,
{
    pub fn new(
        gateway: Arc<P>,
        transport: Arc<D>,
        llm: Arc<L>,
        images: Arc<I>,
        scheduler: Arc<JobScheduler<P, D>>,
    ) -> Self {
        Self {
            gateway,
            transport,
            llm,
            images,
            scheduler,
        }
    }

    /// Produce a display-ready reply for the given history.
    ///
    /// Fails fast when the bot carries no credential; all other collaborator
    /// errors propagate after logging. The caller supplies its own fallback
    /// text -- there is none here.
    pub async fn generate(
        &self,
        bot: &Bot,
        history: Vec<ChatMessage>,
    ) -> Result<String, ReplyError> {
        if bot.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ReplyError::MissingCredential);
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(build_system_prompt(bot, Utc::now())));
        messages.extend(history);

        for round in 0..MAX_ROUNDS {
            let request = CompletionRequest {
                model: bot.model.clone(),
                messages: messages.clone(),
                tools: tool_specs(),
                temperature: None,
                max_tokens: None,
                response_format: None,
            };

            let response = self.llm.complete(&request).await.inspect_err(|e| {
                error!(bot = %bot.name, round, error = %e, "completion failed");
            })?;

            if !response.has_tool_calls() {
                let content = response.content.unwrap_or_default();
                if content.is_empty() {
                    return Err(ReplyError::EmptyReply);
                }
                return Ok(extract_display_text(&content));
            }

            info!(
                bot = %bot.name,
                round,
                tools = response.tool_calls.len(),
                "executing requested tools"
            );

            let calls = response.tool_calls.clone();
            messages.push(ChatMessage::Assistant {
                content: response.content,
                tool_calls: calls.clone(),
            });

            // Tools within one round run concurrently; results are appended
            // in request order so the conversation stays deterministic.
            let results = join_all(calls.iter().map(|call| self.execute_tool(bot, call))).await;
            for (call, result) in calls.iter().zip(results) {
                messages.push(ChatMessage::Tool {
                    call_id: call.id.clone(),
                    content: result.to_string(),
                });
            }
        }

        // Budget exhausted with tools still in play: force a tool-free,
        // plain-text close summarizing the actions taken.
        debug!(bot = %bot.name, "iteration budget exhausted, forcing plain-text close");
        messages.push(ChatMessage::system(CLOSING_INSTRUCTION));

        let request = CompletionRequest::text(bot.model.clone(), messages);
        let response = self.llm.complete(&request).await.inspect_err(|e| {
            error!(bot = %bot.name, error = %e, "closing completion failed");
        })?;

        let content = response.content.unwrap_or_default();
        if content.is_empty() {
            return Err(ReplyError::EmptyReply);
        }
        Ok(extract_display_text(&content))
    }

    /// Run one tool invocation, converting every failure into a structured
    /// `{success: false, error}` result so the loop never aborts on a tool.
    async fn execute_tool(&self, bot: &Bot, request: &ToolCallRequest) -> serde_json::Value {
        let call = match ToolCall::parse(request) {
            Ok(call) => call,
            Err(e) => {
                warn!(bot = %bot.name, tool = %request.name, error = %e, "tool call rejected");
                return json!({ "success": false, "error": e.to_string() });
            }
        };

        debug!(bot = %bot.name, tool = call.name(), "executing tool");
        match call {
            ToolCall::CreateTask(args) => self.create_task(bot, args).await,
            ToolCall::ChangeEngagementFactor(args) => {
                self.change_engagement_factor(bot, args).await
            }
            ToolCall::GetCurrentEngagement => self.get_current_engagement(bot).await,
            ToolCall::GenerateImage(args) => self.generate_image(bot, args).await,
        }
    }

    async fn create_task(
        &self,
        bot: &Bot,
        args: super::tools::CreateTaskArgs,
    ) -> serde_json::Value {
        let due_at = match parse_due_date(&args.date) {
            Ok(due_at) => due_at,
            Err(e) => return json!({ "success": false, "error": e.to_string() }),
        };

        let job = Job::new(JobKind::Text, args.message, due_at, Some(bot.id));
        if let Err(e) = self.gateway.create_job(&job).await {
            return json!({ "success": false, "error": format!("could not persist task: {e}") });
        }
        self.scheduler.schedule(&job);

        info!(bot = %bot.name, job_id = %job.id, due_at = %due_at, "task created");
        json!({
            "success": true,
            "jobId": job.id,
            "scheduledFor": due_at.to_rfc3339(),
        })
    }

    async fn change_engagement_factor(
        &self,
        bot: &Bot,
        args: super::tools::ChangeEngagementFactorArgs,
    ) -> serde_json::Value {
        let patch = BotPatch {
            engagement_factor: Some(args.engagement_factor),
            ..Default::default()
        };
        if let Err(e) = patch.validate() {
            return json!({ "success": false, "error": e.to_string() });
        }
        if let Err(e) = self.gateway.update_bot(bot.id, &patch).await {
            return json!({ "success": false, "error": format!("could not persist factor: {e}") });
        }

        info!(
            bot = %bot.name,
            factor = args.engagement_factor,
            reason = args.reason.as_deref().unwrap_or("none given"),
            "engagement factor changed"
        );
        json!({
            "success": true,
            "engagementFactor": args.engagement_factor,
            "band": EngagementBand::from_factor(args.engagement_factor).to_string(),
        })
    }

    async fn get_current_engagement(&self, bot: &Bot) -> serde_json::Value {
        // Fresh read: a previous call in this reply may have changed it.
        let factor = match self.gateway.get_bot(bot.id).await {
            Ok(Some(current)) => current.engagement_factor,
            Ok(None) => bot.engagement_factor,
            Err(e) => {
                return json!({ "success": false, "error": format!("could not read factor: {e}") });
            }
        };

        json!({
            "success": true,
            "engagementFactor": factor,
            "band": EngagementBand::from_factor(factor).to_string(),
        })
    }

    async fn generate_image(
        &self,
        bot: &Bot,
        args: super::tools::GenerateImageArgs,
    ) -> serde_json::Value {
        let url = match self.images.generate(&args.prompt).await {
            Ok(url) => url,
            Err(e) => return json!({ "success": false, "error": e.to_string() }),
        };

        // Delivery to the linked chat is a side effect of the tool, not part
        // of the textual reply.
        let mut delivered = false;
        if let Some(chat_id) = bot.linked_chat_id.as_deref().filter(|c| !c.is_empty()) {
            match self
                .transport
                .send_photo(chat_id, &MediaSource::Url(url.clone()))
                .await
            {
                Ok(()) => delivered = true,
                Err(e) => {
                    warn!(bot = %bot.name, error = %e, "generated image could not be delivered");
                }
            }
        }

        json!({ "success": true, "url": url, "delivered": delivered })
    }
}

/// Callers always receive display-ready text: a JSON object with a string
/// `message` field is unwrapped, anything else is returned verbatim.
pub fn extract_display_text(content: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) =
        serde_json::from_str::<serde_json::Value>(strip_code_fences(content))
    {
        if let Some(serde_json::Value::String(message)) = map.get("message") {
            return message.clone();
        }
    }
    content.to_string()
}
