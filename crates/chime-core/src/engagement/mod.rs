//! Engagement decision engine.
//!
//! Decides, per inbound message, whether a bot should reply on its own:
//! a direct mention engages unconditionally; otherwise a cached, LLM-backed
//! analysis of the recent window is gated by the bot's engagement factor.
//! Every failure path resolves to silence, never to unwanted noise.

pub mod cache;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use chime_types::bot::Bot;
use chime_types::engagement::EngagementAnalysis;
use chime_types::llm::{ChatMessage, CompletionRequest, LlmError, ResponseFormat};

use crate::context;
use crate::llm::CompletionClient;
use crate::persistence::PersistenceGateway;

use cache::EngagementCache;

/// Model used for engagement analysis, independent of the bot's chat model.
pub const ANALYSIS_MODEL: &str = "gpt-4o";

/// How many recent turns are loaded for analysis.
const HISTORY_WINDOW: u32 = 10;

/// How many of those turns feed the analysis prompt.
const ANALYSIS_WINDOW: usize = 8;

/// How many trailing envelopes make up the cache key.
const CACHE_KEY_WINDOW: usize = 5;

/// Stateful engagement gate for one or more bots.
pub struct EngagementEngine<P, L> {
    gateway: Arc<P>,
    llm: Arc<L>,
    cache: EngagementCache,
    rng: Mutex<StdRng>,
}

impl<P, L> EngagementEngine<P, L>
where
    P: PersistenceGateway,
    L: CompletionClient,
{
    pub fn new(gateway: Arc<P>, llm: Arc<L>) -> Self {
        Self::with_parts(gateway, llm, EngagementCache::new(), StdRng::from_entropy())
    }

    /// Construct with an explicit cache and RNG (used by tests to pin TTL
    /// and seed).
    pub fn with_parts(
        gateway: Arc<P>,
        llm: Arc<L>,
        cache: EngagementCache,
        rng: StdRng,
    ) -> Self {
        Self {
            gateway,
            llm,
            cache,
            rng: Mutex::new(rng),
        }
    }

    /// Decide whether the bot should reply to this message.
    ///
    /// Errors anywhere along the way (storage, collaborator, parsing) make
    /// this return false.
    pub async fn should_respond(&self, bot: &Bot, message_text: &str) -> bool {
        // Fast path: a direct mention engages without consulting the LLM.
        if mentions_name(&bot.name, message_text) {
            info!(bot = %bot.name, "engaging due to direct mention");
            return true;
        }

        let mut recent = match self
            .gateway
            .find_recent_messages(bot.id, HISTORY_WINDOW)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(bot = %bot.name, error = %e, "history lookup failed, staying silent");
                return false;
            }
        };
        if recent.is_empty() {
            return false;
        }
        recent.reverse();

        let envelopes: Vec<String> = recent
            .iter()
            .map(|m| format!("{}: {}", m.role, context::render_envelope(&bot.name, m)))
            .collect();

        let key = cache_key(bot, &envelopes);
        if let Some(entry) = self.cache.get(&key) {
            debug!(bot = %bot.name, reason = %entry.reason, "using cached engagement decision");
            return entry.decision;
        }

        let analysis = match self.analyze(bot, &envelopes).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(bot = %bot.name, error = %e, "engagement analysis failed");
                EngagementAnalysis::declined(format!("Analysis failed: {e}"))
            }
        };

        let decision = self.gate(bot, &analysis);
        // Failed analyses are cached too, rate-limiting retries against an
        // unhealthy collaborator for the TTL window.
        self.cache.insert(key, decision, analysis.reason.clone());

        if decision {
            info!(bot = %bot.name, reason = %analysis.reason, relevance = analysis.relevance, "engaging");
        } else {
            info!(bot = %bot.name, reason = %analysis.reason, "not engaging");
        }
        decision
    }

    /// Convert the binary analysis into the bot's probabilistic decision:
    /// maximal relevance engages unconditionally, anything less engages with
    /// probability `engagement_factor`.
    fn gate(&self, bot: &Bot, analysis: &EngagementAnalysis) -> bool {
        if !analysis.should_engage {
            return false;
        }
        if analysis.relevance >= 1.0 {
            return true;
        }
        let draw: f64 = self
            .rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .gen_range(0.0..1.0);
        draw < bot.engagement_factor
    }

    async fn analyze(
        &self,
        bot: &Bot,
        envelopes: &[String],
    ) -> Result<EngagementAnalysis, LlmError> {
        let start = envelopes.len().saturating_sub(ANALYSIS_WINDOW);
        let conversation = envelopes[start..].join("\n");

        let request = CompletionRequest {
            model: ANALYSIS_MODEL.to_string(),
            messages: vec![
                ChatMessage::system(
                    "You are a conversation analysis agent. Respond with ONLY valid JSON - \
                     no markdown formatting, no code blocks, just pure JSON.",
                ),
                ChatMessage::user(analysis_prompt(&bot.name, &bot.context, &conversation)),
            ],
            tools: Vec::new(),
            temperature: Some(0.3),
            max_tokens: Some(200),
            response_format: Some(ResponseFormat::JsonObject),
        };

        let response = self.llm.complete(&request).await?;
        let content = response
            .content
            .ok_or_else(|| LlmError::Deserialization("empty analysis response".to_string()))?;

        Ok(parse_analysis(&content))
    }
}

/// Whether the text contains the bot's name as a whole word,
/// case-insensitively.
pub fn mentions_name(name: &str, text: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    match regex::Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))) {
        Ok(re) => re.is_match(text),
        // Escaped names always compile; if that ever changes, degrade to a
        // plain case-insensitive substring check.
        Err(_) => text.to_lowercase().contains(&name.to_lowercase()),
    }
}

/// Cache key over the agent and the trailing window of formatted turns.
fn cache_key(bot: &Bot, envelopes: &[String]) -> String {
    let start = envelopes.len().saturating_sub(CACHE_KEY_WINDOW);
    let mut hasher = DefaultHasher::new();
    for envelope in &envelopes[start..] {
        envelope.hash(&mut hasher);
    }
    format!("{}:{:016x}", bot.id, hasher.finish())
}

fn analysis_prompt(bot_name: &str, bot_context: &str, conversation: &str) -> String {
    format!(
        r#"You are a conversation analysis agent. Your job is to determine if a bot named "{bot_name}" should engage in this conversation.

CONVERSATION CONTEXT:
{conversation}
BOT CONTEXT:
{bot_context}

ANALYSIS CRITERIA:
- Direct mentions of the bot name
- Unanswered questions targeting the bot or general requests for help
- Conversation lulls where engagement would be valuable
- Topics the bot could meaningfully contribute to
- Whether the conversation needs assistance or guidance
- If there's a natural opportunity for the bot to add value

RESPONSE FORMAT:
Respond with a JSON object containing:
{{
  "shouldEngage": true/false,
  "reason": "Brief explanation of why the bot should or shouldn't engage",
  "relevance": How relevant the engagement is to the conversation regarding the bot context (0.0-1.0)
}}

Be concise but specific in your reasoning. Consider the conversation flow, timing, and context."#
    )
}

/// Strip an optional Markdown code fence wrapper from collaborator output.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse an analysis response defensively; unparseable content declines.
fn parse_analysis(content: &str) -> EngagementAnalysis {
    serde_json::from_str(strip_code_fences(content))
        .unwrap_or_else(|_| EngagementAnalysis::declined("Failed to parse analysis response"))
}
