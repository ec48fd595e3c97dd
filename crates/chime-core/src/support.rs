//! In-memory mock collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use uuid::Uuid;

use chime_types::bot::{Bot, BotId, BotPatch};
use chime_types::error::{DeliveryError, RepositoryError};
use chime_types::job::{Job, JobPatch, MediaKind, MediaRecord};
use chime_types::llm::{CompletionRequest, CompletionResponse, LlmError, ToolCallRequest};
use chime_types::message::StoredMessage;

use crate::delivery::{DeliveryTransport, MediaSource};
use crate::llm::{CompletionClient, ImageClient};
use crate::persistence::PersistenceGateway;

/// A bot with a linked chat and a credential, ready for most tests.
pub fn test_bot() -> Bot {
    Bot {
        id: BotId::new(),
        name: "Luna".to_string(),
        model: "gpt-4o".to_string(),
        api_key: Some("sk-test".to_string()),
        context: "A friendly assistant for the test chat.".to_string(),
        document_notes: vec![],
        engagement_factor: 0.5,
        linked_chat_id: Some("12345".to_string()),
        active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// MockGateway
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockGateway {
    jobs: Mutex<HashMap<Uuid, Job>>,
    media: Mutex<Vec<MediaRecord>>,
    messages: Mutex<Vec<StoredMessage>>,
    bots: Mutex<HashMap<BotId, Bot>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub async fn insert_media(&self, record: MediaRecord) {
        self.media.lock().unwrap().push(record);
    }

    pub async fn insert_bot(&self, bot: Bot) {
        self.bots.lock().unwrap().insert(bot.id, bot);
    }

    pub async fn insert_message(&self, message: StoredMessage) {
        self.messages.lock().unwrap().push(message);
    }

    pub async fn stored_messages(&self) -> Vec<StoredMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl PersistenceGateway for MockGateway {
    async fn find_active_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.active)
            .cloned()
            .collect())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn create_job(&self, job: &Job) -> Result<(), RepositoryError> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job_id: Uuid, patch: &JobPatch) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(RepositoryError::NotFound)?;
        if let Some(active) = patch.active {
            job.active = active;
        }
        if let Some(due_at) = patch.due_at {
            job.due_at = due_at;
        }
        Ok(())
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<(), RepositoryError> {
        self.jobs.lock().unwrap().remove(&job_id);
        Ok(())
    }

    async fn find_media(
        &self,
        job_id: Uuid,
        kind: MediaKind,
    ) -> Result<Option<MediaRecord>, RepositoryError> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.job_id == job_id && m.kind == kind)
            .cloned())
    }

    async fn find_recent_messages(
        &self,
        bot_id: BotId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let mut messages: Vec<StoredMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.bot_id == bot_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit as usize);
        Ok(messages)
    }

    async fn create_message(&self, message: &StoredMessage) -> Result<(), RepositoryError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), RepositoryError> {
        self.messages.lock().unwrap().retain(|m| m.id != message_id);
        Ok(())
    }

    async fn get_bot(&self, bot_id: BotId) -> Result<Option<Bot>, RepositoryError> {
        Ok(self.bots.lock().unwrap().get(&bot_id).cloned())
    }

    async fn find_bot_with_delivery_target(&self) -> Result<Option<Bot>, RepositoryError> {
        Ok(self
            .bots
            .lock()
            .unwrap()
            .values()
            .find(|b| b.active && b.has_delivery_target())
            .cloned())
    }

    async fn update_bot(&self, bot_id: BotId, patch: &BotPatch) -> Result<(), RepositoryError> {
        let mut bots = self.bots.lock().unwrap();
        let bot = bots.get_mut(&bot_id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = &patch.name {
            bot.name = name.clone();
        }
        if let Some(model) = &patch.model {
            bot.model = model.clone();
        }
        if let Some(api_key) = &patch.api_key {
            bot.api_key = api_key.clone();
        }
        if let Some(context) = &patch.context {
            bot.context = context.clone();
        }
        if let Some(notes) = &patch.document_notes {
            bot.document_notes = notes.clone();
        }
        if let Some(factor) = patch.engagement_factor {
            bot.engagement_factor = factor;
        }
        if let Some(chat) = &patch.linked_chat_id {
            bot.linked_chat_id = chat.clone();
        }
        if let Some(active) = patch.active {
            bot.active = active;
        }
        bot.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockTransport {
    texts: Mutex<Vec<(String, String)>>,
    photos: Mutex<Vec<(String, MediaSource)>>,
    videos: Mutex<Vec<(String, MediaSource)>>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn sent_texts(&self) -> Vec<(String, String)> {
        self.texts.lock().unwrap().clone()
    }

    pub async fn sent_photos(&self) -> Vec<(String, MediaSource)> {
        self.photos.lock().unwrap().clone()
    }

    pub async fn sent_videos(&self) -> Vec<(String, MediaSource)> {
        self.videos.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(DeliveryError::Send("mock transport failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl DeliveryTransport for MockTransport {
    async fn send_text(&self, target: &str, text: &str) -> Result<(), DeliveryError> {
        self.check()?;
        self.texts
            .lock()
            .unwrap()
            .push((target.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, target: &str, source: &MediaSource) -> Result<(), DeliveryError> {
        self.check()?;
        self.photos
            .lock()
            .unwrap()
            .push((target.to_string(), source.clone()));
        Ok(())
    }

    async fn send_video(&self, target: &str, source: &MediaSource) -> Result<(), DeliveryError> {
        self.check()?;
        self.videos
            .lock()
            .unwrap()
            .push((target.to_string(), source.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockCompletion
// ---------------------------------------------------------------------------

pub struct MockCompletion {
    script: Mutex<VecDeque<CompletionResponse>>,
    fallback: Mutex<CompletionResponse>,
    fail: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(text_response("ok")),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response; queued responses are consumed in order before the
    /// fallback is used.
    pub fn push(&self, response: CompletionResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    /// The response returned once the queue is empty (every call, forever).
    pub fn set_fallback(&self, response: CompletionResponse) {
        *self.fallback.lock().unwrap() = response;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionClient for MockCompletion {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::Provider {
                message: "mock completion failure".to_string(),
            });
        }

        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(self.fallback.lock().unwrap().clone())
    }
}

/// A plain text completion response.
pub fn text_response(content: &str) -> CompletionResponse {
    CompletionResponse {
        content: Some(content.to_string()),
        tool_calls: Vec::new(),
    }
}

/// A response requesting a single tool invocation.
pub fn tool_response(id: &str, name: &str, arguments: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        content: None,
        tool_calls: vec![ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
    }
}

// ---------------------------------------------------------------------------
// MockImage
// ---------------------------------------------------------------------------

pub struct MockImage {
    url: Mutex<String>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockImage {
    pub fn new() -> Self {
        Self {
            url: Mutex::new("https://img.example/generated.png".to_string()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockImage {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageClient for MockImage {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::Provider {
                message: "mock image failure".to_string(),
            });
        }
        Ok(self.url.lock().unwrap().clone())
    }
}
