//! SQLite persistence gateway implementation.
//!
//! Implements `PersistenceGateway` from `chime-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reads on the reader
//! pool, writes on the single-connection writer pool.

use chime_core::persistence::PersistenceGateway;
use chime_types::bot::{Bot, BotId, BotPatch};
use chime_types::error::RepositoryError;
use chime_types::job::{Job, JobKind, JobPatch, MediaKind, MediaRecord};
use chime_types::llm::MessageRole;
use chime_types::message::StoredMessage;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `PersistenceGateway`.
pub struct SqliteGateway {
    pool: DatabasePool,
}

impl SqliteGateway {
    /// Create a new gateway backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Persist a new bot. Used by host bootstrap and tests; the trait
    /// surface itself only reads and patches bots.
    pub async fn create_bot(&self, bot: &Bot) -> Result<(), RepositoryError> {
        let notes_json = serde_json::to_string(&bot.document_notes)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            "INSERT INTO bots (id, name, model, api_key, context, document_notes, engagement_factor, linked_chat_id, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(bot.id.to_string())
        .bind(&bot.name)
        .bind(&bot.model)
        .bind(&bot.api_key)
        .bind(&bot.context)
        .bind(&notes_json)
        .bind(bot.engagement_factor)
        .bind(&bot.linked_chat_id)
        .bind(bot.active)
        .bind(format_datetime(&bot.created_at))
        .bind(format_datetime(&bot.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(into_repo_error)?;

        Ok(())
    }

    /// All active bots, newest first.
    pub async fn list_active_bots(&self) -> Result<Vec<Bot>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM bots WHERE active = 1 ORDER BY created_at DESC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(into_repo_error)?;

        rows.iter()
            .map(|row| BotRow::from_row(row).map_err(into_repo_error)?.into_bot())
            .collect()
    }

    /// Persist a media record for a job. Used by upload handling in the
    /// host and by tests.
    pub async fn create_media(&self, record: &MediaRecord) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO job_media (id, job_id, kind, path) VALUES (?, ?, ?, ?)")
            .bind(record.id.to_string())
            .bind(record.job_id.to_string())
            .bind(record.kind.to_string())
            .bind(&record.path)
            .execute(&self.pool.writer)
            .await
            .map_err(into_repo_error)?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct JobRow {
    id: String,
    kind: String,
    payload: String,
    due_at: String,
    bot_id: Option<String>,
    active: bool,
    created_at: String,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            payload: row.try_get("payload")?,
            due_at: row.try_get("due_at")?,
            bot_id: row.try_get("bot_id")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_job(self) -> Result<Job, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid job id: {e}")))?;
        let kind: JobKind = self
            .kind
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let bot_id = self
            .bot_id
            .as_deref()
            .map(|s| s.parse::<BotId>())
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid bot_id: {e}")))?;

        Ok(Job {
            id,
            kind,
            payload: self.payload,
            due_at: parse_datetime(&self.due_at)?,
            bot_id,
            active: self.active,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct MessageRow {
    id: String,
    bot_id: String,
    role: String,
    content: String,
    sender_name: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            bot_id: row.try_get("bot_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            sender_name: row.try_get("sender_name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<StoredMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let bot_id = self
            .bot_id
            .parse::<BotId>()
            .map_err(|e| RepositoryError::Query(format!("invalid bot_id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(StoredMessage {
            id,
            bot_id,
            role,
            content: self.content,
            sender_name: self.sender_name,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct BotRow {
    id: String,
    name: String,
    model: String,
    api_key: Option<String>,
    context: String,
    document_notes: String,
    engagement_factor: f64,
    linked_chat_id: Option<String>,
    active: bool,
    created_at: String,
    updated_at: String,
}

impl BotRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            model: row.try_get("model")?,
            api_key: row.try_get("api_key")?,
            context: row.try_get("context")?,
            document_notes: row.try_get("document_notes")?,
            engagement_factor: row.try_get("engagement_factor")?,
            linked_chat_id: row.try_get("linked_chat_id")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_bot(self) -> Result<Bot, RepositoryError> {
        let id = self
            .id
            .parse::<BotId>()
            .map_err(|e| RepositoryError::Query(format!("invalid bot id: {e}")))?;
        let document_notes: Vec<String> = serde_json::from_str(&self.document_notes)
            .map_err(|e| RepositoryError::Query(format!("invalid document notes JSON: {e}")))?;

        Ok(Bot {
            id,
            name: self.name,
            model: self.model,
            api_key: self.api_key,
            context: self.context,
            document_notes,
            engagement_factor: self.engagement_factor,
            linked_chat_id: self.linked_chat_id,
            active: self.active,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn into_repo_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE") => {
            RepositoryError::Conflict(db_err.message().to_string())
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

impl PersistenceGateway for SqliteGateway {
    async fn find_active_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE active = 1 ORDER BY due_at ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(into_repo_error)?;

        rows.iter()
            .map(|row| JobRow::from_row(row).map_err(into_repo_error)?.into_job())
            .collect()
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(into_repo_error)?;

        match row {
            Some(row) => Ok(Some(
                JobRow::from_row(&row).map_err(into_repo_error)?.into_job()?,
            )),
            None => Ok(None),
        }
    }

    async fn create_job(&self, job: &Job) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO jobs (id, kind, payload, due_at, bot_id, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(job.kind.to_string())
        .bind(&job.payload)
        .bind(format_datetime(&job.due_at))
        .bind(job.bot_id.map(|id| id.to_string()))
        .bind(job.active)
        .bind(format_datetime(&job.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(into_repo_error)?;

        Ok(())
    }

    async fn update_job(&self, job_id: Uuid, patch: &JobPatch) -> Result<(), RepositoryError> {
        let mut job = self.get_job(job_id).await?.ok_or(RepositoryError::NotFound)?;
        if let Some(active) = patch.active {
            job.active = active;
        }
        if let Some(due_at) = patch.due_at {
            job.due_at = due_at;
        }

        sqlx::query("UPDATE jobs SET active = ?, due_at = ? WHERE id = ?")
            .bind(job.active)
            .bind(format_datetime(&job.due_at))
            .bind(job_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(into_repo_error)?;

        Ok(())
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(into_repo_error)?;

        Ok(())
    }

    async fn find_media(
        &self,
        job_id: Uuid,
        kind: MediaKind,
    ) -> Result<Option<MediaRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM job_media WHERE job_id = ? AND kind = ? LIMIT 1")
            .bind(job_id.to_string())
            .bind(kind.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(into_repo_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id").map_err(into_repo_error)?;
        let path: String = row.try_get("path").map_err(into_repo_error)?;
        Ok(Some(MediaRecord {
            id: Uuid::parse_str(&id)
                .map_err(|e| RepositoryError::Query(format!("invalid media id: {e}")))?,
            job_id,
            kind,
            path,
        }))
    }

    async fn find_recent_messages(
        &self,
        bot_id: BotId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE bot_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(bot_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(into_repo_error)?;

        rows.iter()
            .map(|row| {
                MessageRow::from_row(row)
                    .map_err(into_repo_error)?
                    .into_message()
            })
            .collect()
    }

    async fn create_message(&self, message: &StoredMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (id, bot_id, role, content, sender_name, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(message.bot_id.to_string())
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(&message.sender_name)
        .bind(format_datetime(&message.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(into_repo_error)?;

        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(into_repo_error)?;

        Ok(())
    }

    async fn get_bot(&self, bot_id: BotId) -> Result<Option<Bot>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM bots WHERE id = ?")
            .bind(bot_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(into_repo_error)?;

        match row {
            Some(row) => Ok(Some(
                BotRow::from_row(&row).map_err(into_repo_error)?.into_bot()?,
            )),
            None => Ok(None),
        }
    }

    async fn find_bot_with_delivery_target(&self) -> Result<Option<Bot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM bots WHERE active = 1 AND linked_chat_id IS NOT NULL AND linked_chat_id != '' LIMIT 1",
        )
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(into_repo_error)?;

        match row {
            Some(row) => Ok(Some(
                BotRow::from_row(&row).map_err(into_repo_error)?.into_bot()?,
            )),
            None => Ok(None),
        }
    }

    async fn update_bot(&self, bot_id: BotId, patch: &BotPatch) -> Result<(), RepositoryError> {
        let mut bot = self.get_bot(bot_id).await?.ok_or(RepositoryError::NotFound)?;

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

        let notes_json = serde_json::to_string(&bot.document_notes)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            "UPDATE bots SET name = ?, model = ?, api_key = ?, context = ?, document_notes = ?, engagement_factor = ?, linked_chat_id = ?, active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&bot.name)
        .bind(&bot.model)
        .bind(&bot.api_key)
        .bind(&bot.context)
        .bind(&notes_json)
        .bind(bot.engagement_factor)
        .bind(&bot.linked_chat_id)
        .bind(bot.active)
        .bind(format_datetime(&Utc::now()))
        .bind(bot_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(into_repo_error)?;

        Ok(())
    }
}
