//! PersistenceGateway trait definition.
//!
//! The one durable-store contract this core consumes: jobs, messages, bot
//! configuration, and job media. Implementations live in chime-infra (e.g.,
//! `SqliteGateway`). Uses native async fn in traits (RPITIT, Rust 2024
//! edition); trait objects are not needed because every consumer is generic.

use chime_types::bot::{Bot, BotId, BotPatch};
use chime_types::error::RepositoryError;
use chime_types::job::{Job, JobPatch, MediaKind, MediaRecord};
use chime_types::message::StoredMessage;
use uuid::Uuid;

/// Durable store for jobs, messages, and bot configuration.
///
/// The scheduler treats this as the source of truth; its in-process timer
/// registry is only a cache over the `active = true` job set.
pub trait PersistenceGateway: Send + Sync {
    /// All jobs with `active = true`, any bot.
    fn find_active_jobs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Job>, RepositoryError>> + Send;

    /// Get a job by id.
    fn get_job(
        &self,
        job_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Job>, RepositoryError>> + Send;

    /// Persist a new job.
    fn create_job(
        &self,
        job: &Job,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Apply a partial update to a job.
    fn update_job(
        &self,
        job_id: Uuid,
        patch: &JobPatch,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a job outright. Scheduled deactivation normally uses
    /// `update_job` with [`JobPatch::deactivate`] instead.
    fn delete_job(
        &self,
        job_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Find the stored media record of the given kind for a job, if any.
    fn find_media(
        &self,
        job_id: Uuid,
        kind: MediaKind,
    ) -> impl std::future::Future<Output = Result<Option<MediaRecord>, RepositoryError>> + Send;

    /// The most recent messages for a bot, newest first.
    fn find_recent_messages(
        &self,
        bot_id: BotId,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<StoredMessage>, RepositoryError>> + Send;

    /// Persist a new conversation turn.
    fn create_message(
        &self,
        message: &StoredMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a conversation turn.
    fn delete_message(
        &self,
        message_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a bot's configuration by id.
    fn get_bot(
        &self,
        bot_id: BotId,
    ) -> impl std::future::Future<Output = Result<Option<Bot>, RepositoryError>> + Send;

    /// Any active bot with a linked delivery target. Used to resolve the
    /// target for legacy jobs that carry no owning bot.
    fn find_bot_with_delivery_target(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<Bot>, RepositoryError>> + Send;

    /// Apply a partial update to a bot. Callers validate the patch first
    /// (see [`BotPatch::validate`]).
    fn update_bot(
        &self,
        bot_id: BotId,
        patch: &BotPatch,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
