//! Durable job scheduler.
//!
//! Maintains one live timer per active job so that every deferred action
//! fires at (or immediately after, when overdue at startup) its due time,
//! exactly once. The in-process timer registry is a cache; storage is the
//! source of truth, and a periodic reconcile pass converges the two.

pub mod timer;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chime_types::bot::Bot;
use chime_types::error::RepositoryError;
use chime_types::job::{Job, JobKind, JobPatch, MediaKind};

use crate::delivery::{DeliveryTransport, MediaSource};
use crate::persistence::PersistenceGateway;

use timer::TimerHandle;

/// How often the reconcile pass re-reads active jobs from storage.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Fallback upload locations for media jobs that predate media records.
const LEGACY_IMAGE_DIR: &str = "static/upload/images";
const LEGACY_VIDEO_DIR: &str = "static/upload/videos";

/// Errors from scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("invalid due time: {0}")]
    InvalidDueTime(String),
}

/// A registry entry: the armed timer plus a generation token so a firing
/// timer only evicts itself, never a newer timer armed for the same id.
struct RegistryEntry {
    generation: u64,
    handle: TimerHandle,
}

/// In-memory timer registry backed by the persistence gateway.
///
/// All registry mutation (schedule, cancel, reconcile adds/removals, the
/// post-fire eviction) happens under a single non-async mutex, so
/// cancel-then-arm for one job id is one critical section and never
/// suspends mid-section.
pub struct JobScheduler<P, D> {
    gateway: Arc<P>,
    transport: Arc<D>,
    registry: Mutex<HashMap<Uuid, RegistryEntry>>,
    generation: AtomicU64,
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
}

impl<P, D> JobScheduler<P, D>
where
    P: PersistenceGateway + 'static,
    D: DeliveryTransport + 'static,
{
    pub fn new(gateway: Arc<P>, transport: Arc<D>) -> Self {
        Self {
            gateway,
            transport,
            registry: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            reconcile_task: Mutex::new(None),
        }
    }

    /// Number of live timers in the registry.
    pub fn live_timers(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, RegistryEntry>> {
        // A panic while holding the lock leaves the map itself intact, so
        // recover the guard rather than poisoning every later caller.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arm a timer for a job. Idempotent: an existing timer for the same id
    /// is cancelled first, so the newest schedule always wins. Overdue jobs
    /// fire immediately.
    pub fn schedule(self: &Arc<Self>, job: &Job) {
        let delay = (job.due_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let scheduler = Arc::clone(self);
        let fired = job.clone();

        // Cancel-then-arm happens under one lock acquisition; arming spawns
        // but never suspends, so the critical section holds.
        let mut registry = self.registry();
        if let Some(old) = registry.remove(&job.id) {
            old.handle.cancel();
        }
        let handle = timer::arm(delay, async move {
            scheduler.fire(fired, generation).await;
        });
        registry.insert(job.id, RegistryEntry { generation, handle });
        drop(registry);

        debug!(job_id = %job.id, kind = %job.kind, due_at = %job.due_at, delay_secs = delay.as_secs(), "job scheduled");
    }

    /// Disarm the timer for a job id, if present. No-op for unknown or
    /// already-fired ids.
    pub fn cancel(&self, job_id: Uuid) {
        let entry = self.registry().remove(&job_id);
        if let Some(entry) = entry {
            entry.handle.cancel();
            info!(%job_id, "job cancelled");
        }
    }

    /// Load all active jobs from storage and schedule each. Overdue jobs
    /// fire immediately rather than being dropped, so no due action is lost
    /// across a restart.
    pub async fn recover_on_startup(self: &Arc<Self>) -> Result<usize, SchedulerError> {
        let jobs = self.gateway.find_active_jobs().await?;
        let count = jobs.len();
        for job in &jobs {
            self.schedule(job);
        }
        info!(jobs = count, "scheduler recovered active jobs");
        Ok(count)
    }

    /// Converge the registry with storage: schedule active jobs the registry
    /// is missing (created elsewhere or written directly to storage), and
    /// cancel registry entries whose job is no longer active in storage.
    pub async fn reconcile(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let active = self.gateway.find_active_jobs().await?;
        let active_ids: HashSet<Uuid> = active.iter().map(|j| j.id).collect();

        for job in &active {
            let known = self.registry().contains_key(&job.id);
            if !known {
                debug!(job_id = %job.id, "reconcile found unscheduled active job");
                self.schedule(job);
            }
        }

        let stale: Vec<Uuid> = self
            .registry()
            .keys()
            .filter(|id| !active_ids.contains(id))
            .copied()
            .collect();
        for job_id in stale {
            debug!(%job_id, "reconcile evicting inactive job");
            self.cancel(job_id);
        }

        Ok(())
    }

    /// Arm the periodic reconcile task.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.reconcile().await {
                    error!(error = %e, "reconcile pass failed");
                }
            }
        });

        let mut slot = self
            .reconcile_task
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
        info!(interval_secs = interval.as_secs(), "periodic reconcile started");
    }

    /// Stop the reconcile task and cancel every live job timer.
    pub fn shutdown(&self) {
        if let Some(task) = self
            .reconcile_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }

        let mut registry = self.registry();
        for (job_id, entry) in registry.drain() {
            entry.handle.cancel();
            debug!(%job_id, "timer cancelled on shutdown");
        }
        info!("scheduler shut down");
    }

    /// Timer callback: execute the job, then evict our own registry entry
    /// (only if a newer timer has not replaced it).
    async fn fire(self: Arc<Self>, job: Job, generation: u64) {
        self.execute(&job).await;

        let mut registry = self.registry();
        if registry
            .get(&job.id)
            .is_some_and(|entry| entry.generation == generation)
        {
            registry.remove(&job.id);
        }
    }

    /// Execute a due job: resolve the delivery target, dispatch by kind,
    /// and mark the job inactive.
    ///
    /// A missing delivery target is an operator-fixable condition: the job
    /// is left active and untouched. A transport failure is not: it is
    /// logged and the job is still deactivated (at-most-once delivery).
    pub async fn execute(&self, job: &Job) {
        let target = match self.resolve_target(job).await {
            Ok(Some(target)) => target,
            Ok(None) => return,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "failed to resolve delivery target");
                return;
            }
        };

        info!(job_id = %job.id, kind = %job.kind, %target, "executing job");

        let result = match job.kind {
            JobKind::Text | JobKind::Prompt => {
                self.transport.send_text(&target, &job.payload).await
            }
            JobKind::Image => {
                let source = self.media_source(job, MediaKind::Image, LEGACY_IMAGE_DIR).await;
                self.transport.send_photo(&target, &source).await
            }
            JobKind::Video => {
                let source = self.media_source(job, MediaKind::Video, LEGACY_VIDEO_DIR).await;
                self.transport.send_video(&target, &source).await
            }
        };

        if let Err(e) = result {
            error!(job_id = %job.id, error = %e, "job delivery failed");
        }

        if let Err(e) = self
            .gateway
            .update_job(job.id, &JobPatch::deactivate())
            .await
        {
            error!(job_id = %job.id, error = %e, "failed to deactivate job");
        }
    }

    /// The delivery target for a job: the owning bot's linked chat, or --
    /// for legacy jobs without an owner -- any active bot with a linked
    /// chat. `Ok(None)` means no usable target exists right now.
    async fn resolve_target(&self, job: &Job) -> Result<Option<String>, SchedulerError> {
        let bot: Option<Bot> = match job.bot_id {
            Some(bot_id) => self.gateway.get_bot(bot_id).await?,
            None => self.gateway.find_bot_with_delivery_target().await?,
        };

        match bot.as_ref().and_then(|b| b.linked_chat_id.clone()) {
            Some(chat_id) if !chat_id.is_empty() => Ok(Some(chat_id)),
            _ => {
                warn!(
                    job_id = %job.id,
                    bot = bot.map(|b| b.name).as_deref().unwrap_or("<none>"),
                    "no linked chat for job execution; link a chat to this bot"
                );
                Ok(None)
            }
        }
    }

    /// The media source for an image/video job: the stored media record, or
    /// the legacy upload path derived from the payload when no record exists.
    async fn media_source(&self, job: &Job, kind: MediaKind, legacy_dir: &str) -> MediaSource {
        match self.gateway.find_media(job.id, kind).await {
            Ok(Some(record)) => MediaSource::Path(record.path),
            Ok(None) => {
                warn!(job_id = %job.id, %kind, "no media record for job, trying legacy path");
                MediaSource::Path(format!("{legacy_dir}/{}", job.payload))
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "media lookup failed, trying legacy path");
                MediaSource::Path(format!("{legacy_dir}/{}", job.payload))
            }
        }
    }
}

/// Parse a due date from tool or API input.
///
/// Accepts RFC 3339 (with offset) and naive `YYYY-MM-DDTHH:MM:SS` /
/// `YYYY-MM-DD HH:MM:SS` forms, which are taken as UTC.
pub fn parse_due_date(s: &str) -> Result<DateTime<Utc>, SchedulerError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }

    Err(SchedulerError::InvalidDueTime(format!(
        "'{s}' is not a recognized datetime; use ISO 8601 (e.g. 2026-08-06T15:30:00Z)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::{MockGateway, MockTransport, test_bot};
    use chime_types::job::MediaRecord;

    fn scheduler(
        gateway: Arc<MockGateway>,
        transport: Arc<MockTransport>,
    ) -> Arc<JobScheduler<MockGateway, MockTransport>> {
        Arc::new(JobScheduler::new(gateway, transport))
    }

    /// Let spawned timer tasks run to completion under a paused clock.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_job_fires_once_and_deactivates() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(
            JobKind::Text,
            "Drink water",
            Utc::now() + chrono::Duration::seconds(1),
            Some(bot.id),
        );
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.schedule(&job);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        settle().await;

        let texts = transport.sent_texts().await;
        assert_eq!(texts, vec![("12345".to_string(), "Drink water".to_string())]);
        assert!(!gateway.get_job(job.id).await.unwrap().unwrap().active);
        assert_eq!(scheduler.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_is_idempotent() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(
            JobKind::Text,
            "once",
            Utc::now() + chrono::Duration::seconds(5),
            Some(bot.id),
        );
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.schedule(&job);
        scheduler.schedule(&job);
        assert_eq!(scheduler.live_timers(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(transport.sent_texts().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_job_fires_immediately_on_recovery() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(
            JobKind::Text,
            "late reminder",
            Utc::now() - chrono::Duration::hours(2),
            Some(bot.id),
        );
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        let recovered = scheduler.recover_on_startup().await.unwrap();
        assert_eq!(recovered, 1);

        settle().await;
        assert_eq!(transport.sent_texts().await.len(), 1);
        assert!(!gateway.get_job(job.id).await.unwrap().unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_execution() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(
            JobKind::Text,
            "never",
            Utc::now() + chrono::Duration::seconds(5),
            Some(bot.id),
        );
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.schedule(&job);
        scheduler.cancel(job.id);
        assert_eq!(scheduler.live_timers(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert!(transport.sent_texts().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unknown_id_is_noop() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let scheduler = scheduler(gateway, transport);
        scheduler.cancel(Uuid::now_v7());
        assert_eq!(scheduler.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_adds_missing_active_job() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());

        // Job appears in storage without going through the scheduler.
        let job = Job::new(
            JobKind::Text,
            "external",
            Utc::now() + chrono::Duration::seconds(60),
            Some(bot.id),
        );
        gateway.insert_job(job.clone()).await;
        assert_eq!(scheduler.live_timers(), 0);

        scheduler.reconcile().await.unwrap();
        assert_eq!(scheduler.live_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_evicts_deactivated_job() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(
            JobKind::Text,
            "cancelled elsewhere",
            Utc::now() + chrono::Duration::seconds(60),
            Some(bot.id),
        );
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.schedule(&job);
        assert_eq!(scheduler.live_timers(), 1);

        // Deactivated directly in storage (external cancellation).
        gateway
            .update_job(job.id, &JobPatch::deactivate())
            .await
            .unwrap();

        scheduler.reconcile().await.unwrap();
        assert_eq!(scheduler.live_timers(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        assert!(transport.sent_texts().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_leaves_job_active() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let mut bot = test_bot();
        bot.linked_chat_id = None;
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(JobKind::Text, "orphan", Utc::now(), Some(bot.id));
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.execute(&job).await;

        assert!(transport.sent_texts().await.is_empty());
        assert!(gateway.get_job(job.id).await.unwrap().unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_job_uses_any_linked_bot() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(JobKind::Text, "legacy", Utc::now(), None);
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.execute(&job).await;

        assert_eq!(transport.sent_texts().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_job_prefers_media_record() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(JobKind::Image, "ref-1", Utc::now(), Some(bot.id));
        gateway.insert_job(job.clone()).await;
        gateway
            .insert_media(MediaRecord {
                id: Uuid::now_v7(),
                job_id: job.id,
                kind: MediaKind::Image,
                path: "uploads/img/cat.png".to_string(),
            })
            .await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.execute(&job).await;

        let photos = transport.sent_photos().await;
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].1, MediaSource::Path("uploads/img/cat.png".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_job_falls_back_to_legacy_path() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(JobKind::Image, "cat.png", Utc::now(), Some(bot.id));
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.execute(&job).await;

        let photos = transport.sent_photos().await;
        assert_eq!(
            photos[0].1,
            MediaSource::Path("static/upload/images/cat.png".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_still_deactivates() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        transport.fail_sends(true);
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(JobKind::Text, "doomed", Utc::now(), Some(bot.id));
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.execute(&job).await;

        assert!(!gateway.get_job(job.id).await.unwrap().unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_job_delivered_as_text() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let job = Job::new(JobKind::Prompt, "expand me", Utc::now(), Some(bot.id));
        gateway.insert_job(job.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        scheduler.execute(&job).await;

        assert_eq!(transport.sent_texts().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_all_timers() {
        let gateway = Arc::new(MockGateway::new());
        let transport = Arc::new(MockTransport::new());
        let bot = test_bot();
        gateway.insert_bot(bot.clone()).await;

        let scheduler = scheduler(gateway.clone(), transport.clone());
        for i in 0..3 {
            let job = Job::new(
                JobKind::Text,
                format!("job {i}"),
                Utc::now() + chrono::Duration::seconds(30),
                Some(bot.id),
            );
            gateway.insert_job(job.clone()).await;
            scheduler.schedule(&job);
        }
        assert_eq!(scheduler.live_timers(), 3);

        scheduler.shutdown();
        assert_eq!(scheduler.live_timers(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert!(transport.sent_texts().await.is_empty());
    }

    #[test]
    fn test_parse_due_date_formats() {
        assert!(parse_due_date("2026-08-06T15:30:00Z").is_ok());
        assert!(parse_due_date("2026-08-06T15:30:00-06:00").is_ok());
        assert!(parse_due_date("2026-08-06T15:30:00").is_ok());
        assert!(parse_due_date("2026-08-06 15:30:00").is_ok());
        assert!(parse_due_date("not a date").is_err());
        assert!(parse_due_date("tomorrow at noon").is_err());
    }
}
