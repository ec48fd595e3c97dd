//! Deferred jobs: time-triggered actions executed by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::bot::BotId;

/// What a job does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Send the payload as a text message.
    Text,
    /// Send a stored image; payload is a media reference.
    Image,
    /// Send a stored video; payload is a media reference.
    Video,
    /// Reserved for LLM-expanded reminders; currently delivered as text.
    Prompt,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Text => write!(f, "text"),
            JobKind::Image => write!(f, "image"),
            JobKind::Video => write!(f, "video"),
            JobKind::Prompt => write!(f, "prompt"),
        }
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(JobKind::Text),
            "image" => Ok(JobKind::Image),
            "video" => Ok(JobKind::Video),
            "prompt" => Ok(JobKind::Prompt),
            other => Err(format!("invalid job kind: '{other}'")),
        }
    }
}

/// A durable deferred action.
///
/// Jobs transition `active = true` to `active = false` exactly once, either
/// by execution or by cancellation, and are never reactivated. `bot_id` is
/// optional for legacy rows created before jobs were owned by a bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    /// Message text for Text/Prompt jobs; media reference for Image/Video.
    pub payload: String,
    pub due_at: DateTime<Utc>,
    pub bot_id: Option<BotId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Build a new active job due at the given time.
    pub fn new(kind: JobKind, payload: impl Into<String>, due_at: DateTime<Utc>, bot_id: Option<BotId>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            payload: payload.into(),
            due_at,
            bot_id,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Partial update for a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPatch {
    pub active: Option<bool>,
    pub due_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// Patch that deactivates a job (executed or cancelled).
    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            ..Default::default()
        }
    }
}

/// Kind of media stored for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("invalid media kind: '{other}'")),
        }
    }
}

/// A stored media file attached to a job.
///
/// Image and video jobs resolve their payload through one of these records;
/// jobs created before media records existed fall back to a well-known
/// upload path derived from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub kind: MediaKind,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_roundtrip() {
        for kind in [JobKind::Text, JobKind::Image, JobKind::Video, JobKind::Prompt] {
            let s = kind.to_string();
            let parsed: JobKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_job_kind_rejects_unknown() {
        assert!("reminder".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_media_kind_roundtrip() {
        for kind in [MediaKind::Image, MediaKind::Video] {
            let s = kind.to_string();
            let parsed: MediaKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_new_job_is_active() {
        let job = Job::new(JobKind::Text, "Drink water", Utc::now(), None);
        assert!(job.active);
        assert_eq!(job.payload, "Drink water");
    }

    #[test]
    fn test_deactivate_patch() {
        let patch = JobPatch::deactivate();
        assert_eq!(patch.active, Some(false));
        assert!(patch.due_at.is_none());
    }

    #[test]
    fn test_job_kind_serde_lowercase() {
        let json = serde_json::to_string(&JobKind::Prompt).unwrap();
        assert_eq!(json, "\"prompt\"");
    }
}
