use chrono::{DateTime, Utc};
use postpilot_core::types::PostStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One post placed on the calendar by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub job_id: String,
    /// Rowid of the durable record backing this job.
    pub db_id: i64,
    pub title: String,
    pub scheduled_time: DateTime<Utc>,
}

/// Emitted when an account's pending queue drains to zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RefillRequest {
    pub account_id: i64,
}

/// Calendar view of one pending post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub job_id: Option<String>,
    pub title: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: PostStatus,
}

/// Fresh job id: `post_<yyyymmdd>_<8 hex chars>`.
pub fn new_job_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("post_{}_{}", Utc::now().format("%Y%m%d"), &uuid[..8])
}

/// The key stored in `posts.remote_post_id` until a real remote id lands.
pub fn correlation_key(job_id: &str) -> String {
    format!("temp_{job_id}")
}
