use chrono::{DateTime, Utc};
use postpilot_core::types::{ContentItem, PostStatus};
use serde::{Deserialize, Serialize};

/// A durable post row as read back from the `posts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRow {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub text: String,
    pub topic: String,
    pub image_url: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub published_time: Option<DateTime<Utc>>,
    pub status: PostStatus,
    /// `temp_<job-id>` before publication, the real remote id after.
    pub remote_post_id: Option<String>,
}

impl PostRow {
    /// Rebuild the content payload for a publish attempt.
    pub fn content(&self) -> ContentItem {
        ContentItem {
            title: self.title.clone(),
            text: self.text.clone(),
            image_url: self.image_url.clone(),
            topic: self.topic.clone(),
            content_type: "post".to_string(),
            published_at: self.published_time,
        }
    }

    /// The scheduler job id this row correlates to, if any.
    pub fn job_id(&self) -> Option<&str> {
        self.remote_post_id
            .as_deref()
            .and_then(|r| r.strip_prefix("temp_"))
    }
}
