use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate post before moderation.
///
/// Created by the idea-generation step (or handed in by the dashboard) and
/// treated as read-only afterwards; only `published_at` is attached once the
/// item is accepted into the published history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    pub text: String,
    /// Remote image to attach, if one was generated.
    pub image_url: Option<String>,
    /// The theme/topic the item was generated from.
    pub topic: String,
    pub content_type: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    pub fn new(title: impl Into<String>, text: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            image_url: None,
            topic: topic.into(),
            content_type: "post".to_string(),
            published_at: None,
        }
    }
}

/// Lifecycle state of a persisted post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// Persisted but not yet bound to a live timer (dashboard flow).
    Draft,
    /// Waiting for its publish time.
    Scheduled,
    /// Successfully delivered to at least the full platform set.
    Published,
    /// At least one target platform rejected the post.
    Failed,
    /// Explicitly cancelled before firing.
    Cancelled,
}

impl PostStatus {
    /// True for states counted as pending queue depth.
    pub fn is_pending(self) -> bool {
        matches!(self, PostStatus::Draft | PostStatus::Scheduled)
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            "cancelled" => Ok(PostStatus::Cancelled),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

/// Per-account business configuration.
///
/// Read by the moderator (stop words, topics) and the idea generator
/// (strategy text); mutated only through explicit profile updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    /// Owning account row id.
    pub account_id: i64,
    pub niche: String,
    /// AI-authored strategy text that seeds idea generation.
    pub description: String,
    pub target_audience: String,
    pub goals: String,
    pub stop_words: Vec<String>,
    pub topics: Vec<String>,
    pub brand_tone: String,
    /// Platform names new posts are scheduled for. Empty means `["vk"]`.
    pub connected_platforms: Vec<String>,
}

impl BusinessProfile {
    /// Target platforms, defaulting to vk when none are connected.
    pub fn platforms(&self) -> Vec<String> {
        if self.connected_platforms.is_empty() {
            vec!["vk".to_string()]
        } else {
            self.connected_platforms.clone()
        }
    }
}

/// A connected external account (one social-network group per row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Remote group/community id.
    pub group_id: i64,
    pub group_name: String,
    pub access_token: String,
    pub is_active: bool,
}

impl Account {
    pub fn credentials(&self) -> AccountCredentials {
        AccountCredentials {
            access_token: self.access_token.clone(),
            group_id: self.group_id,
        }
    }
}

/// Credentials handed to a publisher adapter for one remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub access_token: String,
    pub group_id: i64,
}
