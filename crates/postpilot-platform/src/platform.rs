use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use postpilot_ai::AiService;
use postpilot_core::types::{BusinessProfile, ContentItem};
use postpilot_moderation::ContentModerator;
use postpilot_scheduler::PostingScheduler;
use postpilot_store::ContentStore;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{ProcessReport, RejectedItem};

/// Per-account content pipeline: moderation gate in front, scheduler behind.
///
/// Every moderation verdict, approved or not, is written to the audit log
/// before scheduling is attempted.
pub struct ContentPlatform {
    account_id: i64,
    profile: BusinessProfile,
    ai: Arc<AiService>,
    store: Arc<ContentStore>,
    moderator: ContentModerator,
    scheduler: Arc<PostingScheduler>,
}

impl ContentPlatform {
    pub fn new(
        profile: BusinessProfile,
        ai: Arc<AiService>,
        store: Arc<ContentStore>,
        scheduler: Arc<PostingScheduler>,
    ) -> Self {
        let moderator = ContentModerator::new(&profile, Arc::clone(&ai));
        Self {
            account_id: profile.account_id,
            profile,
            ai,
            store,
            moderator,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &PostingScheduler {
        &self.scheduler
    }

    /// Run a content plan through moderation, then schedule the survivors
    /// starting today. Rejected items are reported but never persisted as
    /// posts.
    pub async fn process(&self, items: Vec<ContentItem>) -> Result<ProcessReport> {
        let total = items.len();
        let mut approved = Vec::new();
        let mut rejected = Vec::new();

        for item in items {
            let verdict = self.moderator.moderate(&item).await;
            self.store.log_moderation(
                self.account_id,
                &item.title,
                verdict.passed,
                verdict.score,
                &verdict.issues,
                &verdict.suggestions,
            )?;
            if verdict.passed {
                approved.push(item);
            } else {
                info!(title = %item.title, score = verdict.score, "item rejected by moderation");
                rejected.push(RejectedItem {
                    title: item.title,
                    score: verdict.score,
                    issues: verdict.issues,
                    suggestions: verdict.suggestions,
                });
            }
        }

        let approved_count = approved.len();
        let schedule = self.scheduler.schedule_batch(approved, Utc::now()).await?;
        info!(
            account_id = self.account_id,
            total,
            approved = approved_count,
            scheduled = schedule.len(),
            "content plan processed"
        );
        Ok(ProcessReport {
            total,
            approved_count,
            rejected_count: rejected.len(),
            scheduled_count: schedule.len(),
            rejected,
            schedule,
        })
    }

    /// Generate, moderate, and schedule up to `count` fresh posts.
    ///
    /// New posts land after the account's last scheduled slot so the
    /// existing calendar is never reshuffled. Returns how many posts were
    /// actually scheduled; generation shortfalls and rejections reduce the
    /// number rather than failing the pass.
    pub async fn auto_replenish(&self, count: usize) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }

        let known = self.store.theme_texts(self.account_id)?;
        let strategy = self.strategy_text();
        let themes = self.ai.generate_theme_ideas(&strategy, &known).await;
        if themes.is_empty() {
            warn!(account_id = self.account_id, "no theme ideas, queue stays empty");
            return Ok(0);
        }

        let topic = self
            .profile
            .topics
            .first()
            .cloned()
            .unwrap_or_else(|| self.profile.niche.clone());

        let mut approved = Vec::new();
        for theme in themes {
            if approved.len() >= count {
                break;
            }
            let Some(text) = self.ai.generate_post_content(&theme).await else {
                continue;
            };
            let mut item = ContentItem::new(theme.clone(), text, topic.clone());

            let verdict = self.moderator.moderate(&item).await;
            self.store.log_moderation(
                self.account_id,
                &item.title,
                verdict.passed,
                verdict.score,
                &verdict.issues,
                &verdict.suggestions,
            )?;
            if !verdict.passed {
                info!(%theme, score = verdict.score, "generated post rejected");
                continue;
            }

            // Illustration is best-effort; a text-only post is still a post.
            if let Some(prompt) = self.ai.generate_image_prompt(&theme).await {
                item.image_url = Some(self.ai.image_url(&prompt));
            }

            self.store.add_theme(self.account_id, &theme)?;
            approved.push(item);
        }

        if approved.is_empty() {
            return Ok(0);
        }

        let start = self.refill_start()?;
        let scheduled = self.scheduler.schedule_batch(approved, start).await?;
        info!(
            account_id = self.account_id,
            requested = count,
            scheduled = scheduled.len(),
            "queue replenished"
        );
        Ok(scheduled.len())
    }

    /// Replenishment continues the calendar from the day after the last
    /// scheduled post, or from now when the queue is empty.
    fn refill_start(&self) -> Result<DateTime<Utc>> {
        Ok(self
            .store
            .latest_scheduled_time(self.account_id)?
            .map(|t| t + Duration::days(1))
            .unwrap_or_else(Utc::now))
    }

    fn strategy_text(&self) -> String {
        format!(
            "{}. {}. Audience: {}. Goals: {}. Tone: {}.",
            self.profile.niche,
            self.profile.description,
            self.profile.target_audience,
            self.profile.goals,
            self.profile.brand_tone,
        )
    }
}
