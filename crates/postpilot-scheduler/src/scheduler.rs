use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use postpilot_ai::AiService;
use postpilot_core::types::{AccountCredentials, BusinessProfile, ContentItem, PostStatus};
use postpilot_publishers::PublisherRegistry;
use postpilot_store::ContentStore;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::slots::assign_slots;
use crate::types::{correlation_key, new_job_id, CalendarEntry, RefillRequest, ScheduledPost};

/// Overdue posts found at restore time fire this many seconds after startup.
const RESTORE_GRACE_SECS: i64 = 10;

struct JobEntry {
    handle: AbortHandle,
    scheduled_time: DateTime<Utc>,
    title: String,
}

struct Inner {
    account_id: i64,
    profile: BusinessProfile,
    creds: AccountCredentials,
    ai: Arc<AiService>,
    store: Arc<ContentStore>,
    publishers: Arc<PublisherRegistry>,
    jobs: DashMap<String, JobEntry>,
    /// If set, a drained queue sends a refill request here (non-blocking).
    refill_tx: Option<mpsc::Sender<RefillRequest>>,
}

/// Per-account posting scheduler.
///
/// The durable `posts` row is the source of truth; the Tokio timer tasks
/// held in `jobs` are an optimization on top of it. Every fire re-reads the
/// row and publishes only if it is still `scheduled`, so a row cancelled or
/// already published through another path is left alone.
pub struct PostingScheduler {
    inner: Arc<Inner>,
}

impl PostingScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: i64,
        profile: BusinessProfile,
        creds: AccountCredentials,
        ai: Arc<AiService>,
        store: Arc<ContentStore>,
        publishers: Arc<PublisherRegistry>,
        refill_tx: Option<mpsc::Sender<RefillRequest>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                account_id,
                profile,
                creds,
                ai,
                store,
                publishers,
                jobs: DashMap::new(),
                refill_tx,
            }),
        }
    }

    /// Spread a batch of approved items over the account's preferred slots,
    /// starting from `start`'s calendar day.
    pub async fn schedule_batch(
        &self,
        items: Vec<ContentItem>,
        start: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPost>> {
        let best = self
            .inner
            .ai
            .best_posting_times(&self.inner.profile.niche)
            .await;
        let now = Utc::now();
        let slots = assign_slots(items.len(), &best, start, now);

        let mut scheduled = Vec::with_capacity(items.len());
        for (item, when) in items.into_iter().zip(slots) {
            scheduled.push(self.schedule_at(item, when)?);
        }
        Ok(scheduled)
    }

    /// Persist one post and arm its timer. The durable row carries the
    /// `temp_<job-id>` correlation key until publication.
    pub fn schedule_at(&self, item: ContentItem, when: DateTime<Utc>) -> Result<ScheduledPost> {
        let job_id = new_job_id();
        let correlation = correlation_key(&job_id);
        let db_id = self.inner.store.insert_scheduled_post(
            self.inner.account_id,
            &item.title,
            &item.text,
            &item.topic,
            item.image_url.as_deref(),
            when,
            &correlation,
        )?;
        self.spawn_timer(&job_id, &item.title, when);
        info!(%job_id, post_id = db_id, scheduled = %when.to_rfc3339(), "post scheduled");
        Ok(ScheduledPost {
            job_id,
            db_id,
            title: item.title,
            scheduled_time: when,
        })
    }

    /// Fire the job immediately. Returns `Ok(false)` when the durable row
    /// is missing or no longer `scheduled` (nothing was sent remotely).
    pub async fn publish_now(&self, job_id: &str) -> Result<bool> {
        fire(Arc::clone(&self.inner), job_id).await
    }

    /// Cancel a pending job. Returns `false` if the post is not in the
    /// `scheduled` state; the durable row is then left untouched.
    pub fn cancel(&self, job_id: &str) -> bool {
        let Ok(Some(row)) = self.inner.store.find_by_correlation(&correlation_key(job_id)) else {
            return false;
        };
        if row.status != PostStatus::Scheduled {
            return false;
        }
        if let Err(e) = self.inner.store.set_status(row.id, PostStatus::Cancelled) {
            error!(%job_id, "cancel failed: {e}");
            return false;
        }
        if let Some((_, entry)) = self.inner.jobs.remove(job_id) {
            entry.handle.abort();
        }
        info!(%job_id, "scheduled post cancelled");
        true
    }

    /// Move a pending job to a new time. Same state rule as [`cancel`]:
    /// only `scheduled` posts can move.
    ///
    /// [`cancel`]: PostingScheduler::cancel
    pub fn reschedule(&self, job_id: &str, new_time: DateTime<Utc>) -> bool {
        let Ok(Some(row)) = self.inner.store.find_by_correlation(&correlation_key(job_id)) else {
            return false;
        };
        if row.status != PostStatus::Scheduled {
            return false;
        }
        if let Err(e) = self.inner.store.update_scheduled_time(row.id, new_time) {
            error!(%job_id, "reschedule failed: {e}");
            return false;
        }
        self.spawn_timer(job_id, &row.title, new_time);
        info!(%job_id, new_time = %new_time.to_rfc3339(), "post rescheduled");
        true
    }

    /// Pending posts for this account, ordered by time.
    pub fn calendar(&self) -> Result<Vec<CalendarEntry>> {
        let rows = self.inner.store.pending_posts(self.inner.account_id)?;
        Ok(rows
            .into_iter()
            .map(|row| CalendarEntry {
                job_id: row.job_id().map(str::to_string),
                title: row.title,
                scheduled_time: row.scheduled_time,
                status: row.status,
            })
            .collect())
    }

    /// Re-arm timers for every `scheduled` row, e.g. after a restart.
    /// Overdue posts fire shortly after startup instead of immediately.
    pub fn restore_from_store(&self) -> Result<usize> {
        let now = Utc::now();
        let rows = self.inner.store.pending_posts(self.inner.account_id)?;
        let mut restored = 0;
        for row in rows {
            let Some(job_id) = row.job_id().map(str::to_string) else {
                warn!(post_id = row.id, "pending row without correlation key");
                continue;
            };
            let when = if row.scheduled_time <= now {
                now + Duration::seconds(RESTORE_GRACE_SECS)
            } else {
                row.scheduled_time
            };
            self.spawn_timer(&job_id, &row.title, when);
            restored += 1;
        }
        if restored > 0 {
            info!(count = restored, account_id = self.inner.account_id, "timers restored");
        }
        Ok(restored)
    }

    /// Number of armed timers.
    pub fn active_jobs(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Next armed fire time, if any timer is pending.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.inner
            .jobs
            .iter()
            .map(|e| e.value().scheduled_time)
            .min()
    }

    /// Abort every armed timer. Durable rows stay `scheduled` and are
    /// picked up again by [`restore_from_store`](Self::restore_from_store)
    /// or the daemon's due-post sweep.
    pub fn shutdown(&self) {
        for entry in self.inner.jobs.iter() {
            entry.value().handle.abort();
        }
        self.inner.jobs.clear();
        info!(account_id = self.inner.account_id, "scheduler timers stopped");
    }

    fn spawn_timer(&self, job_id: &str, title: &str, when: DateTime<Utc>) {
        let inner = Arc::clone(&self.inner);
        let id = job_id.to_string();
        let delay = (when - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        let task_id = id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match fire(Arc::clone(&inner), &task_id).await {
                Ok(true) => {}
                Ok(false) => info!(job_id = %task_id, "timer fired with nothing to publish"),
                Err(e) => error!(job_id = %task_id, "timer publish failed: {e}"),
            }
        });

        let entry = JobEntry {
            handle: task.abort_handle(),
            scheduled_time: when,
            title: title.to_string(),
        };
        if let Some(old) = self.inner.jobs.insert(id, entry) {
            old.handle.abort();
        }
    }
}

/// Publish one job's post. Free function so timer tasks can run it while
/// holding only the `Arc<Inner>`.
async fn fire(inner: Arc<Inner>, job_id: &str) -> Result<bool> {
    inner.jobs.remove(job_id);

    let Some(row) = inner.store.find_by_correlation(&correlation_key(job_id))? else {
        warn!(%job_id, "no durable row for fired job");
        return Ok(false);
    };
    // Re-validate against the store: a cancel or a daemon-side publish may
    // have won the race since this timer was armed.
    if row.status != PostStatus::Scheduled {
        info!(%job_id, status = %row.status, "skipping publish, post no longer scheduled");
        return Ok(false);
    }

    let content = row.content();
    let mut remote_id: Option<String> = None;
    let mut any_failed = false;
    for platform in inner.profile.platforms() {
        match inner.publishers.publish(&platform, &content, &inner.creds).await {
            Ok(receipt) => {
                info!(%job_id, %platform, remote = %receipt.post_id, "published");
                if remote_id.is_none() {
                    remote_id = Some(if platform == "vk" {
                        format!("-{}_{}", inner.creds.group_id, receipt.post_id)
                    } else {
                        receipt.post_id
                    });
                }
            }
            Err(e) => {
                error!(%job_id, %platform, "publish failed: {e}");
                any_failed = true;
            }
        }
    }

    // Posts already delivered to other platforms are not withdrawn; the row
    // just records that the full set did not go out.
    if any_failed {
        inner.store.mark_failed(row.id)?;
        return Ok(false);
    }

    inner.store.mark_published(row.id, remote_id.as_deref())?;
    maybe_request_refill(&inner);
    Ok(true)
}

/// After a successful publish, ask for fresh content once the queue is empty.
fn maybe_request_refill(inner: &Inner) {
    let Some(tx) = &inner.refill_tx else {
        return;
    };
    match inner.store.pending_count(inner.account_id) {
        Ok(0) => {
            if tx
                .try_send(RefillRequest {
                    account_id: inner.account_id,
                })
                .is_err()
            {
                warn!(account_id = inner.account_id, "refill channel full or closed");
            }
        }
        Ok(_) => {}
        Err(e) => error!("pending count query failed: {e}"),
    }
}
