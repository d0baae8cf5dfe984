use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use postpilot_ai::AiService;
use postpilot_core::types::PostStatus;
use postpilot_platform::ContentPlatform;
use postpilot_publishers::PublisherRegistry;
use postpilot_scheduler::{PostingScheduler, RefillRequest};
use postpilot_store::{ContentStore, PostRow};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Standalone publication worker.
///
/// Sweeps the store for `scheduled` posts whose time has arrived and
/// publishes them directly. This is the crash-recovery path: a post whose
/// in-process timer died with its process is picked up here on the next
/// poll. The same loop keeps every active account's queue topped up.
pub struct PublisherDaemon {
    store: Arc<ContentStore>,
    ai: Arc<AiService>,
    publishers: Arc<PublisherRegistry>,
    refill_tx: mpsc::Sender<RefillRequest>,
    poll_secs: u64,
    refill_count: usize,
}

impl PublisherDaemon {
    pub fn new(
        store: Arc<ContentStore>,
        ai: Arc<AiService>,
        publishers: Arc<PublisherRegistry>,
        refill_tx: mpsc::Sender<RefillRequest>,
        poll_secs: u64,
        refill_count: usize,
    ) -> Self {
        Self {
            store,
            ai,
            publishers,
            refill_tx,
            poll_secs,
            refill_count,
        }
    }

    /// Poll until `shutdown` broadcasts `true`. Tick failures are logged
    /// and the loop continues.
    pub async fn run(
        self,
        mut refill_rx: mpsc::Receiver<RefillRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(poll_secs = self.poll_secs, "publisher daemon started");
        if let Err(e) = self.restore_timers() {
            error!("timer restore failed: {e}");
        }
        let mut interval = tokio::time::interval(Duration::from_secs(self.poll_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("daemon tick failed: {e}");
                    }
                }
                Some(req) = refill_rx.recv() => {
                    info!(account_id = req.account_id, "refill requested");
                    self.replenish(req.account_id).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("publisher daemon shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full pass: publish everything due, then top up drained queues.
    pub async fn tick(&self) -> anyhow::Result<()> {
        self.process_due_posts().await?;

        for account in self.store.active_accounts()? {
            if self.store.pending_count(account.id)? == 0 {
                info!(account_id = account.id, "queue empty, replenishing");
                self.replenish(account.id).await;
            }
        }
        Ok(())
    }

    /// Re-arm a timer for every `scheduled` row so pending posts fire at
    /// their exact instant instead of waiting for the next poll sweep.
    /// The sweep stays as the backstop for accounts without a profile.
    fn restore_timers(&self) -> anyhow::Result<usize> {
        let mut restored = 0;
        for account in self.store.active_accounts()? {
            if let Some(platform) = self.build_platform(account.id)? {
                restored += platform.scheduler().restore_from_store()?;
            }
        }
        if restored > 0 {
            info!(count = restored, "pending timers restored from store");
        }
        Ok(restored)
    }

    async fn process_due_posts(&self) -> anyhow::Result<()> {
        let due = self.store.due_posts(Utc::now())?;
        if due.is_empty() {
            return Ok(());
        }
        info!(count = due.len(), "due posts found");
        for row in due {
            if let Err(e) = self.publish_due(&row).await {
                error!(post_id = row.id, "due-post publish failed: {e}");
            }
        }
        Ok(())
    }

    async fn publish_due(&self, row: &PostRow) -> anyhow::Result<()> {
        // A timer task may have finished this row since the sweep query ran.
        let Some(fresh) = self.store.get_post(row.id)? else {
            return Ok(());
        };
        if fresh.status != PostStatus::Scheduled {
            return Ok(());
        }

        let Some(account) = self.store.get_account(row.account_id)? else {
            warn!(post_id = row.id, account_id = row.account_id, "post references missing account");
            self.store.mark_failed(row.id)?;
            return Ok(());
        };
        let platforms = self
            .store
            .get_profile(row.account_id)?
            .map(|p| p.platforms())
            .unwrap_or_else(|| vec!["vk".to_string()]);
        let creds = account.credentials();
        let content = row.content();

        let mut remote_id: Option<String> = None;
        let mut any_failed = false;
        for platform in platforms {
            match self.publishers.publish(&platform, &content, &creds).await {
                Ok(receipt) => {
                    info!(post_id = row.id, %platform, remote = %receipt.post_id, "overdue post published");
                    if remote_id.is_none() {
                        remote_id = Some(if platform == "vk" {
                            format!("-{}_{}", creds.group_id, receipt.post_id)
                        } else {
                            receipt.post_id
                        });
                    }
                }
                Err(e) => {
                    error!(post_id = row.id, %platform, "publish failed: {e}");
                    any_failed = true;
                }
            }
        }

        if any_failed {
            self.store.mark_failed(row.id)?;
            return Ok(());
        }

        self.store.mark_published(row.id, remote_id.as_deref())?;
        if self.store.pending_count(row.account_id)? == 0 {
            let _ = self.refill_tx.try_send(RefillRequest {
                account_id: row.account_id,
            });
        }
        Ok(())
    }

    async fn replenish(&self, account_id: i64) {
        match self.build_platform(account_id) {
            Ok(Some(platform)) => match platform.auto_replenish(self.refill_count).await {
                Ok(n) => info!(account_id, scheduled = n, "replenish pass finished"),
                Err(e) => error!(account_id, "replenish failed: {e}"),
            },
            Ok(None) => warn!(account_id, "account or profile missing, skipping replenish"),
            Err(e) => error!(account_id, "replenish setup failed: {e}"),
        }
    }

    /// Build a transient pipeline for one account. Timers it arms keep
    /// their own handles on the shared store and registry, so they outlive
    /// the returned value.
    fn build_platform(&self, account_id: i64) -> anyhow::Result<Option<ContentPlatform>> {
        let Some(account) = self.store.get_account(account_id)? else {
            return Ok(None);
        };
        let Some(profile) = self.store.get_profile(account_id)? else {
            return Ok(None);
        };
        let scheduler = Arc::new(PostingScheduler::new(
            account_id,
            profile.clone(),
            account.credentials(),
            Arc::clone(&self.ai),
            Arc::clone(&self.store),
            Arc::clone(&self.publishers),
            Some(self.refill_tx.clone()),
        ));
        Ok(Some(ContentPlatform::new(
            profile,
            Arc::clone(&self.ai),
            Arc::clone(&self.store),
            scheduler,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use postpilot_ai::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
    use postpilot_core::config::ImageConfig;
    use postpilot_core::types::{AccountCredentials, BusinessProfile, ContentItem};
    use postpilot_publishers::{PublishError, PublishReceipt, Publisher};
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct KeywordProvider;

    #[async_trait]
    impl LlmProvider for KeywordProvider {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let prompt = &req.messages[0].content;
            let content = if prompt.contains("post themes") {
                r#"{"themes": ["morning espresso", "grinder care"]}"#.to_string()
            } else if prompt.contains("You write social-media posts") {
                "Grind fresh, brew better. #coffee".to_string()
            } else if prompt.contains("image-generation prompt") {
                "espresso shot close-up".to_string()
            } else if prompt.contains("best times of day") {
                r#"{"times": ["09:00"]}"#.to_string()
            } else if prompt.contains("topical relevance") {
                r#"{"score": 0.9, "reason": "on topic"}"#.to_string()
            } else {
                r#"{"score": 0.9, "issues": []}"#.to_string()
            };
            Ok(ChatResponse {
                content,
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".into(),
            })
        }
    }

    struct CountingPublisher {
        calls: Arc<AtomicUsize>,
        ok: bool,
    }

    #[async_trait]
    impl Publisher for CountingPublisher {
        fn name(&self) -> &str {
            "vk"
        }

        async fn publish(
            &self,
            _content: &ContentItem,
            _creds: &AccountCredentials,
        ) -> Result<PublishReceipt, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(PublishReceipt {
                    post_id: "99".into(),
                })
            } else {
                Err(PublishError::Api {
                    code: 5,
                    message: "token expired".into(),
                })
            }
        }
    }

    struct Harness {
        daemon: PublisherDaemon,
        store: Arc<ContentStore>,
        calls: Arc<AtomicUsize>,
        refill_rx: mpsc::Receiver<RefillRequest>,
        account_id: i64,
    }

    fn harness(publisher_ok: bool) -> Harness {
        let store = Arc::new(ContentStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let account_id = store.add_account(42, "Brew Club", "token").unwrap();
        store
            .upsert_profile(&BusinessProfile {
                account_id,
                niche: "specialty coffee".into(),
                description: "brew guides".into(),
                target_audience: "home baristas".into(),
                goals: "grow".into(),
                stop_words: vec![],
                topics: vec!["coffee".into()],
                brand_tone: "friendly".into(),
                connected_platforms: vec!["vk".into()],
            })
            .unwrap();

        let ai = Arc::new(AiService::new(
            Arc::new(KeywordProvider),
            "test-model",
            ImageConfig::default(),
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = PublisherRegistry::new();
        registry.register(Box::new(CountingPublisher {
            calls: Arc::clone(&calls),
            ok: publisher_ok,
        }));
        let (refill_tx, refill_rx) = mpsc::channel(8);
        let daemon = PublisherDaemon::new(
            Arc::clone(&store),
            ai,
            Arc::new(registry),
            refill_tx,
            60,
            3,
        );
        Harness {
            daemon,
            store,
            calls,
            refill_rx,
            account_id,
        }
    }

    #[tokio::test]
    async fn overdue_post_is_published_on_tick() {
        let mut h = harness(true);
        let db_id = h
            .store
            .insert_scheduled_post(
                h.account_id,
                "left behind",
                "body",
                "coffee",
                None,
                Utc::now() - ChronoDuration::hours(1),
                "temp_post_20260301_cafe0001",
            )
            .unwrap();

        h.daemon.tick().await.unwrap();

        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        let row = h.store.get_post(db_id).unwrap().unwrap();
        assert_eq!(row.status, PostStatus::Published);
        assert_eq!(row.remote_post_id.as_deref(), Some("-42_99"));
        // The queue just drained, so a refill was requested.
        assert_eq!(h.refill_rx.try_recv().unwrap().account_id, h.account_id);
    }

    #[tokio::test]
    async fn failed_publish_marks_row_failed() {
        let mut h = harness(false);
        let db_id = h
            .store
            .insert_scheduled_post(
                h.account_id,
                "doomed",
                "body",
                "coffee",
                None,
                Utc::now() - ChronoDuration::minutes(5),
                "temp_post_20260301_cafe0002",
            )
            .unwrap();

        h.daemon.process_due_posts().await.unwrap();

        assert_eq!(
            h.store.get_post(db_id).unwrap().unwrap().status,
            PostStatus::Failed
        );
        assert!(h.refill_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelled_post_is_left_alone() {
        let h = harness(true);
        let db_id = h
            .store
            .insert_scheduled_post(
                h.account_id,
                "cancelled",
                "body",
                "coffee",
                None,
                Utc::now() - ChronoDuration::hours(1),
                "temp_post_20260301_cafe0003",
            )
            .unwrap();
        h.store.set_status(db_id, PostStatus::Cancelled).unwrap();

        h.daemon.process_due_posts().await.unwrap();
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restored_timers_fire_between_poll_sweeps() {
        let h = harness(true);
        let db_id = h
            .store
            .insert_scheduled_post(
                h.account_id,
                "imminent",
                "body",
                "coffee",
                None,
                Utc::now() + ChronoDuration::milliseconds(50),
                "temp_post_20260301_cafe0005",
            )
            .unwrap();

        // No tick runs here; the startup restore alone must publish it.
        assert_eq!(h.daemon.restore_timers().unwrap(), 1);
        for _ in 0..100 {
            if h.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.store.get_post(db_id).unwrap().unwrap().status,
            PostStatus::Published
        );
    }

    #[tokio::test]
    async fn empty_queue_triggers_generation() {
        let h = harness(true);
        h.daemon.tick().await.unwrap();

        // Two themes generated, both approved and scheduled for the future.
        assert_eq!(h.store.pending_count(h.account_id).unwrap(), 2);
        assert!(h.store.moderation_log_count(h.account_id).unwrap() >= 2);
    }

    #[tokio::test]
    async fn nonempty_queue_is_not_refilled() {
        let h = harness(true);
        h.store
            .insert_scheduled_post(
                h.account_id,
                "future",
                "body",
                "coffee",
                None,
                Utc::now() + ChronoDuration::days(1),
                "temp_post_20260301_cafe0004",
            )
            .unwrap();

        h.daemon.tick().await.unwrap();
        assert_eq!(h.store.pending_count(h.account_id).unwrap(), 1);
    }
}
