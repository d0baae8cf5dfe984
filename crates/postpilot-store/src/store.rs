use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use postpilot_core::types::{Account, BusinessProfile, PostStatus};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::PostRow;

const POST_COLUMNS: &str = "id, account_id, title, text, topic, image_url,
        scheduled_time, published_time, status, remote_post_id";

/// Durable content repository.
///
/// Thread-safe: wraps the SQLite connection in a Mutex. Each caller
/// (scheduler, daemon) opens its own `ContentStore` over its own connection
/// so polling queries never contend with timer-path writes.
pub struct ContentStore {
    db: Mutex<Connection>,
}

impl ContentStore {
    /// Open a store over `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    // --- posts -------------------------------------------------------------

    /// Persist a freshly scheduled post. `correlation` is the `temp_<job-id>`
    /// key that links the durable row to the in-memory job until a real
    /// remote id replaces it.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_scheduled_post(
        &self,
        account_id: i64,
        title: &str,
        text: &str,
        topic: &str,
        image_url: Option<&str>,
        scheduled_time: DateTime<Utc>,
        correlation: &str,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO posts
             (account_id, title, text, topic, image_url, scheduled_time,
              published_time, status, remote_post_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 'scheduled', ?7, ?8, ?8)",
            rusqlite::params![
                account_id,
                title,
                text,
                topic,
                image_url,
                scheduled_time.to_rfc3339(),
                correlation,
                now
            ],
        )?;
        let id = db.last_insert_rowid();
        debug!(post_id = id, %correlation, "scheduled post persisted");
        Ok(id)
    }

    /// Look a post up by its `temp_<job-id>` correlation key.
    pub fn find_by_correlation(&self, correlation: &str) -> Result<Option<PostRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE remote_post_id = ?1"
        ))?;
        let row = stmt
            .query_map([correlation], map_post_row)?
            .filter_map(|r| r.ok())
            .flatten()
            .next();
        Ok(row)
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare_cached(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))?;
        let row = stmt
            .query_map([id], map_post_row)?
            .filter_map(|r| r.ok())
            .flatten()
            .next();
        Ok(row)
    }

    /// Record a successful publication. `remote_post_id` replaces the temp
    /// correlation key when the platform returned a real id.
    pub fn mark_published(&self, id: i64, remote_post_id: Option<&str>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = match remote_post_id {
            Some(remote) => db.execute(
                "UPDATE posts SET status = 'published', published_time = ?1,
                    remote_post_id = ?2, updated_at = ?1
                 WHERE id = ?3",
                rusqlite::params![now, remote, id],
            )?,
            None => db.execute(
                "UPDATE posts SET status = 'published', published_time = ?1,
                    updated_at = ?1
                 WHERE id = ?2",
                rusqlite::params![now, id],
            )?,
        };
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        info!(post_id = id, "post marked published");
        Ok(())
    }

    pub fn mark_failed(&self, id: i64) -> Result<()> {
        self.set_status(id, PostStatus::Failed)
    }

    pub fn set_status(&self, id: i64, status: PostStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = db.execute(
            "UPDATE posts SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.to_string(), now, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn update_scheduled_time(&self, id: i64, new_time: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = db.execute(
            "UPDATE posts SET scheduled_time = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![new_time.to_rfc3339(), now, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Queue depth: posts still awaiting publication for one account.
    pub fn pending_count(&self, account_id: i64) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let count = db.query_row(
            "SELECT COUNT(*) FROM posts
             WHERE account_id = ?1 AND status IN ('scheduled', 'draft')",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All `scheduled` posts whose time has arrived — the daemon's
    /// crash-recovery publishing path.
    pub fn due_posts(&self, now: DateTime<Utc>) -> Result<Vec<PostRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE status = 'scheduled' AND scheduled_time <= ?1
             ORDER BY scheduled_time"
        ))?;
        let rows = stmt
            .query_map([now.to_rfc3339()], map_post_row)?
            .filter_map(|r| r.ok())
            .flatten()
            .collect();
        Ok(rows)
    }

    /// All `scheduled` posts for one account, for timer re-registration.
    pub fn pending_posts(&self, account_id: i64) -> Result<Vec<PostRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE account_id = ?1 AND status = 'scheduled'
             ORDER BY scheduled_time"
        ))?;
        let rows = stmt
            .query_map([account_id], map_post_row)?
            .filter_map(|r| r.ok())
            .flatten()
            .collect();
        Ok(rows)
    }

    /// Latest scheduled time for one account — the starting point for
    /// auto-refill scheduling.
    pub fn latest_scheduled_time(&self, account_id: i64) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().unwrap();
        let time: Option<String> = db
            .query_row(
                "SELECT scheduled_time FROM posts
                 WHERE account_id = ?1 AND status = 'scheduled'
                 ORDER BY scheduled_time DESC LIMIT 1",
                [account_id],
                |row| row.get(0),
            )
            .ok();
        Ok(time.and_then(|t| parse_utc(&t)))
    }

    // --- moderation log ----------------------------------------------------

    pub fn log_moderation(
        &self,
        account_id: i64,
        post_title: &str,
        passed: bool,
        score: f64,
        issues: &[String],
        suggestions: &[String],
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO moderation_log
             (account_id, post_title, passed, score, issues, suggestions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                account_id,
                post_title,
                passed as i64,
                score,
                serde_json::to_string(issues)?,
                serde_json::to_string(suggestions)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn moderation_log_count(&self, account_id: i64) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let count = db.query_row(
            "SELECT COUNT(*) FROM moderation_log WHERE account_id = ?1",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // --- accounts & profiles ----------------------------------------------

    pub fn add_account(&self, group_id: i64, group_name: &str, access_token: &str) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO accounts (group_id, group_name, access_token, is_active)
             VALUES (?1, ?2, ?3, 1)",
            rusqlite::params![group_id, group_name, access_token],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let db = self.db.lock().unwrap();
        let account = db
            .query_row(
                "SELECT id, group_id, group_name, access_token, is_active
                 FROM accounts WHERE id = ?1",
                [id],
                map_account,
            )
            .ok();
        Ok(account)
    }

    pub fn active_accounts(&self) -> Result<Vec<Account>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(
            "SELECT id, group_id, group_name, access_token, is_active
             FROM accounts WHERE is_active = 1 ORDER BY id",
        )?;
        let accounts = stmt
            .query_map([], map_account)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(accounts)
    }

    pub fn upsert_profile(&self, profile: &BusinessProfile) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO profiles
             (account_id, niche, description, target_audience, goals,
              stop_words, topics, brand_tone, connected_platforms,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(account_id) DO UPDATE SET
                niche = ?2, description = ?3, target_audience = ?4, goals = ?5,
                stop_words = ?6, topics = ?7, brand_tone = ?8,
                connected_platforms = ?9, updated_at = ?10",
            rusqlite::params![
                profile.account_id,
                profile.niche,
                profile.description,
                profile.target_audience,
                profile.goals,
                serde_json::to_string(&profile.stop_words)?,
                serde_json::to_string(&profile.topics)?,
                profile.brand_tone,
                serde_json::to_string(&profile.connected_platforms)?,
                now
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, account_id: i64) -> Result<Option<BusinessProfile>> {
        let db = self.db.lock().unwrap();
        let row: Option<(String, String, String, String, String, String, String, String)> = db
            .query_row(
                "SELECT niche, description, target_audience, goals,
                        stop_words, topics, brand_tone, connected_platforms
                 FROM profiles WHERE account_id = ?1",
                [account_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .ok();

        let Some((niche, description, target_audience, goals, stop_words, topics, brand_tone, platforms)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(BusinessProfile {
            account_id,
            niche,
            description,
            target_audience,
            goals,
            stop_words: serde_json::from_str(&stop_words).unwrap_or_default(),
            topics: serde_json::from_str(&topics).unwrap_or_default(),
            brand_tone,
            connected_platforms: serde_json::from_str(&platforms).unwrap_or_default(),
        }))
    }

    // --- themes ------------------------------------------------------------

    pub fn add_theme(&self, account_id: i64, theme_text: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO themes (account_id, theme_text, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![account_id, theme_text, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn theme_texts(&self, account_id: i64) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(
            "SELECT theme_text FROM themes WHERE account_id = ?1 ORDER BY id",
        )?;
        let themes = stmt
            .query_map([account_id], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(themes)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

type RawPostRow = (
    i64,
    i64,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    String,
    Option<String>,
);

fn map_post_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<PostRow>> {
    let raw: RawPostRow = (
        row.get(0)?, // id
        row.get(1)?, // account_id
        row.get(2)?, // title
        row.get(3)?, // text
        row.get(4)?, // topic
        row.get(5)?, // image_url
        row.get(6)?, // scheduled_time
        row.get(7)?, // published_time
        row.get(8)?, // status
        row.get(9)?, // remote_post_id
    );
    Ok(build_post_row(raw))
}

fn build_post_row(raw: RawPostRow) -> Option<PostRow> {
    let (id, account_id, title, text, topic, image_url, sched, published, status, remote) = raw;
    Some(PostRow {
        id,
        account_id,
        title,
        text,
        topic,
        image_url,
        scheduled_time: parse_utc(&sched)?,
        published_time: published.as_deref().and_then(parse_utc),
        status: PostStatus::from_str(&status).ok()?,
        remote_post_id: remote,
    })
}

fn map_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        group_id: row.get(1)?,
        group_name: row.get(2)?,
        access_token: row.get(3)?,
        is_active: row.get::<_, i64>(4)? != 0,
    })
}

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open() -> ContentStore {
        ContentStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn sample_profile(account_id: i64) -> BusinessProfile {
        BusinessProfile {
            account_id,
            niche: "specialty coffee".into(),
            description: "weekly brew guides".into(),
            target_audience: "home baristas".into(),
            goals: "grow the community".into(),
            stop_words: vec!["casino".into()],
            topics: vec!["coffee".into(), "brewing".into()],
            brand_tone: "friendly".into(),
            connected_platforms: vec!["vk".into()],
        }
    }

    #[test]
    fn insert_and_find_by_correlation() {
        let store = open();
        let when = Utc::now() + Duration::hours(2);
        let id = store
            .insert_scheduled_post(1, "Title", "Body", "coffee", None, when, "temp_post_x")
            .unwrap();

        let row = store.find_by_correlation("temp_post_x").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.status, PostStatus::Scheduled);
        assert_eq!(row.job_id(), Some("post_x"));
        assert!(store.find_by_correlation("temp_missing").unwrap().is_none());
    }

    #[test]
    fn publish_replaces_correlation_key() {
        let store = open();
        let id = store
            .insert_scheduled_post(1, "T", "B", "t", None, Utc::now(), "temp_a")
            .unwrap();
        store.mark_published(id, Some("-42_777")).unwrap();

        let row = store.get_post(id).unwrap().unwrap();
        assert_eq!(row.status, PostStatus::Published);
        assert_eq!(row.remote_post_id.as_deref(), Some("-42_777"));
        assert!(row.published_time.is_some());
    }

    #[test]
    fn pending_count_spans_scheduled_and_draft() {
        let store = open();
        let a = store
            .insert_scheduled_post(7, "a", "x", "t", None, Utc::now(), "temp_a")
            .unwrap();
        store
            .insert_scheduled_post(7, "b", "x", "t", None, Utc::now(), "temp_b")
            .unwrap();
        store.set_status(a, PostStatus::Draft).unwrap();
        assert_eq!(store.pending_count(7).unwrap(), 2);

        store.set_status(a, PostStatus::Published).unwrap();
        assert_eq!(store.pending_count(7).unwrap(), 1);
        // Other accounts are not counted.
        assert_eq!(store.pending_count(8).unwrap(), 0);
    }

    #[test]
    fn due_posts_only_returns_arrived_scheduled_rows() {
        let store = open();
        let now = Utc::now();
        store
            .insert_scheduled_post(1, "past", "x", "t", None, now - Duration::minutes(5), "temp_p")
            .unwrap();
        store
            .insert_scheduled_post(1, "future", "x", "t", None, now + Duration::hours(1), "temp_f")
            .unwrap();
        let cancelled = store
            .insert_scheduled_post(1, "gone", "x", "t", None, now - Duration::hours(1), "temp_c")
            .unwrap();
        store.set_status(cancelled, PostStatus::Cancelled).unwrap();

        let due = store.due_posts(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].title, "past");
    }

    #[test]
    fn latest_scheduled_time_picks_maximum() {
        let store = open();
        let now = Utc::now();
        store
            .insert_scheduled_post(1, "a", "x", "t", None, now + Duration::days(1), "temp_1")
            .unwrap();
        store
            .insert_scheduled_post(1, "b", "x", "t", None, now + Duration::days(3), "temp_2")
            .unwrap();
        let latest = store.latest_scheduled_time(1).unwrap().unwrap();
        assert!((latest - (now + Duration::days(3))).num_seconds().abs() <= 1);
        assert!(store.latest_scheduled_time(2).unwrap().is_none());
    }

    #[test]
    fn profile_roundtrip() {
        let store = open();
        let account = store.add_account(4242, "Brew Club", "token").unwrap();
        let profile = sample_profile(account);
        store.upsert_profile(&profile).unwrap();

        let loaded = store.get_profile(account).unwrap().unwrap();
        assert_eq!(loaded.niche, "specialty coffee");
        assert_eq!(loaded.stop_words, vec!["casino".to_string()]);
        assert_eq!(loaded.topics.len(), 2);

        // Upsert overwrites in place.
        let mut updated = profile.clone();
        updated.niche = "tea".into();
        store.upsert_profile(&updated).unwrap();
        assert_eq!(store.get_profile(account).unwrap().unwrap().niche, "tea");
    }

    #[test]
    fn moderation_log_rows_accumulate() {
        let store = open();
        store
            .log_moderation(3, "ok post", true, 0.9, &[], &[])
            .unwrap();
        store
            .log_moderation(3, "bad post", false, 0.3, &["stop word: casino".into()], &[])
            .unwrap();
        assert_eq!(store.moderation_log_count(3).unwrap(), 2);
    }

    #[test]
    fn theme_archive_roundtrip() {
        let store = open();
        store.add_theme(1, "latte art basics").unwrap();
        store.add_theme(1, "v60 recipe").unwrap();
        store.add_theme(2, "other account").unwrap();
        assert_eq!(
            store.theme_texts(1).unwrap(),
            vec!["latte art basics".to_string(), "v60 recipe".to_string()]
        );
    }
}
