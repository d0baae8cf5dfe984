use rusqlite::{Connection, Result};

/// Initialise all postpilot tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_posts_table(conn)?;
    create_moderation_log_table(conn)?;
    create_accounts_table(conn)?;
    create_profiles_table(conn)?;
    create_themes_table(conn)?;
    Ok(())
}

/// The durable projection of every scheduled post plus publication outcome.
///
/// `remote_post_id` carries the `temp_<job-id>` correlation key from
/// scheduling time until a real remote id replaces it after publication.
fn create_posts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS posts (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id      INTEGER NOT NULL,
            title           TEXT NOT NULL,
            text            TEXT NOT NULL,
            topic           TEXT NOT NULL DEFAULT '',
            image_url       TEXT,
            scheduled_time  TEXT NOT NULL,
            published_time  TEXT,
            status          TEXT NOT NULL DEFAULT 'draft',
            remote_post_id  TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        -- Efficient due-post polling: WHERE status = ? AND scheduled_time <= ?
        CREATE INDEX IF NOT EXISTS idx_posts_status_time
            ON posts(status, scheduled_time);
        CREATE INDEX IF NOT EXISTS idx_posts_account
            ON posts(account_id, status);
        CREATE INDEX IF NOT EXISTS idx_posts_remote
            ON posts(remote_post_id);",
    )
}

/// Audit log: one row per moderation verdict, approved or rejected.
fn create_moderation_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS moderation_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id  INTEGER NOT NULL,
            post_title  TEXT NOT NULL,
            passed      INTEGER NOT NULL,
            score       REAL NOT NULL,
            issues      TEXT NOT NULL DEFAULT '[]',
            suggestions TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_modlog_account
            ON moderation_log(account_id, created_at DESC);",
    )
}

fn create_accounts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id     INTEGER NOT NULL,
            group_name   TEXT NOT NULL DEFAULT '',
            access_token TEXT NOT NULL,
            is_active    INTEGER NOT NULL DEFAULT 1
        );",
    )
}

/// One business profile per account; list columns are JSON arrays.
fn create_profiles_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS profiles (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id          INTEGER NOT NULL UNIQUE,
            niche               TEXT NOT NULL DEFAULT '',
            description         TEXT NOT NULL DEFAULT '',
            target_audience     TEXT NOT NULL DEFAULT '',
            goals               TEXT NOT NULL DEFAULT '',
            stop_words          TEXT NOT NULL DEFAULT '[]',
            topics              TEXT NOT NULL DEFAULT '[]',
            brand_tone          TEXT NOT NULL DEFAULT '',
            connected_platforms TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );",
    )
}

/// Archive of already-used post themes, fed back into idea generation.
fn create_themes_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS themes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id  INTEGER NOT NULL,
            theme_text  TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_themes_account
            ON themes(account_id, id DESC);",
    )
}
