//! Durable feed state: per-feed checkpoints and the match log.
//!
//! [`CheckpointStore`] is the seam the consumer depends on; [`SqliteStore`] is the shipped
//! implementation. Each feed only ever sees a [`FeedStore`], a handle scoped to its own name.

use crate::cursor::Cursor;
use crate::error::StoreError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// One persisted match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMatch {
    pub feed_name: String,
    pub cursor: Cursor,
    pub did: String,
    pub rkey: String,
}

/// Feed checkpoints and match log.
///
/// All calls are synchronous; a slow store throttles the consumer directly.
pub trait CheckpointStore: Send + Sync {
    /// Register a feed. Idempotent.
    fn upsert_feed(&self, feed_name: &str) -> Result<(), StoreError>;

    /// Last committed cursor for a feed. `None` if the feed is unknown or never checkpointed.
    fn feed_checkpoint(&self, feed_name: &str) -> Result<Option<Cursor>, StoreError>;

    /// Overwrite a feed's checkpoint.
    fn update_feed_checkpoint(&self, feed_name: &str, cursor: Cursor) -> Result<(), StoreError>;

    /// Record a match. Keyed by `(feed_name, did, rkey)`; a repeat call updates the cursor
    /// (last write wins) and never adds a row.
    fn upsert_feed_match(
        &self,
        feed_name: &str,
        cursor: Cursor,
        did: &str,
        rkey: &str,
    ) -> Result<(), StoreError>;

    /// Newest matches for a feed, by cursor descending.
    fn feed_matches(&self, feed_name: &str, limit: usize) -> Result<Vec<FeedMatch>, StoreError>;
}

/// Persistence handle scoped to one feed.
#[derive(Clone)]
pub struct FeedStore {
    feed_name: Arc<str>,
    store: Arc<dyn CheckpointStore>,
}

impl FeedStore {
    pub fn new(feed_name: impl Into<Arc<str>>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            feed_name: feed_name.into(),
            store,
        }
    }

    pub fn feed_name(&self) -> &str {
        &self.feed_name
    }

    pub fn register(&self) -> Result<(), StoreError> {
        self.store.upsert_feed(&self.feed_name)
    }

    pub fn checkpoint(&self) -> Result<Option<Cursor>, StoreError> {
        self.store.feed_checkpoint(&self.feed_name)
    }

    pub fn save_checkpoint(&self, cursor: Cursor) -> Result<(), StoreError> {
        self.store.update_feed_checkpoint(&self.feed_name, cursor)
    }

    pub fn record_match(&self, cursor: Cursor, did: &str, rkey: &str) -> Result<(), StoreError> {
        self.store
            .upsert_feed_match(&self.feed_name, cursor, did, rkey)
    }

    pub fn matches(&self, limit: usize) -> Result<Vec<FeedMatch>, StoreError> {
        self.store.feed_matches(&self.feed_name, limit)
    }
}

impl std::fmt::Debug for FeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStore")
            .field("feed_name", &self.feed_name)
            .finish_non_exhaustive()
    }
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file, creating parent directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %path.display(), "opening feed database");

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn unix_now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl CheckpointStore for SqliteStore {
    fn upsert_feed(&self, feed_name: &str) -> Result<(), StoreError> {
        let now = Self::unix_now();
        self.conn.lock().execute(
            "INSERT INTO feeds (feed_name, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(feed_name) DO NOTHING",
            params![feed_name, now],
        )?;
        Ok(())
    }

    fn feed_checkpoint(&self, feed_name: &str) -> Result<Option<Cursor>, StoreError> {
        let row: Option<Option<i64>> = self
            .conn
            .lock()
            .query_row(
                "SELECT latest_cursor FROM feeds WHERE feed_name = ?1",
                [feed_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.flatten().map(Cursor::new))
    }

    fn update_feed_checkpoint(&self, feed_name: &str, cursor: Cursor) -> Result<(), StoreError> {
        let now = Self::unix_now();
        self.conn.lock().execute(
            "INSERT INTO feeds (feed_name, latest_cursor, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(feed_name) DO UPDATE SET
                latest_cursor = excluded.latest_cursor,
                updated_at = excluded.updated_at",
            params![feed_name, cursor.time_us(), now],
        )?;
        Ok(())
    }

    fn upsert_feed_match(
        &self,
        feed_name: &str,
        cursor: Cursor,
        did: &str,
        rkey: &str,
    ) -> Result<(), StoreError> {
        let now = Self::unix_now();
        self.conn.lock().execute(
            "INSERT INTO feed_posts (feed_name, time_us, did, rkey, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(feed_name, did, rkey) DO UPDATE SET
                time_us = excluded.time_us",
            params![feed_name, cursor.time_us(), did, rkey, now],
        )?;
        Ok(())
    }

    fn feed_matches(&self, feed_name: &str, limit: usize) -> Result<Vec<FeedMatch>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT feed_name, time_us, did, rkey FROM feed_posts
             WHERE feed_name = ?1 ORDER BY time_us DESC, rkey DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![feed_name, limit as i64], |row| {
                Ok(FeedMatch {
                    feed_name: row.get(0)?,
                    cursor: Cursor::new(row.get(1)?),
                    did: row.get(2)?,
                    rkey: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Create tables on a fresh database. A stamped database is left untouched.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    if schema_version(conn)? == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS feeds (
            feed_name TEXT PRIMARY KEY,
            latest_cursor INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS feed_posts (
            feed_name TEXT NOT NULL,
            time_us INTEGER NOT NULL,
            did TEXT NOT NULL,
            rkey TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            PRIMARY KEY (feed_name, did, rkey)
        );

        CREATE INDEX IF NOT EXISTS idx_feed_posts_time ON feed_posts(feed_name, time_us DESC);
        "#,
    )
}
