//! Stream cursor, the shared run state, and resume-position recovery.
//!
//! A cursor is a Jetstream `time_us` value: microseconds since the Unix epoch. It orders
//! events and is the token handed back to the server on reconnect.

use crate::error::ConsumerError;
use crate::feeds::Feed;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Position in the event stream (microsecond timestamp). Zero means "unset".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(pub i64);

impl Cursor {
    pub fn new(time_us: i64) -> Self {
        Self(time_us)
    }

    /// Cursor for the current wall-clock time.
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_micros())
    }

    pub fn time_us(self) -> i64 {
        self.0
    }

    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    /// The next position after this one (one microsecond later).
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// How far this cursor trails the wall clock. Zero if it is in the future.
    pub fn lag(self) -> Duration {
        let behind = Cursor::now().0.saturating_sub(self.0);
        Duration::from_micros(behind.max(0) as u64)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Cursor {
    fn from(time_us: i64) -> Self {
        Self(time_us)
    }
}

/// Progress shared between the dispatch path and the checkpoint scheduler.
///
/// Written by the dispatcher (and by the driver's skip-forward between connections), read by
/// the scheduler. Readers may observe a value up to one tick stale.
#[derive(Debug, Default)]
pub struct RunState {
    latest_cursor: AtomicI64,
}

impl RunState {
    pub fn new(start: Cursor) -> Self {
        Self {
            latest_cursor: AtomicI64::new(start.0),
        }
    }

    pub fn latest_cursor(&self) -> Cursor {
        Cursor(self.latest_cursor.load(Ordering::Acquire))
    }

    pub fn set_latest_cursor(&self, cursor: Cursor) {
        self.latest_cursor.store(cursor.0, Ordering::Release);
    }

    /// Move past the current position by one unit and return the new cursor.
    pub fn skip_forward(&self) -> Cursor {
        let prev = self.latest_cursor.fetch_add(1, Ordering::AcqRel);
        Cursor(prev.saturating_add(1))
    }
}

/// Where a resume cursor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeSource {
    /// Configured override, used verbatim.
    Explicit,
    /// Minimum of the persisted per-feed checkpoints.
    Checkpoint,
    /// Nothing persisted: start at the current time, skipping the backlog.
    FreshStart,
}

impl ResumeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Checkpoint => "checkpoint",
            Self::FreshStart => "fresh-start",
        }
    }
}

impl fmt::Display for ResumeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved start position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resume {
    pub cursor: Cursor,
    pub source: ResumeSource,
}

/// Compute the start cursor from an explicit override or the feeds' checkpoints.
///
/// Takes the minimum over all feeds with a checkpoint so that no feed misses events; feeds
/// that were further ahead see some events twice, which match persistence absorbs. A read
/// error is fatal; a missing checkpoint is not.
pub fn resume(configured: Cursor, feeds: &[Feed]) -> Result<Resume, ConsumerError> {
    if configured.is_set() {
        return Ok(Resume {
            cursor: configured,
            source: ResumeSource::Explicit,
        });
    }

    let mut min: Option<Cursor> = None;
    for feed in feeds {
        let checkpoint = feed
            .store()
            .checkpoint()
            .map_err(|source| ConsumerError::ReadCheckpoint {
                feed: feed.name().to_string(),
                source,
            })?;
        if let Some(c) = checkpoint.filter(|c| c.is_set()) {
            min = Some(min.map_or(c, |m| m.min(c)));
        }
    }

    Ok(match min {
        Some(cursor) => Resume {
            cursor,
            source: ResumeSource::Checkpoint,
        },
        None => Resume {
            cursor: Cursor::now(),
            source: ResumeSource::FreshStart,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::build_feeds;
    use crate::store::{CheckpointStore, SqliteStore};
    use std::sync::Arc;

    fn feeds_with(store: &Arc<SqliteStore>, names: &[&str]) -> Vec<Feed> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let store: Arc<dyn CheckpointStore> = store.clone();
        let feeds = build_feeds(&names, &store);
        for f in &feeds {
            f.store().register().unwrap();
        }
        feeds
    }

    #[test]
    fn cursor_next_and_default() {
        assert_eq!(Cursor::new(41).next(), Cursor::new(42));
        assert!(!Cursor::default().is_set());
        assert_eq!(Cursor::new(i64::MAX).next(), Cursor::new(i64::MAX));
    }

    #[test]
    fn cursor_lag_is_zero_in_future() {
        let future = Cursor::new(Cursor::now().0 + 60_000_000);
        assert_eq!(future.lag(), Duration::ZERO);
        let past = Cursor::new(Cursor::now().0 - 2_000_000);
        assert!(past.lag() >= Duration::from_secs(2));
    }

    #[test]
    fn run_state_skip_forward() {
        let state = RunState::new(Cursor::new(100));
        assert_eq!(state.skip_forward(), Cursor::new(101));
        assert_eq!(state.latest_cursor(), Cursor::new(101));
        state.set_latest_cursor(Cursor::new(7));
        assert_eq!(state.latest_cursor(), Cursor::new(7));
    }

    #[test]
    fn explicit_override_wins() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let feeds = feeds_with(&store, &["kubecon"]);
        feeds[0].store().save_checkpoint(Cursor::new(5)).unwrap();

        let r = resume(Cursor::new(999), &feeds).unwrap();
        assert_eq!(r.cursor, Cursor::new(999));
        assert_eq!(r.source, ResumeSource::Explicit);
    }

    #[test]
    fn resumes_from_minimum_checkpoint() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let feeds = feeds_with(&store, &["kubecon", "kubecon-party", "composer-errors"]);
        for (feed, c) in feeds.iter().zip([10, 30, 20]) {
            feed.store().save_checkpoint(Cursor::new(c)).unwrap();
        }

        let r = resume(Cursor::default(), &feeds).unwrap();
        assert_eq!(r.cursor, Cursor::new(10));
        assert_eq!(r.source, ResumeSource::Checkpoint);
    }

    #[test]
    fn feeds_without_checkpoint_are_ignored() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let feeds = feeds_with(&store, &["kubecon", "english-text"]);
        feeds[1].store().save_checkpoint(Cursor::new(50)).unwrap();

        let r = resume(Cursor::default(), &feeds).unwrap();
        assert_eq!(r.cursor, Cursor::new(50));
    }

    #[test]
    fn fresh_start_uses_now() {
        let before = Cursor::now();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let feeds = feeds_with(&store, &["kubecon", "english-text"]);

        let r = resume(Cursor::default(), &feeds).unwrap();
        let after = Cursor::now();
        assert_eq!(r.source, ResumeSource::FreshStart);
        assert!(r.cursor >= before && r.cursor <= after);
    }

    #[test]
    fn fresh_start_with_no_feeds() {
        let r = resume(Cursor::default(), &[]).unwrap();
        assert_eq!(r.source, ResumeSource::FreshStart);
    }
}
