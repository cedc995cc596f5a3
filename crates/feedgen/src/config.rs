//! Consumer configuration.

use crate::cursor::Cursor;
use crate::feeds::FeedKind;
use crate::transport::DEFAULT_JETSTREAM_URL;
use std::path::PathBuf;
use std::time::Duration;

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Jetstream subscribe endpoint.
    pub jetstream_url: String,
    /// Explicit start position; zero means resume from checkpoints.
    pub start_cursor: Cursor,
    /// Feeds to enable, by registry name. Unknown names are ignored.
    pub feed_names: Vec<String>,
    /// Log throughput statistics.
    pub stats: bool,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// How often every feed's checkpoint is written.
    pub checkpoint_interval: Duration,
    /// Log statistics every N checkpoint ticks.
    pub stats_every: u32,
    /// Backoff for reconnects at the same cursor.
    pub reconnection: ReconnectionConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            jetstream_url: DEFAULT_JETSTREAM_URL.to_string(),
            start_cursor: Cursor::default(),
            feed_names: FeedKind::ALL.iter().map(|k| k.name().to_string()).collect(),
            stats: false,
            db_path: PathBuf::from("./data/feeds.db"),
            checkpoint_interval: Duration::from_secs(1),
            stats_every: 5,
            reconnection: ReconnectionConfig::default(),
        }
    }
}

/// Reconnection backoff. A zero initial backoff retries immediately, forever.
#[derive(Debug, Clone)]
pub struct ReconnectionConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub jitter: Duration,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl ReconnectionConfig {
    /// No waiting between reconnects.
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Delay before the `attempt`-th consecutive retry (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.initial_backoff.is_zero() || attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}
