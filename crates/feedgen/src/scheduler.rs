//! Checkpoint scheduler: periodically writes the latest cursor to every feed's checkpoint and
//! logs throughput.
//!
//! Runs as its own task, independent of event arrival. Checkpoint writes are best-effort: a
//! failed write is logged for that feed and retried on the next tick with a fresher cursor.

use crate::cursor::{Cursor, RunState};
use crate::feeds::Feed;
use crate::transport::{ReadCounters, ReadStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;

/// Throughput snapshot. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub read: ReadStats,
    pub latest_cursor: Cursor,
    pub lag: Duration,
}

pub struct CheckpointScheduler {
    feeds: Arc<[Feed]>,
    state: Arc<RunState>,
    counters: Arc<ReadCounters>,
    interval: Duration,
    /// Log stats every N ticks; `None` disables stats.
    stats_every: Option<u32>,
    span: tracing::Span,
}

impl CheckpointScheduler {
    pub fn new(
        feeds: Arc<[Feed]>,
        state: Arc<RunState>,
        counters: Arc<ReadCounters>,
        interval: Duration,
    ) -> Self {
        Self {
            feeds,
            state,
            counters,
            interval,
            stats_every: None,
            span: tracing::info_span!("scheduler"),
        }
    }

    /// Log throughput every `every` ticks.
    pub fn with_stats(mut self, every: u32) -> Self {
        self.stats_every = (every > 0).then_some(every);
        self
    }

    /// Tick until `shutdown` flips to true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let span = self.span.clone();
        self.run_inner(shutdown).instrument(span).await
    }

    async fn run_inner(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ticks += 1;
                    let feeds = Arc::clone(&self.feeds);
                    let cursor = self.state.latest_cursor();
                    if let Err(e) =
                        tokio::task::spawn_blocking(move || write_checkpoints(&feeds, cursor)).await
                    {
                        tracing::error!(%cursor, reason = %e, "checkpoint task failed");
                    }
                    if is_stats_tick(self.stats_every, ticks) {
                        let t = self.throughput();
                        tracing::info!(
                            events_read = t.read.events,
                            bytes_read = t.read.bytes,
                            avg_event_size = t.read.avg_event_size(),
                            latest_cursor = %t.latest_cursor,
                            lag_s = t.lag.as_secs_f64(),
                            "stats"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!(latest_cursor = %self.state.latest_cursor(), "shutdown");
                    return;
                }
            }
        }
    }

    /// Write the current cursor to every feed. Returns how many writes failed.
    pub fn checkpoint_feeds(&self) -> usize {
        write_checkpoints(&self.feeds, self.state.latest_cursor())
    }

    pub fn throughput(&self) -> Throughput {
        let latest_cursor = self.state.latest_cursor();
        Throughput {
            read: self.counters.snapshot(),
            latest_cursor,
            lag: latest_cursor.lag(),
        }
    }
}

/// Store writes block, so the ticker runs this off the async workers.
fn write_checkpoints(feeds: &[Feed], cursor: Cursor) -> usize {
    let mut failed = 0;
    for feed in feeds {
        if let Err(e) = feed.store().save_checkpoint(cursor) {
            failed += 1;
            tracing::error!(parent: feed.span(), %cursor, reason = %e, "failed to save cursor");
        }
    }
    failed
}

/// Ticks are counted from 1; stats fire on every `every`-th one.
fn is_stats_tick(every: Option<u32>, tick: u64) -> bool {
    every.is_some_and(|n| tick > 0 && tick % u64::from(n) == 0)
}
