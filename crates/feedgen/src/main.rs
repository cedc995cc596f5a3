//! Feed generator consumer daemon.
//!
//! Follows the Jetstream firehose, records posts matched by the enabled feeds in SQLite and
//! checkpoints its position once per second.
//!
//! # Usage
//!
//! ```bash
//! # All feeds, resume from saved checkpoints
//! feedgen
//!
//! # Two feeds, start from an explicit cursor, log throughput
//! feedgen --feeds kubecon,english-text --cursor 1733000000000000 --stats
//! ```
//!
//! SIGINT and SIGTERM stop the stream; the last periodic checkpoint is what a restart resumes
//! from.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use feedgen::{
    transport::DEFAULT_JETSTREAM_URL, CheckpointStore, Consumer, ConsumerConfig, Cursor,
    FeedKind, ReconnectionConfig, SqliteStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Jetstream consumer for Bluesky feeds.
#[derive(Parser, Debug)]
#[command(name = "feedgen")]
#[command(about = "Consume the Bluesky firehose and record posts for custom feeds")]
#[command(version)]
struct Args {
    /// Jetstream subscribe endpoint
    #[arg(long, env = "JETSTREAM_URL", default_value = DEFAULT_JETSTREAM_URL)]
    jetstream_url: String,

    /// Start cursor in unix microseconds; 0 resumes from saved checkpoints
    #[arg(long, env = "START_CURSOR", default_value_t = 0)]
    cursor: i64,

    /// Feeds to enable (comma-separated); defaults to every known feed
    #[arg(long, env = "FEEDS", value_delimiter = ',')]
    feeds: Option<Vec<String>>,

    /// Log throughput statistics
    #[arg(long, env = "STATS")]
    stats: bool,

    /// SQLite database path
    #[arg(long, env = "DB_PATH", default_value = "./data/feeds.db")]
    db_path: PathBuf,

    /// Checkpoint interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    checkpoint_interval_ms: u64,

    /// Log statistics every N checkpoints
    #[arg(long, default_value_t = 5)]
    stats_every: u32,

    /// First reconnect backoff in milliseconds (0 retries immediately)
    #[arg(long, default_value_t = 0)]
    initial_backoff_ms: u64,

    /// Upper bound for the reconnect backoff in milliseconds
    #[arg(long, default_value_t = 30_000)]
    max_backoff_ms: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Args {
    fn consumer_config(&self) -> ConsumerConfig {
        let feed_names = self.feeds.clone().unwrap_or_else(|| {
            FeedKind::ALL.iter().map(|k| k.name().to_string()).collect()
        });
        ConsumerConfig {
            jetstream_url: self.jetstream_url.clone(),
            start_cursor: Cursor::new(self.cursor),
            feed_names,
            stats: self.stats,
            db_path: self.db_path.clone(),
            checkpoint_interval: Duration::from_millis(self.checkpoint_interval_ms.max(1)),
            stats_every: self.stats_every,
            reconnection: ReconnectionConfig {
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
                ..Default::default()
            },
        }
    }
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,feedgen=debug"))
        .context("invalid log filter")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(reason = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(reason = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let config = args.consumer_config();
    tracing::info!(
        jetstream_url = %config.jetstream_url,
        db_path = %config.db_path.display(),
        feeds = ?config.feed_names,
        start_cursor = %config.start_cursor,
        stats = config.stats,
        "feedgen starting"
    );

    let store: Arc<dyn CheckpointStore> = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("failed to open database {}", config.db_path.display()))?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, stopping");
        let _ = shutdown_tx.send(true);
    });

    Consumer::new(config, store)
        .run(shutdown_rx)
        .await
        .context("consumer failed")?;

    tracing::info!("feedgen stopped");
    Ok(())
}
