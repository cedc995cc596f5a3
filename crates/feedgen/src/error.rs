//! Error types for the consumer.
//!
//! Recoverable conditions (decode failures, matcher failures, checkpoint writes) are logged
//! where they happen; only the errors below cross component boundaries.

use thiserror::Error;

/// Durable store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Unavailable(String),
}

/// A commit record that could not be decoded into a post.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("commit has no record")]
    MissingRecord,
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Feed-local predicate failure. Never stops other feeds from running.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("{0}")]
    Failed(String),
    #[error("matcher panicked: {0}")]
    Panicked(String),
}

/// Fatal failure while dispatching one event.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to upsert feed post for {feed}: {source}")]
    PersistMatch {
        feed: String,
        #[source]
        source: StoreError,
    },
}

/// Top-level consumer failure; any of these ends the process with a non-zero status.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to initialize feed {feed}: {source}")]
    InitFeed {
        feed: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to get latest cursor for feed {feed}: {source}")]
    ReadCheckpoint {
        feed: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),
}
