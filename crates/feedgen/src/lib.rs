//! Bluesky feed generator backend: consumes the Jetstream firehose and records matching posts.
//!
//! - **StreamDriver**: reconnect loop over a [Transport] ([JetstreamClient] in production),
//!   resuming at the latest dispatched cursor and skipping one microsecond past corrupt frames.
//! - **Dispatcher**: decodes post commits, runs every configured [Feed]'s [Matcher] and persists
//!   matches through the feed's [FeedStore].
//! - **CheckpointScheduler**: writes the latest cursor to every feed on a fixed interval so a
//!   restart resumes from the earliest feed checkpoint ([resume]).
//! - **Consumer**: startup sequence tying the above together.

pub mod config;
pub mod consumer;
pub mod cursor;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod event;
pub mod feeds;
pub mod record;
pub mod scheduler;
pub mod store;
pub mod transport;

pub use config::{ConsumerConfig, ReconnectionConfig};
pub use consumer::Consumer;
pub use cursor::{resume, Cursor, Resume, ResumeSource, RunState};
pub use dispatcher::{Dispatcher, EventHandler};
pub use driver::StreamDriver;
pub use error::{ConsumerError, DecodeError, DispatchError, MatchError, StoreError};
pub use event::{Commit, Event, EventKind, Operation};
pub use feeds::{build_feeds, Feed, FeedKind, Matcher};
pub use record::Post;
pub use scheduler::{CheckpointScheduler, Throughput};
pub use store::{CheckpointStore, FeedMatch, FeedStore, SqliteStore};
pub use transport::{
    FailureClass, JetstreamClient, JetstreamConfig, ReadCounters, ReadStats, Transport,
    TransportError,
};
