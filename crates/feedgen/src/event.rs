//! Jetstream event envelope.
//!
//! The commit record is kept as raw JSON until the dispatcher decides it needs decoding.

use crate::cursor::Cursor;
use serde::Deserialize;
use serde_json::value::RawValue;

/// Collection tag of the only record type this consumer decodes.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// One message from the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Author DID.
    pub did: String,
    pub time_us: i64,
    #[serde(default)]
    pub kind: EventKind,
    #[serde(default)]
    pub commit: Option<Commit>,
}

impl Event {
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.time_us)
    }

    /// The commit, if this is a create or update of a post.
    pub fn post_commit(&self) -> Option<&Commit> {
        self.commit.as_ref().filter(|c| {
            matches!(c.operation, Operation::Create | Operation::Update)
                && c.collection == POST_COLLECTION
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Commit,
    Identity,
    Account,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Other,
}

/// Repository commit carried by a `commit` event.
#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub rev: String,
    pub operation: Operation,
    pub collection: String,
    pub rkey: String,
    /// Undecoded record payload.
    #[serde(default)]
    pub record: Option<Box<RawValue>>,
    #[serde(default)]
    pub cid: Option<String>,
}

impl Commit {
    pub fn raw_record(&self) -> Option<&str> {
        self.record.as_deref().map(RawValue::get)
    }
}
