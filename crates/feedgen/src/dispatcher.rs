//! Event dispatcher: the per-event hot path.
//!
//! Decodes post commits, runs every feed's matcher in registration order, persists matches
//! and advances the shared cursor. Events are handled strictly one at a time.
//!
//! # Failure handling
//!
//! - A record that fails to decode is logged and skipped; the cursor still advances.
//! - A matcher that errors or panics only loses that feed's verdict for this event.
//! - A failed match write is returned to the caller and the cursor is left where it was.

use crate::cursor::RunState;
use crate::error::{DispatchError, MatchError};
use crate::event::{Commit, Event};
use crate::feeds::Feed;
use crate::record::Post;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Per-event sink the transport pushes into.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event) -> Result<(), DispatchError>;
}

pub struct Dispatcher {
    feeds: Arc<[Feed]>,
    state: Arc<RunState>,
    span: tracing::Span,
}

impl Dispatcher {
    pub fn new(feeds: Arc<[Feed]>, state: Arc<RunState>) -> Self {
        Self {
            feeds,
            state,
            span: tracing::info_span!("dispatcher"),
        }
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    fn dispatch(&self, event: &Event, commit: &Commit, post: &Post) -> Result<(), DispatchError> {
        let cursor = event.cursor();
        for feed in self.feeds.iter() {
            let matched = match run_matcher(feed, event, post) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(
                        parent: feed.span(),
                        did = %event.did,
                        rkey = %commit.rkey,
                        %cursor,
                        reason = %e,
                        "matcher failed, skipping feed for this post"
                    );
                    continue;
                }
            };
            if !matched {
                continue;
            }
            tracing::info!(
                parent: feed.span(),
                did = %event.did,
                rkey = %commit.rkey,
                text = %post.text,
                "post matched"
            );
            feed.store()
                .record_match(cursor, &event.did, &commit.rkey)
                .map_err(|source| DispatchError::PersistMatch {
                    feed: feed.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl EventHandler for Dispatcher {
    fn handle(&self, event: &Event) -> Result<(), DispatchError> {
        let _enter = self.span.enter();
        if let Some(commit) = event.post_commit() {
            match Post::decode(commit) {
                Ok(post) => self.dispatch(event, commit, &post)?,
                Err(e) => {
                    tracing::error!(
                        did = %event.did,
                        rkey = %commit.rkey,
                        record = commit.raw_record().unwrap_or_default(),
                        reason = %e,
                        "failed to unmarshal post"
                    );
                }
            }
        }
        self.state.set_latest_cursor(event.cursor());
        Ok(())
    }
}

fn run_matcher(feed: &Feed, event: &Event, post: &Post) -> Result<bool, MatchError> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| feed.matcher().matches(event, post))) {
        Ok(result) => result,
        Err(panic) => {
            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(MatchError::Panicked(msg))
        }
    }
}
