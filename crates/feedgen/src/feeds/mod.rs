//! Feeds: named post matchers plus their scoped persistence handles.
//!
//! The set of feeds is fixed at startup from configured names via the [`FeedKind`] registry.
//! A [`Matcher`] is a pure predicate over an event and its decoded post; it never touches the
//! store. Persistence goes through the feed's [`FeedStore`], driven by the dispatcher.

mod composer_errors;
mod english_text;
mod hashtags;
mod kubecon;
mod kubecon_party;

pub use composer_errors::ComposerErrors;
pub use english_text::EnglishText;
pub use hashtags::Year;
pub use kubecon::KubeCon;
pub use kubecon_party::KubeConParty;

use crate::error::MatchError;
use crate::event::Event;
use crate::record::Post;
use crate::store::{CheckpointStore, FeedStore};
use std::collections::HashSet;
use std::sync::Arc;

/// Decides whether a post belongs in a feed.
pub trait Matcher: Send + Sync {
    /// Must depend only on its inputs. An `Err` is local to this feed.
    fn matches(&self, event: &Event, post: &Post) -> Result<bool, MatchError>;
}

/// A configured feed.
pub struct Feed {
    name: Arc<str>,
    matcher: Box<dyn Matcher>,
    store: FeedStore,
    span: tracing::Span,
}

impl Feed {
    pub fn new(
        name: impl Into<Arc<str>>,
        matcher: impl Matcher + 'static,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let name: Arc<str> = name.into();
        let span = tracing::info_span!("feed", feed = %name);
        Self {
            store: FeedStore::new(Arc::clone(&name), store),
            matcher: Box::new(matcher),
            name,
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    /// Logging span carrying this feed's name.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Registry of the feeds this binary knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    ComposerErrors,
    EnglishText,
    KubeCon,
    KubeConParty,
}

impl FeedKind {
    pub const ALL: [FeedKind; 4] = [
        FeedKind::ComposerErrors,
        FeedKind::EnglishText,
        FeedKind::KubeCon,
        FeedKind::KubeConParty,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ComposerErrors => "composer-errors",
            Self::EnglishText => "english-text",
            Self::KubeCon => "kubecon",
            Self::KubeConParty => "kubecon-party",
        }
    }

    pub fn build(&self, store: Arc<dyn CheckpointStore>) -> Feed {
        match self {
            Self::ComposerErrors => Feed::new(self.name(), ComposerErrors, store),
            Self::EnglishText => Feed::new(self.name(), EnglishText, store),
            Self::KubeCon => Feed::new(self.name(), KubeCon, store),
            Self::KubeConParty => Feed::new(self.name(), KubeConParty, store),
        }
    }
}

/// Build feeds for the configured names, in order.
///
/// Unknown names are skipped so that enabling or retiring a feed is purely a configuration
/// change. Repeated names keep their first occurrence.
pub fn build_feeds(names: &[String], store: &Arc<dyn CheckpointStore>) -> Vec<Feed> {
    let mut seen = HashSet::new();
    let mut feeds = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        let Some(kind) = FeedKind::from_name(name) else {
            tracing::debug!(feed = name, "ignoring unknown feed name");
            continue;
        };
        if seen.insert(kind) {
            feeds.push(kind.build(Arc::clone(store)));
        }
    }
    feeds
}
