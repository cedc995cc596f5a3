//! Case-insensitive hashtag matching with optional year suffixes (`KubeCon`, `KubeCon25`,
//! `KubeCon2025`).

use crate::record::Post;
use chrono::{Datelike, Utc};

/// Year suffixes accepted after a hashtag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Year {
    full: String,
    short: String,
}

impl Year {
    pub fn new(year: i32) -> Self {
        Self {
            full: format!("{year:04}"),
            short: format!("{:02}", year.rem_euclid(100)),
        }
    }

    pub fn current() -> Self {
        Self::new(Utc::now().year())
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn short(&self) -> &str {
        &self.short
    }
}

/// True if any tag facet on the post names one of `hashtags`, optionally followed by the year.
pub(crate) fn has_hashtag(post: &Post, hashtags: &[&str], year: &Year) -> bool {
    post.tags()
        .any(|tag| hashtags.iter().any(|h| tag_matches(tag, h, year)))
}

// Upstream compared the tag against `hashtag + year` the other way round, so a year-suffixed
// tag never matched through a facet. Here `tag` may be `hashtag`, `hashtag+YYYY` or `hashtag+YY`.
fn tag_matches(tag: &str, hashtag: &str, year: &Year) -> bool {
    if tag.eq_ignore_ascii_case(hashtag) {
        return true;
    }
    let (Some(head), Some(suffix)) = (tag.get(..hashtag.len()), tag.get(hashtag.len()..)) else {
        return false;
    };
    head.eq_ignore_ascii_case(hashtag) && (suffix == year.full || suffix == year.short)
}
