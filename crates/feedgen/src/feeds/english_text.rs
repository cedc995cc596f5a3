//! `english-text`: plain English text posts.

use super::Matcher;
use crate::error::MatchError;
use crate::event::Event;
use crate::record::Post;

/// Non-empty posts without an embed whose language tags include English.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishText;

impl Matcher for EnglishText {
    fn matches(&self, _event: &Event, post: &Post) -> Result<bool, MatchError> {
        if post.text.trim().is_empty() || post.embed.is_some() {
            return Ok(false);
        }
        Ok(post.langs.iter().any(|l| is_english(l)))
    }
}

fn is_english(tag: &str) -> bool {
    let primary = tag.split(['-', '_']).next().unwrap_or_default();
    primary.eq_ignore_ascii_case("en")
}
