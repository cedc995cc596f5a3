//! `composer-errors`: posts where a typed domain was turned into a link card but the text
//! shows it broken apart, e.g. text `"example com"` with a card for `https://example.com`.

use super::Matcher;
use crate::error::MatchError;
use crate::event::Event;
use crate::record::Post;
use regex::Regex;
use std::sync::LazyLock;

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://(([A-Za-z0-9-]+)\.([A-Za-z0-9]+))$").expect("valid domain regex")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct ComposerErrors;

impl Matcher for ComposerErrors {
    fn matches(&self, _event: &Event, post: &Post) -> Result<bool, MatchError> {
        Ok(is_composer_error(post))
    }
}

fn is_composer_error(post: &Post) -> bool {
    let Some(uri) = post.external_uri() else {
        return false;
    };
    let Some(caps) = DOMAIN_REGEX.captures(uri) else {
        return false;
    };
    // A real hyperlink to the same URI means the domain in the text is already linked.
    if post.links().any(|link| link == uri) {
        return false;
    }
    let spaced = format!("{} {}", &caps[2], &caps[3]);
    post.text.contains(&spaced)
}
