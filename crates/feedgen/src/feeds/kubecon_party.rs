//! `kubecon-party`: KubeCon posts that are about a party, social or meetup.

use super::hashtags::{has_hashtag, Year};
use super::Matcher;
use crate::error::MatchError;
use crate::event::Event;
use crate::record::Post;
use regex::Regex;
use std::sync::LazyLock;

const KUBECON_HASHTAGS: &[&str] = &[
    "KubeCon",
    "KubeConNA",
    "KubeConEU",
    "KubeConCN",
    "KubeConJP",
    "KubeConIN",
    "KubeConCloudNativeCon",
    "CloudNativeCon",
    "KubeCrawl",
    "CloudNativeFest",
    "KubeCrawlCloudNativeFest",
];

const PARTY_HASHTAGS: &[&str] = &[
    "KubeCrawl",
    "CloudNativeFest",
    "KubeCrawlCloudNativeFest",
    "KubeConParty",
];

static KUBECON_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)\W(KubeCon|KubeConCloudNativeCon|CloudNativeCon)(EU|NA|JP|CN|IN)?(\d{2,4})?(\W|$)")
        .expect("valid kubecon regex")
});

static PARTY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)\W(Party|Parties|Social|Meetup)(\W|$)").expect("valid party regex")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct KubeConParty;

impl KubeConParty {
    fn is_kubecon(post: &Post, year: &Year) -> bool {
        has_hashtag(post, KUBECON_HASHTAGS, year) || KUBECON_REGEX.is_match(&post.text)
    }

    fn is_party(post: &Post, year: &Year) -> bool {
        has_hashtag(post, PARTY_HASHTAGS, year) || PARTY_REGEX.is_match(&post.text)
    }
}

impl Matcher for KubeConParty {
    fn matches(&self, _event: &Event, post: &Post) -> Result<bool, MatchError> {
        if post.text.is_empty() {
            return Ok(false);
        }
        let year = Year::current();
        Ok(Self::is_kubecon(post, &year) && Self::is_party(post, &year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::testing::{post, post_event, text_post};

    fn check(p: &Post) -> bool {
        KubeConParty.matches(&post_event(1, "rk", "{}"), p).unwrap()
    }

    #[test]
    fn needs_both_kubecon_and_party() {
        assert!(check(&text_post("Who is going to the KubeCon party tonight?")));
        assert!(!check(&text_post("Who is going to the party tonight?")));
        assert!(!check(&text_post("Great keynote at KubeCon today")));
        assert!(!check(&text_post("")));
    }

    #[test]
    fn kubecrawl_hashtag_counts_for_both() {
        let p = post(
            r##"{"text": "see you at #KubeCrawl",
                 "facets": [{"index": {"byteStart": 11, "byteEnd": 21},
                   "features": [{"$type": "app.bsky.richtext.facet#tag", "tag": "kubecrawl"}]}]}"##,
        );
        assert!(check(&p));
    }

    #[test]
    fn replies_are_allowed() {
        let p = post(
            r#"{"text": "the CloudNativeCon meetup is full",
                "reply": {"root": {"uri": "at://a"}, "parent": {"uri": "at://a"}}}"#,
        );
        assert!(check(&p));
    }
}
