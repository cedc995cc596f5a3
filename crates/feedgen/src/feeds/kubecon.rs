//! `kubecon`: top-level posts about KubeCon and its co-located events.

use super::hashtags::{has_hashtag, Year};
use super::Matcher;
use crate::error::MatchError;
use crate::event::Event;
use crate::record::Post;
use regex::Regex;
use std::sync::LazyLock;

const HASHTAGS: &[&str] = &[
    // KubeCon
    "KubeCon",
    "KubeConNA",
    "KubeConEU",
    "KubeConCN",
    "KubeConJP",
    "KubeConIN",
    "KubeConCloudNativeCon",
    "CloudNativeCon",
    // Experiences
    "KubeCrawl",
    "CloudNativeFest",
    "KubeCrawlCloudNativeFest",
    "ContribFest",
    // Maintainer Summit
    "CNMaintainerSummit",
    "KubernetesMaintainerSummit",
    "KubeConMaintainerSummit",
    // Co-located events
    "ArgoCon",
    "BackstageCon",
    "CiliumCon",
    "CNK8sAIDay",
    "CNTelcoDay",
    "CloudNativeUniversity",
    "dokday",
    "EnvoyCon",
    "istioday",
    "KFSummit",
    "K8sEdgeDay",
    "LinkerdDay",
    "ObservabilityDay",
    "OpenFeature",
    "OpenTofuDay",
    "PlatEngDay",
    // Related events
    "Rejekts",
    "RejektsEU",
    "RejektsNA",
];

static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)\W(KubeCon|KubeConCloudNativeCon|CloudNativeCon|Rejekts)(EU|NA|JP|CN|IN)?(\d{2,4})?(\W|$)")
        .expect("valid kubecon regex")
});

/// Top-level text posts without embeds that carry an event hashtag or mention the event.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeCon;

impl Matcher for KubeCon {
    fn matches(&self, _event: &Event, post: &Post) -> Result<bool, MatchError> {
        if post.embed.is_some() || post.reply.is_some() || post.text.is_empty() {
            return Ok(false);
        }
        if has_hashtag(post, HASHTAGS, &Year::current()) {
            return Ok(true);
        }
        Ok(MENTION_REGEX.is_match(&post.text))
    }
}
