//! Decoded `app.bsky.feed.post` record.
//!
//! Only the fields the feeds look at are modelled; everything else in the record is ignored.

use crate::error::DecodeError;
use crate::event::Commit;
use serde::Deserialize;

/// A post record. Immutable once decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub facets: Vec<Facet>,
    #[serde(default)]
    pub embed: Option<Embed>,
    #[serde(default)]
    pub reply: Option<ReplyRef>,
    #[serde(default)]
    pub langs: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Post {
    /// Decode the record carried by a commit.
    pub fn decode(commit: &Commit) -> Result<Self, DecodeError> {
        let raw = commit.raw_record().ok_or(DecodeError::MissingRecord)?;
        Ok(serde_json::from_str(raw)?)
    }

    /// Hashtags from tag facets, in facet order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.features().filter_map(|f| match f {
            Feature::Tag { tag } => Some(tag.as_str()),
            _ => None,
        })
    }

    /// Link URIs from link facets, in facet order.
    pub fn links(&self) -> impl Iterator<Item = &str> {
        self.features().filter_map(|f| match f {
            Feature::Link { uri } => Some(uri.as_str()),
            _ => None,
        })
    }

    fn features(&self) -> impl Iterator<Item = &Feature> {
        self.facets.iter().flat_map(|f| f.features.iter())
    }

    /// URI of an external link card, if the post has one.
    pub fn external_uri(&self) -> Option<&str> {
        match &self.embed {
            Some(Embed::External { external }) => Some(external.uri.as_str()),
            _ => None,
        }
    }
}

/// Rich-text annotation over a byte range of the text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Facet {
    #[serde(default)]
    pub index: ByteSlice,
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: u64,
    pub byte_end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "$type")]
pub enum Feature {
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "$type")]
pub enum Embed {
    #[serde(rename = "app.bsky.embed.external")]
    External { external: External },
    /// Images, quotes, video and anything newer.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct External {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
}
