//! The `app.bsky.feed.post` record and the [`Post`] event derived from it.
mod embed;
mod facet;

pub use self::embed::{
    AspectRatio, BlobRef, Embed, EmbedExternal, EmbedImage, EmbedRecord, EmbedVideo, Media,
    VideoCaption,
};
pub use self::facet::{ByteSlice, Facet, FacetKind};
use crate::car::ExtractError;
use ipld_core::ipld::Ipld;
use serde::Deserialize;

/// The collection NSID of posts.
pub const NSID: &str = "app.bsky.feed.post";

/// Errors produced while turning an operation into a [`Post`].
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("{0} blob is missing")]
    MissingBlob(&'static str),
    #[error("invalid {0} embed: {1}")]
    InvalidEmbed(&'static str, String),
}

// region: Record
/// A post record as stored in a repository.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub text: String,
    pub created_at: String,
    pub embed: Option<Ipld>,
    pub facets: Option<Vec<FacetRecord>>,
    pub labels: Option<SelfLabels>,
    pub langs: Option<Vec<String>>,
    pub reply: Option<ReplyRef>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacetRecord {
    pub index: ByteSlice,
    pub features: Vec<Ipld>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelfLabels {
    pub values: Vec<SelfLabel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelfLabel {
    pub val: String,
}

/// A reference to a specific version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}
// endregion: Record

/// A post, in a more user-friendly format than the raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    /// Author DID.
    pub repo: String,
    pub rkey: String,
    pub text: String,
    pub created_at: String,
    pub embed: Option<Embed>,
    pub facets: Vec<Facet>,
    pub labels: Vec<String>,
    pub langs: Vec<String>,
    pub tags: Vec<String>,
    /// URI of the thread root when the post is a reply, empty otherwise.
    pub reply_uri: String,
    pub reply: Option<ReplyRef>,
}

impl Post {
    /// Converts a decoded record written by `repo` under `rkey`.
    pub fn from_record(
        record: PostRecord,
        repo: impl Into<String>,
        rkey: impl Into<String>,
    ) -> Result<Self, ConversionError> {
        let PostRecord { text, created_at, embed, facets, labels, langs, reply, tags } = record;
        let embed = embed.as_ref().map(Embed::try_from).transpose()?;
        let facets = facet::extract(&text, facets.as_deref().unwrap_or_default());
        let labels =
            labels.map(|l| l.values.into_iter().map(|l| l.val).collect()).unwrap_or_default();
        let reply_uri = reply.as_ref().map(|r| r.root.uri.clone()).unwrap_or_default();
        Ok(Self {
            repo: repo.into(),
            rkey: rkey.into(),
            text,
            created_at,
            embed,
            facets,
            labels,
            langs: langs.unwrap_or_default(),
            tags: tags.unwrap_or_default(),
            reply_uri,
            reply,
        })
    }
    /// The AT URI of the post.
    pub fn uri(&self) -> String {
        format!("at://{}/{NSID}/{}", self.repo, self.rkey)
    }
    /// The web URL of the post.
    pub fn url(&self) -> String {
        format!("https://bsky.app/profile/{}/post/{}", self.repo, self.rkey)
    }
    pub fn is_reply(&self) -> bool {
        !self.reply_uri.is_empty()
    }
}
