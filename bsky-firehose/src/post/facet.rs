use super::FacetRecord;
use ipld_core::ipld::Ipld;
use serde::Deserialize;

/// A byte range of the post text, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetKind {
    Link { uri: String },
    Mention { did: String },
    Tag { tag: String },
}

impl FacetKind {
    /// The lexicon type of the feature.
    pub fn nsid(&self) -> &'static str {
        match self {
            Self::Link { .. } => "app.bsky.richtext.facet#link",
            Self::Mention { .. } => "app.bsky.richtext.facet#mention",
            Self::Tag { .. } => "app.bsky.richtext.facet#tag",
        }
    }

    fn from_feature(feature: &Ipld) -> Option<Self> {
        let Ipld::Map(map) = feature else {
            return None;
        };
        let field = |key: &str| match map.get(key) {
            Some(Ipld::String(s)) => Some(s.clone()),
            _ => None,
        };
        match map.get("$type") {
            Some(Ipld::String(t)) if t == "app.bsky.richtext.facet#link" => {
                field("uri").map(|uri| Self::Link { uri })
            }
            Some(Ipld::String(t)) if t == "app.bsky.richtext.facet#mention" => {
                field("did").map(|did| Self::Mention { did })
            }
            Some(Ipld::String(t)) if t == "app.bsky.richtext.facet#tag" => {
                field("tag").map(|tag| Self::Tag { tag })
            }
            _ => None,
        }
    }
}

/// One feature of a rich text facet, with the text it annotates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    pub kind: FacetKind,
    pub index: ByteSlice,
    pub text: String,
}

/// Flattens the facets of a record, one [`Facet`] per known feature.
///
/// Ranges are clamped to the text. A range that splits a character is kept, its partial
/// bytes replaced by `U+FFFD`.
pub(super) fn extract(text: &str, facets: &[FacetRecord]) -> Vec<Facet> {
    let mut extracted = Vec::new();
    for facet in facets {
        let byte_end = facet.index.byte_end.min(text.len());
        let index = ByteSlice { byte_start: facet.index.byte_start.min(byte_end), byte_end };
        let covered = String::from_utf8_lossy(&text.as_bytes()[index.byte_start..index.byte_end]);
        for feature in &facet.features {
            match FacetKind::from_feature(feature) {
                Some(kind) => extracted.push(Facet { kind, index, text: covered.to_string() }),
                None => tracing::debug!(?feature, "skipping unknown facet feature"),
            }
        }
    }
    extracted
}
