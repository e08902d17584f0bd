use super::ConversionError;
use ipld_core::ipld::Ipld;

/// Media or record embedded in a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    Images(Vec<EmbedImage>),
    Video(EmbedVideo),
    External(EmbedExternal),
    Record(EmbedRecord),
    RecordWithMedia { record: EmbedRecord, media: Media },
    /// An embed type this crate does not know, with its `$type`.
    Unknown(String),
}

/// The media half of a record-with-media embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    Images(Vec<EmbedImage>),
    Video(EmbedVideo),
    External(EmbedExternal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u64,
    pub height: u64,
}

/// A reference to an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub cid: String,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedImage {
    pub alt: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub blob: BlobRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCaption {
    pub lang: String,
    pub file: Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedVideo {
    pub alt: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub captions: Vec<VideoCaption>,
    pub blob: BlobRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedExternal {
    pub uri: String,
    pub title: String,
    pub description: String,
    pub thumb: Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedRecord {
    pub uri: String,
    pub cid: String,
}

impl TryFrom<&Ipld> for Embed {
    type Error = ConversionError;

    fn try_from(value: &Ipld) -> Result<Self, Self::Error> {
        let kind = string(value, "$type").unwrap_or_default();
        Ok(match kind {
            "app.bsky.embed.images" => Self::Images(images(value)?),
            "app.bsky.embed.video" => Self::Video(video(value)?),
            "app.bsky.embed.external" => Self::External(external(value)?),
            "app.bsky.embed.record" => Self::Record(record(value)?),
            "app.bsky.embed.recordWithMedia" => {
                let embedded = get(value, "record").ok_or_else(|| {
                    ConversionError::InvalidEmbed("recordWithMedia", String::from("missing record"))
                })?;
                let media = get(value, "media").ok_or_else(|| {
                    ConversionError::InvalidEmbed("recordWithMedia", String::from("missing media"))
                })?;
                Self::RecordWithMedia { record: record(embedded)?, media: Media::try_from(media)? }
            }
            _ => Self::Unknown(kind.to_owned()),
        })
    }
}

impl TryFrom<&Ipld> for Media {
    type Error = ConversionError;

    fn try_from(value: &Ipld) -> Result<Self, Self::Error> {
        match string(value, "$type").unwrap_or_default() {
            "app.bsky.embed.images" => Ok(Self::Images(images(value)?)),
            "app.bsky.embed.video" => Ok(Self::Video(video(value)?)),
            "app.bsky.embed.external" => Ok(Self::External(external(value)?)),
            kind => Err(ConversionError::InvalidEmbed(
                "recordWithMedia",
                format!("unsupported media type {kind:?}"),
            )),
        }
    }
}

fn images(value: &Ipld) -> Result<Vec<EmbedImage>, ConversionError> {
    let Some(Ipld::List(items)) = get(value, "images") else {
        return Err(ConversionError::InvalidEmbed("images", String::from("missing images")));
    };
    items
        .iter()
        .map(|item| {
            Ok(EmbedImage {
                alt: string(item, "alt").unwrap_or_default().to_owned(),
                aspect_ratio: aspect_ratio(item),
                blob: get(item, "image")
                    .and_then(blob_ref)
                    .ok_or(ConversionError::MissingBlob("image"))?,
            })
        })
        .collect()
}

fn video(value: &Ipld) -> Result<EmbedVideo, ConversionError> {
    let captions = match get(value, "captions") {
        Some(Ipld::List(items)) => items
            .iter()
            .map(|item| VideoCaption {
                lang: string(item, "lang").unwrap_or_default().to_owned(),
                file: get(item, "file").and_then(blob_ref),
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(EmbedVideo {
        alt: string(value, "alt").unwrap_or_default().to_owned(),
        aspect_ratio: aspect_ratio(value),
        captions,
        blob: get(value, "video").and_then(blob_ref).ok_or(ConversionError::MissingBlob("video"))?,
    })
}

fn external(value: &Ipld) -> Result<EmbedExternal, ConversionError> {
    let external = get(value, "external").ok_or_else(|| {
        ConversionError::InvalidEmbed("external", String::from("missing external"))
    })?;
    Ok(EmbedExternal {
        uri: string(external, "uri").unwrap_or_default().to_owned(),
        title: string(external, "title").unwrap_or_default().to_owned(),
        description: string(external, "description").unwrap_or_default().to_owned(),
        thumb: get(external, "thumb").and_then(blob_ref),
    })
}

fn record(value: &Ipld) -> Result<EmbedRecord, ConversionError> {
    let strong_ref = get(value, "record")
        .ok_or_else(|| ConversionError::InvalidEmbed("record", String::from("missing record")))?;
    match (string(strong_ref, "uri"), string(strong_ref, "cid")) {
        (Some(uri), Some(cid)) => Ok(EmbedRecord { uri: uri.to_owned(), cid: cid.to_owned() }),
        _ => Err(ConversionError::InvalidEmbed("record", String::from("invalid strong ref"))),
    }
}

fn aspect_ratio(value: &Ipld) -> Option<AspectRatio> {
    let ratio = get(value, "aspectRatio")?;
    Some(AspectRatio { width: unsigned(ratio, "width")?, height: unsigned(ratio, "height")? })
}

/// Reads both the current blob shape (`ref` link) and the legacy one (`cid` string).
fn blob_ref(value: &Ipld) -> Option<BlobRef> {
    let cid = match get(value, "ref") {
        Some(Ipld::Link(cid)) => cid.to_string(),
        _ => string(value, "cid")?.to_owned(),
    };
    Some(BlobRef {
        cid,
        mime_type: string(value, "mimeType").unwrap_or_default().to_owned(),
        size: unsigned(value, "size").unwrap_or_default(),
    })
}

fn get<'a>(value: &'a Ipld, key: &str) -> Option<&'a Ipld> {
    match value {
        Ipld::Map(map) => map.get(key),
        _ => None,
    }
}

fn string<'a>(value: &'a Ipld, key: &str) -> Option<&'a str> {
    match get(value, key) {
        Some(Ipld::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn unsigned(value: &Ipld, key: &str) -> Option<u64> {
    match get(value, key) {
        Some(Ipld::Integer(i)) => u64::try_from(*i).ok(),
        _ => None,
    }
}
