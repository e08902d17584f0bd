//! Extraction of single records from the CAR archive attached to a commit.


use futures::io::Cursor as FutCursor;
use ipld_core::cid::Cid;
use serde::de::DeserializeOwned;
use std::future::Future;

/// Errors produced while extracting a record from a block archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no blocks or no cid to extract a record from")]
    MissingInput,
    #[error("invalid cid: {0}")]
    InvalidIdentifier(#[from] ipld_core::cid::Error),
    #[error("CAR decoding error: {0}")]
    ArchiveCorrupt(#[from] rs_car::CarDecodeError),
    #[error("block {0} not found in CAR data")]
    RecordNotFound(Cid),
    #[error("IPLD decoding error: {0}")]
    Decode(#[from] serde_ipld_dagcbor::DecodeError<std::io::Error>),
}

/// Locates and decodes one record in a block archive.
///
/// Implementations must be pure: the same archive and identifier always yield the same result.
pub trait RecordExtractor {
    /// Decodes the block addressed by `cid` in `blocks` into `T`.
    fn extract<T: DeserializeOwned>(
        &self,
        blocks: &[u8],
        cid: &str,
    ) -> impl Future<Output = Result<T, ExtractError>> + Send;
}

/// A [`RecordExtractor`] reading CAR v1 archives.
///
/// Block hashes are verified while reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarExtractor;

impl RecordExtractor for CarExtractor {
    async fn extract<T: DeserializeOwned>(
        &self,
        blocks: &[u8],
        cid: &str,
    ) -> Result<T, ExtractError> {
        if blocks.is_empty() || cid.is_empty() {
            return Err(ExtractError::MissingInput);
        }
        let target = Cid::try_from(cid)?;
        // `rs_car` is built on an older `cid` release, so identifiers are compared by their
        // binary form.
        let target_bytes = target.to_bytes();

        let mut cursor = FutCursor::new(blocks);
        let (items, _) = rs_car::car_read_all(&mut cursor, true).await?;
        let item = items
            .into_iter()
            .find_map(|(cid, item)| (cid.to_bytes() == target_bytes).then_some(item))
            .ok_or(ExtractError::RecordNotFound(target))?;
        Ok(serde_ipld_dagcbor::from_reader(item.as_slice())?)
    }
}
