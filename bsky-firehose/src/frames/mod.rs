//! Splits the binary messages of an [event stream](https://atproto.com/specs/event-stream)
//! into a header and a body.
//!
//! Every message is two concatenated DAG-CBOR objects: a header map `{op, t}` followed by
//! the payload. `op = 1` marks a message whose payload type is named by `t`, `op = -1` marks
//! an error frame. Other `op` values are reserved for future frame kinds and surface as
//! [`Frame::Unknown`] so readers can skip them; a header that is not such a map is an error.


use cbor4ii::core::utils::IoReader;
use serde::Deserialize;
use serde_ipld_dagcbor::de::Deserializer;
use serde_ipld_dagcbor::DecodeError;
use std::io::{self, Cursor};

const OP_MESSAGE: i64 = 1;
const OP_ERROR: i64 = -1;

/// Errors produced while splitting a frame.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The header is not a `{op, t}` map.
    #[error("malformed frame header: {0}")]
    Header(#[from] DecodeError<io::Error>),
    #[error("message frame header has no type")]
    MissingType,
    #[error("frame with op {0} has no payload")]
    EmptyPayload(i64),
}

#[derive(Debug, Deserialize)]
struct Header {
    op: i64,
    #[serde(default)]
    t: Option<String>,
}

/// One frame of the stream, with the still-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message { t: String, data: Vec<u8> },
    Error { data: Vec<u8> },
    /// A well-formed header carrying an `op` this crate does not know.
    Unknown { op: i64 },
}

impl TryFrom<Vec<u8>> for Frame {
    type Error = self::Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Error> {
        let mut cursor = Cursor::new(bytes);
        let mut deserializer = Deserializer::from_reader(IoReader::new(&mut cursor));
        let Header { op, t } = Header::deserialize(&mut deserializer)?;
        if op != OP_MESSAGE && op != OP_ERROR {
            return Ok(Self::Unknown { op });
        }

        // `end` succeeds only when nothing follows the header.
        if deserializer.end().is_ok() {
            return Err(Error::EmptyPayload(op));
        }
        let offset = cursor.position() as usize;
        let mut bytes = cursor.into_inner();
        let data = bytes.split_off(offset);

        match (op, t) {
            (OP_ERROR, _) => Ok(Self::Error { data }),
            (_, Some(t)) => Ok(Self::Message { t, data }),
            (_, None) => Err(Error::MissingType),
        }
    }
}
