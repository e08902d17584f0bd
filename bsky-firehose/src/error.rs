use crate::dispatch::HandlerError;
use crate::frames;
use crate::post::ConversionError;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid firehose url: {0}")]
    InvalidUri(String),
    #[error("failed to connect to firehose: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("firehose handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    #[error("firehose read error: {0}")]
    Transport(#[source] tungstenite::Error),
    #[error("invalid frame: {0}")]
    Frame(#[from] frames::Error),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_ipld_dagcbor::DecodeError<std::io::Error>,
    },
    #[error("relay sent an error frame: {error}")]
    ErrorFrame { error: String, message: Option<String> },
    #[error("failed to convert record at {path}: {source}")]
    Conversion {
        path: String,
        #[source]
        source: ConversionError,
    },
    #[error("handler error: {0}")]
    Handler(HandlerError),
    #[error("loading config error: {0}")]
    ConfigLoad(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("saving config error: {0}")]
    ConfigSave(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Returns `true` for transport-level failures, where a fresh connection has a chance to
    /// succeed.
    ///
    /// The [`Firehose`](crate::Firehose) supervisor reconnects after every kind of failure; this
    /// only lets callers and logs tell transient conditions apart from persistent ones.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::HandshakeTimeout(_) | Self::Transport(_))
    }
}

/// Type alias to use this crate's [`Error`](enum@crate::Error) type in a [`Result`](core::result::Result).
pub type Result<T> = core::result::Result<T, Error>;
