//! A WebSocket session with the repository event stream of a relay.
//!
//! A [`Session`] owns at most one live connection. [`Session::connect`] performs the handshake
//! and hands back the read half as a [`Reader`]; [`Session::run`] drives it, decoding every
//! binary frame into a [`Notification`] and awaiting the handler before reading the next one.
//! The write half stays inside the session, so [`Session::close`] can end the stream from
//! another task.


use crate::error::{Error, Result};
use crate::frames::Frame;
use crate::types::Notification;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use http::header::AUTHORIZATION;
use http::{Request, Uri};
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, handshake::client::generate_key, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Consumes the notifications of a running session.
pub trait NotificationHandler {
    fn handle_notification(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Streaming,
    Failed,
}

struct Live {
    id: u64,
    sink: SplitSink<WsStream, Message>,
    token: CancellationToken,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    live: Option<Live>,
}

/// The read half of a connection opened by [`Session::connect`].
pub struct Reader {
    id: u64,
    stream: SplitStream<WsStream>,
    token: CancellationToken,
}

/// A connection handle shared between the read loop and callers of [`Session::close`].
#[derive(Default)]
pub struct Session {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }
    /// Opens one WebSocket connection to `url`.
    ///
    /// Sends `Authorization: Bearer <token>` when `access_token` is non-empty and connects
    /// anonymously otherwise. The handshake must complete within `timeout`.
    pub async fn connect(
        &self,
        url: &str,
        access_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Reader> {
        let (uri, host) = get_host(url)?;
        let request = gen_request(&uri, &host, access_token)?;

        self.inner.lock().await.state = SessionState::Connecting;
        let authenticated = access_token.is_some_and(|token| !token.is_empty());
        tracing::info!(url, authenticated, "connecting");
        let stream = match tokio::time::timeout(timeout, connect_async(request)).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(err)) => {
                self.inner.lock().await.state = SessionState::Failed;
                return Err(Error::Connect(err));
            }
            Err(_) => {
                self.inner.lock().await.state = SessionState::Failed;
                return Err(Error::HandshakeTimeout(timeout));
            }
        };

        let (sink, stream) = stream.split();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.live.replace(Live { id, sink, token: token.clone() }) {
            previous.token.cancel();
        }
        inner.state = SessionState::Streaming;
        tracing::info!(url, "connected");
        Ok(Reader { id, stream, token })
    }
    /// Reads frames until the stream ends, the session is closed, or a frame or the handler
    /// fails.
    ///
    /// Frames are handled strictly in wire order. The connection is released on every exit
    /// path; no reconnect is attempted.
    pub async fn run<H: NotificationHandler>(&self, reader: Reader, handler: &H) -> Result<()> {
        let Reader { id, mut stream, token } = reader;
        let result = read_loop(&mut stream, &token, handler).await;
        self.release(id, result.is_err()).await;
        result
    }
    /// Stops the read loop and closes the connection.
    ///
    /// Calling this on a session without a live connection does nothing.
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state = SessionState::Disconnected;
        let Some(Live { mut sink, token, .. }) = inner.live.take() else {
            return Ok(());
        };
        token.cancel();
        match sink.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(Error::Transport(err)),
        }
    }
    async fn release(&self, id: u64, failed: bool) {
        let mut inner = self.inner.lock().await;
        // The connection may already be gone after `close`, or replaced by a newer one.
        if inner.live.as_ref().map(|live| live.id) != Some(id) {
            return;
        }
        if let Some(Live { mut sink, .. }) = inner.live.take() {
            if let Err(err) = sink.close().await {
                tracing::debug!(error = %err, "closing released connection");
            }
        }
        inner.state = if failed { SessionState::Failed } else { SessionState::Disconnected };
    }
}

async fn read_loop<H: NotificationHandler>(
    stream: &mut SplitStream<WsStream>,
    token: &CancellationToken,
    handler: &H,
) -> Result<()> {
    loop {
        let message = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            message = stream.next() => message,
        };
        match message {
            None | Some(Ok(Message::Close(_))) => return Ok(()),
            Some(Ok(Message::Binary(data))) => {
                if let Some(notification) = decode(data)? {
                    handler.handle_notification(notification).await?;
                }
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(Error::Transport(err)),
        }
    }
}

fn decode(data: Vec<u8>) -> Result<Option<Notification>> {
    match Frame::try_from(data) {
        Ok(Frame::Message { t, data }) => {
            let notification = Notification::from_payload(&t, &data)?;
            if notification.is_none() {
                tracing::debug!(t = %t, "ignoring message");
            }
            Ok(notification)
        }
        Ok(Frame::Error { data }) => Err(Notification::error_from_payload(&data)),
        Ok(Frame::Unknown { op }) => {
            tracing::debug!(op, "ignoring frame of unknown type");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Extract the URI and host from a string.
fn get_host(url: &str) -> Result<(Uri, Box<str>)> {
    let invalid = || Error::InvalidUri(url.to_owned());
    let uri = Uri::from_str(url).map_err(|_| invalid())?;
    let authority = uri.authority().ok_or_else(invalid)?.as_str();
    let host = authority.find('@').map_or_else(|| authority, |idx| authority.split_at(idx + 1).1);
    let host = Box::from(host);
    Ok((uri, host))
}

/// Generate the upgrade request, carrying a bearer token when one is given.
fn gen_request(uri: &Uri, host: &str, access_token: Option<&str>) -> Result<Request<()>> {
    let mut request = Request::builder()
        .uri(uri)
        .method("GET")
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key());
    if let Some(token) = access_token.filter(|token| !token.is_empty()) {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    request.body(()).map_err(|_| Error::InvalidUri(uri.to_string()))
}
