//! A subscription that survives dropped connections.
//!
//! [`Firehose::subscribe`] connects, streams until the connection ends or fails, waits for the
//! reconnect delay and starts over with the same [`Callbacks`]. It only returns once the caller
//! cancels the subscription or closes the [`Firehose`].
//!
//! Every call to `subscribe` owns its connection, so one [`Firehose`] can feed several
//! concurrent subscriptions; [`Firehose::close`] ends all of them.


use crate::car::{CarExtractor, RecordExtractor};
use crate::client::Session;
use crate::config::{AuthProvider, Config};
use crate::demux::Demultiplexer;
use crate::dispatch::Callbacks;
use crate::error::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay between reconnect attempts when none is configured.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A reconnecting subscriber to the repository event stream.
///
/// ```no_run
/// use bsky_firehose::{Callbacks, Config, Firehose, Post, Registration};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() {
/// let firehose = Firehose::from_config(Config::default());
/// let callbacks = Callbacks::new().on_post(Registration::new(|post: &Post| {
///     println!("{}", post.text);
///     Ok(())
/// }));
/// firehose.subscribe(CancellationToken::new(), callbacks).await;
/// # }
/// ```
pub struct Firehose<A, E = CarExtractor> {
    auth: A,
    extractor: E,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
}

#[bon::bon]
impl<A: AuthProvider> Firehose<A> {
    #[builder]
    pub fn new(
        auth: A,
        #[builder(default = DEFAULT_RECONNECT_DELAY)] reconnect_delay: Duration,
    ) -> Self {
        Self::with_extractor(auth, CarExtractor, reconnect_delay)
    }
}

impl Firehose<Config> {
    /// Creates a [`Firehose`] using the endpoint, credentials and delays of `config`.
    pub fn from_config(config: Config) -> Self {
        let reconnect_delay = config.reconnect_delay();
        Self::with_extractor(config, CarExtractor, reconnect_delay)
    }
}

impl<A, E> Firehose<A, E>
where
    A: AuthProvider,
    E: RecordExtractor + Sync,
{
    /// Creates a [`Firehose`] decoding records with a custom [`RecordExtractor`].
    pub fn with_extractor(auth: A, extractor: E, reconnect_delay: Duration) -> Self {
        Self { auth, extractor, reconnect_delay, shutdown: CancellationToken::new() }
    }
    pub fn auth(&self) -> &A {
        &self.auth
    }
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
    /// Streams notifications to `callbacks`, reconnecting after every disconnect or failure.
    ///
    /// Returns when `cancel` is cancelled or [`close`](Self::close) is called. A closed
    /// [`Firehose`] returns immediately.
    pub async fn subscribe(&self, cancel: CancellationToken, callbacks: Callbacks) {
        let demux = Demultiplexer::new(&self.extractor, &callbacks);
        let session = Session::new();
        let mut attempt: u64 = 0;
        while !self.stopped(&cancel) {
            attempt += 1;
            let outcome = tokio::select! {
                outcome = self.stream(&session, &demux) => Some(outcome),
                _ = cancel.cancelled() => None,
                _ = self.shutdown.cancelled() => None,
            };
            match outcome {
                Some(Ok(())) => tracing::warn!(attempt, "stream ended"),
                Some(Err(err)) => {
                    let retryable = err.is_retryable();
                    tracing::error!(attempt, error = %err, retryable, "stream failed");
                }
                None => {
                    if let Err(err) = session.close().await {
                        tracing::debug!(error = %err, "closing connection");
                    }
                    break;
                }
            }
            if self.stopped(&cancel) {
                break;
            }
            tracing::warn!(delay = ?self.reconnect_delay, "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = cancel.cancelled() => break,
                _ = self.shutdown.cancelled() => break,
            }
        }
        tracing::info!(attempt, "subscription stopped");
    }
    /// Stops every running subscription and prevents any further reconnect.
    ///
    /// Each subscription closes its own connection before [`subscribe`](Self::subscribe)
    /// returns.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
    async fn stream(&self, session: &Session, demux: &Demultiplexer<'_, E>) -> Result<()> {
        let url = self.auth.firehose_url();
        let access_token = self.auth.access_token();
        let reader = session.connect(&url, access_token.as_deref(), self.auth.timeout()).await?;
        session.run(reader, demux).await
    }
    fn stopped(&self, cancel: &CancellationToken) -> bool {
        cancel.is_cancelled() || self.shutdown.is_cancelled()
    }
}
