//! Configuration for the [`Firehose`](crate::Firehose).
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The public relay endpoint of the repository event stream.
pub const DEFAULT_FIREHOSE_URL: &str = "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Supplies the endpoint and credentials of a subscription.
///
/// Called once per connection attempt, so implementations may rotate tokens between
/// reconnects.
pub trait AuthProvider: Send + Sync {
    /// The bearer token to present, or `None` to connect anonymously.
    fn access_token(&self) -> Option<String>;
    fn firehose_url(&self) -> String;
    /// The handshake timeout.
    fn timeout(&self) -> Duration;
}

/// Configuration data struct for the [`Firehose`](crate::Firehose).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// The WebSocket URL of the event stream.
    #[builder(default = String::from(DEFAULT_FIREHOSE_URL), into)]
    pub firehose_url: String,
    #[builder(into)]
    pub access_token: Option<String>,
    /// Handshake timeout, in milliseconds.
    #[builder(default = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
    /// Delay between reconnect attempts, in milliseconds.
    #[builder(default = DEFAULT_RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,
}

impl Config {
    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self> {
        loader.load().await.map_err(Error::ConfigLoad)
    }
    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<()> {
        saver.save(self).await.map_err(Error::ConfigSave)
    }
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for Config {
    /// Creates a new default configuration.
    ///
    /// The default configuration subscribes anonymously to `wss://bsky.network`.
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AuthProvider for Config {
    fn access_token(&self) -> Option<String> {
        self.access_token.clone().filter(|token| !token.is_empty())
    }
    fn firehose_url(&self) -> String {
        self.firehose_url.clone()
    }
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(&self) -> impl Future<Output = core::result::Result<Config, BoxError>> + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(
        &self,
        config: &Config,
    ) -> impl Future<Output = core::result::Result<(), BoxError>> + Send;
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A configuration file format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    #[cfg(feature = "config-toml")]
    Toml,
}

impl Format {
    /// The format of `path`, matching its extension case-insensitively.
    pub fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            #[cfg(feature = "config-toml")]
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
    fn parse(self, text: &str) -> core::result::Result<Config, BoxError> {
        match self {
            Self::Json => Ok(serde_json::from_str(text)?),
            #[cfg(feature = "config-toml")]
            Self::Toml => Ok(toml::from_str(text)?),
        }
    }
    fn render(self, config: &Config) -> core::result::Result<String, BoxError> {
        match self {
            Self::Json => Ok(serde_json::to_string_pretty(config)?),
            #[cfg(feature = "config-toml")]
            Self::Toml => Ok(toml::to_string_pretty(config)?),
        }
    }
}

/// The file extension of a [`FileStore`] path names no supported [`Format`].
#[derive(Debug, thiserror::Error)]
#[error("unsupported config format: {}", .0.display())]
pub struct UnsupportedFormat(pub PathBuf);

/// A [`Loader`] and [`Saver`] backed by a configuration file.
///
/// `.json` is always supported, `.toml` with the `config-toml` feature. Saving creates
/// missing parent directories.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    fn format(&self) -> core::result::Result<Format, UnsupportedFormat> {
        Format::of(&self.path).ok_or_else(|| UnsupportedFormat(self.path.clone()))
    }
}

impl Loader for FileStore {
    async fn load(&self) -> core::result::Result<Config, BoxError> {
        let format = self.format()?;
        format.parse(&tokio::fs::read_to_string(&self.path).await?)
    }
}

impl Saver for FileStore {
    async fn save(&self, config: &Config) -> core::result::Result<(), BoxError> {
        let text = self.format()?.render(config)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(&self.path, text).await?)
    }
}
