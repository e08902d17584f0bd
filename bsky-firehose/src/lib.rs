#![doc = include_str!("../README.md")]
pub mod car;
pub mod client;
pub mod config;
mod demux;
pub mod dispatch;
mod error;
mod firehose;
pub mod frames;
pub mod interaction;
pub mod post;
#[cfg(test)]
mod testing;
pub mod types;

pub use crate::car::{CarExtractor, RecordExtractor};
pub use crate::config::{AuthProvider, Config};
pub use crate::demux::Demultiplexer;
pub use crate::dispatch::{Callbacks, HandlerError, Registration};
pub use crate::error::{Error, Result};
pub use crate::firehose::{Firehose, DEFAULT_RECONNECT_DELAY};
pub use crate::interaction::{Comment, Follow, Interaction, Like, Repost};
pub use crate::post::Post;
pub use crate::types::{
    Action, CommitEvent, HandleEvent, InfoEvent, MigrateEvent, Notification, RepoOperation,
    TombstoneEvent,
};
pub use tokio_util::sync::CancellationToken;
