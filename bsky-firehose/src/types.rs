//! Notifications of the `com.atproto.sync.subscribeRepos` stream.
//!
//! The `*Data` structs mirror the payloads on the wire and are only used for decoding; the
//! `*Event` types are what the rest of the crate works with.

use crate::error::{Error, Result};
use ipld_core::cid::Cid;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The NSID of the repository event stream.
pub const NSID: &str = "com.atproto.sync.subscribeRepos";

// region: Wire
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommitData {
    pub repo: String,
    pub seq: i64,
    pub time: String,
    pub ops: Vec<RepoOpData>,
    #[serde(with = "serde_bytes")]
    pub blocks: Vec<u8>,
    #[serde(default)]
    pub too_big: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoOpData {
    pub action: Action,
    pub path: String,
    pub cid: Option<Cid>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HandleData {
    pub did: String,
    pub handle: String,
    pub seq: i64,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfoData {
    pub name: String,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MigrateData {
    pub did: String,
    pub migrate_to: Option<String>,
    pub seq: i64,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TombstoneData {
    pub did: String,
    pub seq: i64,
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorData {
    pub error: String,
    pub message: Option<String>,
}
// endregion: Wire

// region: Commit
/// The kind of mutation a [`RepoOperation`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(format!("unknown action: {s}")),
        }
    }
}

/// One mutation inside a commit.
#[derive(Debug, Clone)]
pub struct RepoOperation {
    pub action: Action,
    /// Record path, `<collection>/<rkey>`.
    pub path: String,
    /// Content identifier of the record. Empty for deletes.
    pub cid: String,
    /// The commit's CAR archive, shared by every operation of the commit.
    pub blocks: Arc<[u8]>,
}

impl RepoOperation {
    /// The collection NSID, the part of the path before the first `/`.
    pub fn collection(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }
    /// The record key, the last segment of the path.
    pub fn rkey(&self) -> &str {
        self.path.rsplit_once('/').map_or(self.path.as_str(), |(_, rkey)| rkey)
    }
}

/// A commit to a repository.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    /// DID of the repository.
    pub repo: String,
    pub seq: i64,
    pub time: String,
    /// Operations, in the order the relay emitted them.
    pub ops: Vec<RepoOperation>,
    /// Set by the relay when the commit was too large to carry its blocks.
    pub too_big: bool,
}

impl From<CommitData> for CommitEvent {
    fn from(data: CommitData) -> Self {
        let CommitData { repo, seq, time, ops, blocks, too_big } = data;
        let blocks = Arc::<[u8]>::from(blocks);
        let ops = ops
            .into_iter()
            .map(|RepoOpData { action, path, cid }| RepoOperation {
                action,
                path,
                cid: cid.map(|c| c.to_string()).unwrap_or_default(),
                blocks: Arc::clone(&blocks),
            })
            .collect();
        Self { repo, seq, time, ops, too_big }
    }
}
// endregion: Commit

// region: Passthrough
/// A handle change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleEvent {
    pub did: String,
    pub handle: String,
    pub seq: i64,
    pub time: String,
}

impl From<HandleData> for HandleEvent {
    fn from(HandleData { did, handle, seq, time }: HandleData) -> Self {
        Self { did, handle, seq, time }
    }
}

/// An informational message from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoEvent {
    pub name: String,
    pub message: Option<String>,
}

impl From<InfoData> for InfoEvent {
    fn from(InfoData { name, message }: InfoData) -> Self {
        Self { name, message }
    }
}

/// A repository migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateEvent {
    pub did: String,
    pub migrate_to: Option<String>,
    pub seq: i64,
    pub time: String,
}

impl From<MigrateData> for MigrateEvent {
    fn from(MigrateData { did, migrate_to, seq, time }: MigrateData) -> Self {
        Self { did, migrate_to, seq, time }
    }
}

/// A repository being tombstoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneEvent {
    pub did: String,
    pub seq: i64,
    pub time: String,
}

impl From<TombstoneData> for TombstoneEvent {
    fn from(TombstoneData { did, seq, time }: TombstoneData) -> Self {
        Self { did, seq, time }
    }
}
// endregion: Passthrough

/// A decoded message of the stream.
#[derive(Debug, Clone)]
pub enum Notification {
    Commit(CommitEvent),
    Handle(HandleEvent),
    Info(InfoEvent),
    Migrate(MigrateEvent),
    Tombstone(TombstoneEvent),
}

impl Notification {
    /// Decodes the payload of a message frame.
    ///
    /// Returns `Ok(None)` for message types this crate does not consume, following the rule
    /// that clients ignore unknown `t` values.
    pub(crate) fn from_payload(t: &str, payload: &[u8]) -> Result<Option<Self>> {
        let notification = match t {
            "#commit" => Self::Commit(decode::<CommitData>(t, payload)?.into()),
            "#handle" => Self::Handle(decode::<HandleData>(t, payload)?.into()),
            "#info" => Self::Info(decode::<InfoData>(t, payload)?.into()),
            "#migrate" => Self::Migrate(decode::<MigrateData>(t, payload)?.into()),
            "#tombstone" => Self::Tombstone(decode::<TombstoneData>(t, payload)?.into()),
            _ => return Ok(None),
        };
        Ok(Some(notification))
    }
    /// Decodes the payload of an error frame into the error it carries.
    pub(crate) fn error_from_payload(payload: &[u8]) -> Error {
        match decode::<ErrorData>("#error", payload) {
            Ok(ErrorData { error, message }) => Error::ErrorFrame { error, message },
            Err(err) => err,
        }
    }
    /// The message type this notification was decoded from.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Commit(_) => "#commit",
            Self::Handle(_) => "#handle",
            Self::Info(_) => "#info",
            Self::Migrate(_) => "#migrate",
            Self::Tombstone(_) => "#tombstone",
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(t: &str, payload: &[u8]) -> Result<T> {
    serde_ipld_dagcbor::from_reader(payload)
        .map_err(|source| Error::Payload { kind: t.to_owned(), source })
}
