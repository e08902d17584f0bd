//! Interaction events derived from graph and feed operations.

use chrono::{DateTime, Utc};

/// Collection NSIDs of the records interactions are derived from.
pub mod nsid {
    pub const FOLLOW: &str = "app.bsky.graph.follow";
    pub const LIKE: &str = "app.bsky.feed.like";
    pub const REPOST: &str = "app.bsky.feed.repost";
}

/// Fields shared by every interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// DID of the account performing the action.
    pub actor: String,
    /// Path of the record that carries the interaction.
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Follow {
    pub interaction: Interaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Like {
    pub interaction: Interaction,
    /// AT URI of the like record.
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repost {
    pub interaction: Interaction,
    /// AT URI of the repost record.
    pub uri: String,
}

/// A reply, derived from a post whose reply root is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub interaction: Interaction,
    /// AT URI of the reply post.
    pub uri: String,
    /// AT URI of the thread root.
    pub reply_to: String,
    pub text: String,
}

impl Interaction {
    /// Builds an interaction for the record at `path` in `repo`, stamped with the commit `time`.
    ///
    /// Falls back to the current time when `time` is not RFC 3339.
    pub fn new(repo: &str, path: &str, time: &str) -> Self {
        let created_at = DateTime::parse_from_rfc3339(time)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Self { actor: repo.to_owned(), subject: path.to_owned(), created_at }
    }
    /// The AT URI of the record.
    pub fn uri(&self) -> String {
        format!("at://{}/{}", self.actor, self.subject)
    }
}
