//! Turns stream notifications into the domain events handlers subscribe to.
//!
//! Commits are walked operation by operation, in the order the relay emitted them. Raw
//! operation handlers see every operation first; the operation is then classified by
//! collection. Posts are decoded from the commit's blocks, but only when some handler consumes
//! posts or comments. Follows, likes and reposts are built from the operation alone.

#[cfg(test)]
mod tests;

use crate::car::RecordExtractor;
use crate::client::NotificationHandler;
use crate::dispatch::Callbacks;
use crate::error::{Error, Result};
use crate::interaction::{nsid, Comment, Follow, Interaction, Like, Repost};
use crate::post::{self, ConversionError, Post, PostRecord};
use crate::types::{Action, CommitEvent, Notification, RepoOperation};
use std::collections::HashSet;

/// A [`NotificationHandler`] dispatching to a set of [`Callbacks`].
pub struct Demultiplexer<'a, E> {
    extractor: &'a E,
    callbacks: &'a Callbacks,
}

impl<'a, E> Demultiplexer<'a, E>
where
    E: RecordExtractor + Sync,
{
    pub fn new(extractor: &'a E, callbacks: &'a Callbacks) -> Self {
        Self { extractor, callbacks }
    }
    async fn commit(&self, commit: &CommitEvent) -> Result<()> {
        let mut derived = HashSet::new();
        for op in &commit.ops {
            self.callbacks.raw.dispatch(op).map_err(Error::Handler)?;
            // Operations repeated within one commit are only turned into events once.
            if !derived.insert((op.path.as_str(), op.cid.as_str())) {
                tracing::debug!(path = %op.path, "skipping repeated operation");
                continue;
            }
            let create = op.action == Action::Create;
            match op.collection() {
                post::NSID => self.post(commit, op).await?,
                nsid::FOLLOW if create && !self.callbacks.follows.is_empty() => {
                    let follow = Follow { interaction: interaction(commit, op) };
                    self.callbacks.follows.dispatch(&follow).map_err(Error::Handler)?;
                }
                nsid::LIKE if create && !self.callbacks.likes.is_empty() => {
                    let interaction = interaction(commit, op);
                    let like = Like { uri: interaction.uri(), interaction };
                    self.callbacks.likes.dispatch(&like).map_err(Error::Handler)?;
                }
                nsid::REPOST if create && !self.callbacks.reposts.is_empty() => {
                    let interaction = interaction(commit, op);
                    let repost = Repost { uri: interaction.uri(), interaction };
                    self.callbacks.reposts.dispatch(&repost).map_err(Error::Handler)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
    async fn post(&self, commit: &CommitEvent, op: &RepoOperation) -> Result<()> {
        if !self.callbacks.has_post_consumers() || op.action != Action::Create || op.cid.is_empty()
        {
            return Ok(());
        }
        if commit.too_big {
            tracing::debug!(repo = %commit.repo, path = %op.path, "skipping post, commit too big");
            return Ok(());
        }
        let conversion =
            |source: ConversionError| Error::Conversion { path: op.path.clone(), source };
        let record = self
            .extractor
            .extract::<PostRecord>(&op.blocks, &op.cid)
            .await
            .map_err(|err| conversion(err.into()))?;
        let post = Post::from_record(record, commit.repo.as_str(), op.rkey()).map_err(conversion)?;
        self.callbacks.posts.dispatch(&post).map_err(Error::Handler)?;

        if post.is_reply() {
            let comment = Comment {
                interaction: interaction(commit, op),
                uri: post.uri(),
                reply_to: post.reply_uri.clone(),
                text: post.text.clone(),
            };
            self.callbacks.comments.dispatch(&comment).map_err(Error::Handler)?;
        }
        Ok(())
    }
}

impl<E> NotificationHandler for Demultiplexer<'_, E>
where
    E: RecordExtractor + Sync,
{
    async fn handle_notification(&self, notification: Notification) -> Result<()> {
        let callbacks = self.callbacks;
        match notification {
            Notification::Commit(commit) => self.commit(&commit).await,
            Notification::Handle(event) => {
                callbacks.handles.dispatch(&event).map_err(Error::Handler)
            }
            Notification::Info(event) => callbacks.infos.dispatch(&event).map_err(Error::Handler),
            Notification::Migrate(event) => {
                callbacks.migrates.dispatch(&event).map_err(Error::Handler)
            }
            Notification::Tombstone(event) => {
                callbacks.tombstones.dispatch(&event).map_err(Error::Handler)
            }
        }
    }
}

fn interaction(commit: &CommitEvent, op: &RepoOperation) -> Interaction {
    Interaction::new(&commit.repo, &op.path, &commit.time)
}
