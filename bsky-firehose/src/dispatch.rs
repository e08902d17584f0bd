//! Registration of filtered handlers, and their evaluation.
//!
//! Every event kind has an ordered list of [`Registration`]s. For each event the list is walked
//! in insertion order; a registration's filters form a short-circuiting conjunction, and its
//! handler runs only when all of them accept. The first handler error stops the walk.

use crate::interaction::{Comment, Follow, Like, Repost};
use crate::post::Post;
use crate::types::{HandleEvent, InfoEvent, MigrateEvent, RepoOperation, TombstoneEvent};

/// Error type returned by application handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A predicate deciding whether a handler sees an event.
pub type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// An application callback for one event kind.
pub type Handler<T> = Box<dyn Fn(&T) -> Result<(), HandlerError> + Send + Sync>;

/// A handler together with the filters guarding it.
pub struct Registration<T> {
    filters: Vec<Filter<T>>,
    handler: Handler<T>,
}

impl<T> Registration<T> {
    pub fn new<H>(handler: H) -> Self
    where
        H: Fn(&T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self { filters: Vec::new(), handler: Box::new(handler) }
    }
    /// Appends a filter. Filters are evaluated in the order they were added.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Box::new(filter));
        self
    }
    fn accepts(&self, event: &T) -> bool {
        self.filters.iter().all(|filter| filter(event))
    }
}

/// The ordered registrations of one event kind.
pub struct Handlers<T> {
    registrations: Vec<Registration<T>>,
}

impl<T> Default for Handlers<T> {
    fn default() -> Self {
        Self { registrations: Vec::new() }
    }
}

impl<T> Handlers<T> {
    pub fn push(&mut self, registration: Registration<T>) {
        self.registrations.push(registration);
    }
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
    /// Runs every accepting handler on `event`, stopping at the first error.
    pub fn dispatch(&self, event: &T) -> Result<(), HandlerError> {
        for registration in &self.registrations {
            if registration.accepts(event) {
                (registration.handler)(event)?;
            }
        }
        Ok(())
    }
}

/// The full set of handlers of one subscription.
///
/// ```
/// use bsky_firehose::{Callbacks, Post, Registration};
///
/// let callbacks = Callbacks::new().on_post(
///     Registration::new(|post: &Post| {
///         println!("{}: {}", post.repo, post.text);
///         Ok(())
///     })
///     .filter(|post: &Post| !post.text.is_empty()),
/// );
/// assert!(callbacks.has_post_consumers());
/// ```
#[derive(Default)]
pub struct Callbacks {
    pub(crate) raw: Handlers<RepoOperation>,
    pub(crate) posts: Handlers<Post>,
    pub(crate) comments: Handlers<Comment>,
    pub(crate) follows: Handlers<Follow>,
    pub(crate) likes: Handlers<Like>,
    pub(crate) reposts: Handlers<Repost>,
    pub(crate) handles: Handlers<HandleEvent>,
    pub(crate) infos: Handlers<InfoEvent>,
    pub(crate) migrates: Handlers<MigrateEvent>,
    pub(crate) tombstones: Handlers<TombstoneEvent>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }
    /// Registers a handler for every operation of every commit, run before the operation is
    /// classified.
    pub fn on_raw_operation(mut self, registration: Registration<RepoOperation>) -> Self {
        self.raw.push(registration);
        self
    }
    pub fn on_post(mut self, registration: Registration<Post>) -> Self {
        self.posts.push(registration);
        self
    }
    pub fn on_comment(mut self, registration: Registration<Comment>) -> Self {
        self.comments.push(registration);
        self
    }
    pub fn on_follow(mut self, registration: Registration<Follow>) -> Self {
        self.follows.push(registration);
        self
    }
    pub fn on_like(mut self, registration: Registration<Like>) -> Self {
        self.likes.push(registration);
        self
    }
    pub fn on_repost(mut self, registration: Registration<Repost>) -> Self {
        self.reposts.push(registration);
        self
    }
    pub fn on_handle(mut self, registration: Registration<HandleEvent>) -> Self {
        self.handles.push(registration);
        self
    }
    pub fn on_info(mut self, registration: Registration<InfoEvent>) -> Self {
        self.infos.push(registration);
        self
    }
    pub fn on_migrate(mut self, registration: Registration<MigrateEvent>) -> Self {
        self.migrates.push(registration);
        self
    }
    pub fn on_tombstone(mut self, registration: Registration<TombstoneEvent>) -> Self {
        self.tombstones.push(registration);
        self
    }
    /// Whether any handler consumes records decoded from post operations.
    pub fn has_post_consumers(&self) -> bool {
        !self.posts.is_empty() || !self.comments.is_empty()
    }
}
