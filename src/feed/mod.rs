//! Change feed abstraction.
//!
//! The feed delivers `(collection, key, revno)` notifications for followed
//! documents or whole collections. It never carries document content, so
//! every watcher re-reads the document from the [`crate::Store`] after each
//! notification. A revision of [`crate::REVNO_REMOVED`] means the document
//! was removed.
//!
//! Subscriptions are channel based: a watcher hands the feed the sending half
//! of an unbounded channel and later unsubscribes with the same channel.
//! [`Subscription`] ties that pair of calls to a scope.

mod change_hub;
mod subscription;

pub use change_hub::*;
pub use subscription::*;

#[cfg(test)]
mod subscription_test;

#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::FeedError;
use crate::WatcherError;
use crate::REVNO_REMOVED;

/// A single notification from the change feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection: String,
    pub key: String,
    pub revno: i64,
}

impl Change {
    pub fn new(
        collection: impl Into<String>,
        key: impl Into<String>,
        revno: i64,
    ) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            revno,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.revno == REVNO_REMOVED
    }
}

pub type ChangeSender = mpsc::UnboundedSender<Change>;
pub type ChangeReceiver = mpsc::UnboundedReceiver<Change>;

/// Per-document and per-collection change notifications
///
/// Implementations must be safe for concurrent subscribe and unsubscribe
/// calls from any number of watcher tasks.
#[cfg_attr(test, automock)]
pub trait ChangeFeed: Send + Sync + 'static {
    /// Follows one document. If its current revision differs from
    /// `known_revno`, a change is delivered right away.
    fn watch(
        &self,
        collection: &str,
        key: &str,
        known_revno: i64,
        tx: ChangeSender,
    );

    fn unwatch(
        &self,
        collection: &str,
        key: &str,
        tx: &ChangeSender,
    );

    /// Follows every document of a collection.
    fn watch_collection(
        &self,
        collection: &str,
        tx: ChangeSender,
    );

    fn unwatch_collection(
        &self,
        collection: &str,
        tx: &ChangeSender,
    );

    /// Token cancelled once the feed has died.
    fn dead(&self) -> CancellationToken;

    /// Reason the feed died, `None` while alive.
    fn err(&self) -> Option<FeedError>;
}

/// Returns the error a dead feed reports, for propagation to watchers.
pub fn must_err(feed: &dyn ChangeFeed) -> WatcherError {
    WatcherError::Feed(feed.err().unwrap_or(FeedError::Stopped))
}
