use std::sync::Arc;

use tracing::trace;

use super::ChangeFeed;
use super::ChangeSender;

/// What a [`Subscription`] follows
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Collection(String),
    Document { collection: String, key: String },
}

/// Scoped feed subscription
///
/// Subscribes on construction and unsubscribes when dropped, so every exit
/// path of a watcher task (stop, error, panic) releases what it followed.
pub struct Subscription {
    feed: Arc<dyn ChangeFeed>,
    target: Target,
    tx: ChangeSender,
}

impl Subscription {
    pub fn collection(
        feed: Arc<dyn ChangeFeed>,
        collection: &str,
        tx: ChangeSender,
    ) -> Self {
        feed.watch_collection(collection, tx.clone());
        trace!(collection, "subscribed to collection");
        Self {
            feed,
            target: Target::Collection(collection.to_string()),
            tx,
        }
    }

    pub fn document(
        feed: Arc<dyn ChangeFeed>,
        collection: &str,
        key: &str,
        known_revno: i64,
        tx: ChangeSender,
    ) -> Self {
        feed.watch(collection, key, known_revno, tx.clone());
        trace!(collection, key, known_revno, "subscribed to document");
        Self {
            feed,
            target: Target::Document {
                collection: collection.to_string(),
                key: key.to_string(),
            },
            tx,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Subscription").field("target", &self.target).finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match &self.target {
            Target::Collection(collection) => {
                self.feed.unwatch_collection(collection, &self.tx);
                trace!(collection = %collection, "unsubscribed from collection");
            }
            Target::Document { collection, key } => {
                self.feed.unwatch(collection, key, &self.tx);
                trace!(collection = %collection, key = %key, "unsubscribed from document");
            }
        }
    }
}
