//! In-memory change feed
//!
//! [`ChangeHub`] fans published changes out to document and collection
//! subscribers. Publishing never blocks: every subscriber owns an unbounded
//! channel, and subscribers whose receiving half is gone are pruned on the
//! next publish to their key.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Change;
use super::ChangeFeed;
use super::ChangeSender;
use crate::metrics::FEED_CHANGES;
use crate::FeedConfig;
use crate::FeedError;
use crate::REVNO_REMOVED;

type DocKey = (String, String);

#[derive(Debug)]
pub struct ChangeHub {
    /// Subscribers following a whole collection
    collections: DashMap<String, Vec<ChangeSender>>,

    /// Subscribers following a single document
    documents: DashMap<DocKey, Vec<ChangeSender>>,

    /// Latest revision published per document. A removal stays recorded
    /// only while someone follows the document, so stale followers learn of
    /// it; it is dropped with the last of them.
    revnos: DashMap<DocKey, i64>,

    dead: CancellationToken,
    err: ArcSwapOption<FeedError>,
}

impl ChangeHub {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            collections: DashMap::with_capacity(config.registry_capacity),
            documents: DashMap::with_capacity(config.registry_capacity),
            revnos: DashMap::with_capacity(config.registry_capacity),
            dead: CancellationToken::new(),
            err: ArcSwapOption::empty(),
        }
    }

    /// Delivers `change` to everything following its document or collection.
    ///
    /// Changes published after the hub died are discarded.
    pub fn publish(
        &self,
        change: Change,
    ) {
        if self.dead.is_cancelled() {
            trace!(?change, "feed is dead, dropping change");
            return;
        }
        FEED_CHANGES.with_label_values(&[&change.collection]).inc();

        let doc_key = (change.collection.clone(), change.key.clone());
        self.revnos.insert(doc_key.clone(), change.revno);

        let mut delivered = 0;
        if let Some(mut subscribers) = self.documents.get_mut(&doc_key) {
            subscribers.retain(|tx| tx.send(change.clone()).is_ok());
            delivered += subscribers.len();
        }
        if change.is_removal() && delivered == 0 {
            self.revnos.remove(&doc_key);
        }
        if let Some(mut subscribers) = self.collections.get_mut(&change.collection) {
            subscribers.retain(|tx| tx.send(change.clone()).is_ok());
            delivered += subscribers.len();
        }

        trace!(
            collection = %change.collection,
            key = %change.key,
            revno = change.revno,
            delivered,
            "change published"
        );
    }

    /// Latest published revision of a document, `None` if it does not exist.
    pub fn revno(
        &self,
        collection: &str,
        key: &str,
    ) -> Option<i64> {
        self.revnos
            .get(&(collection.to_string(), key.to_string()))
            .map(|r| *r)
            .filter(|r| *r != REVNO_REMOVED)
    }

    /// Kills the feed. Every dependent watcher terminates with `err`
    /// (or [`FeedError::Stopped`] when `None`).
    pub fn kill(
        &self,
        err: Option<FeedError>,
    ) {
        if self.dead.is_cancelled() {
            return;
        }
        let reason = err.unwrap_or(FeedError::Stopped);
        warn!("change feed dying: {}", reason);
        self.err.store(Some(Arc::new(reason)));
        self.dead.cancel();
    }

    /// Number of subscriptions on a document, for tests and monitoring.
    pub fn document_subscribers(
        &self,
        collection: &str,
        key: &str,
    ) -> usize {
        self.documents
            .get(&(collection.to_string(), key.to_string()))
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Number of subscriptions on a collection, for tests and monitoring.
    pub fn collection_subscribers(
        &self,
        collection: &str,
    ) -> usize {
        self.collections.get(collection).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(&FeedConfig::default())
    }
}

impl ChangeFeed for ChangeHub {
    fn watch(
        &self,
        collection: &str,
        key: &str,
        known_revno: i64,
        tx: ChangeSender,
    ) {
        let doc_key = (collection.to_string(), key.to_string());
        // Registered first so that no publish can slip between the revision
        // check and the registration. A removed document reports
        // REVNO_REMOVED here, so a stale holder learns of the removal.
        self.documents.entry(doc_key.clone()).or_default().push(tx.clone());

        if let Some(current) = self.revnos.get(&doc_key).map(|r| *r) {
            if current != known_revno {
                debug!(collection, key, known_revno, current, "document ahead of known revision");
                let _ = tx.send(Change::new(collection, key, current));
            }
        }
    }

    fn unwatch(
        &self,
        collection: &str,
        key: &str,
        tx: &ChangeSender,
    ) {
        let doc_key = (collection.to_string(), key.to_string());
        let emptied = self.documents.remove_if_mut(&doc_key, |_key, subscribers| {
            if let Some(pos) = subscribers.iter().position(|s| s.same_channel(tx)) {
                subscribers.swap_remove(pos);
            }
            subscribers.is_empty()
        });
        if emptied.is_some() {
            self.revnos.remove_if(&doc_key, |_key, revno| *revno == REVNO_REMOVED);
        }
    }

    fn watch_collection(
        &self,
        collection: &str,
        tx: ChangeSender,
    ) {
        self.collections.entry(collection.to_string()).or_default().push(tx);
    }

    fn unwatch_collection(
        &self,
        collection: &str,
        tx: &ChangeSender,
    ) {
        self.collections.remove_if_mut(collection, |_key, subscribers| {
            if let Some(pos) = subscribers.iter().position(|s| s.same_channel(tx)) {
                subscribers.swap_remove(pos);
            }
            subscribers.is_empty()
        });
    }

    fn dead(&self) -> CancellationToken {
        self.dead.clone()
    }

    fn err(&self) -> Option<FeedError> {
        self.err.load_full().map(|e| (*e).clone())
    }
}
