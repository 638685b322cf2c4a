//! Life-state tracking over a whole collection.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::merge_queued;
use super::push_unique;
use super::Outbox;
use super::Watcher;
use crate::must_err;
use crate::Change;
use crate::Filter;
use crate::Life;
use crate::LifeDoc;
use crate::State;
use crate::Subscription;
use crate::WatcherResult;
use crate::KIND_LIFECYCLES;

/// Reports ids whose life changed
///
/// The first batch holds every member regardless of life. Later batches hold
/// members that appeared, changed life or vanished. A member reported Dead or
/// removed is never reported again unless it is re-created.
pub type LifecyclesWatcher = Watcher<Vec<String>>;

/// Which keys of a collection belong to a watched set
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeyMatch {
    Any,
    Prefix(String),
    /// Relation keys with an endpoint of the named service
    Endpoint(String),
}

impl KeyMatch {
    pub(crate) fn matches(
        &self,
        key: &str,
    ) -> bool {
        match self {
            KeyMatch::Any => true,
            KeyMatch::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyMatch::Endpoint(service) => {
                let endpoint = format!("{service}:");
                key.starts_with(&endpoint) || key.contains(&format!(" {endpoint}"))
            }
        }
    }

    /// Narrowest store filter selecting a superset of the matching keys.
    pub(crate) fn filter(&self) -> Filter {
        match self {
            KeyMatch::Prefix(prefix) => Filter::IdPrefix(prefix.clone()),
            KeyMatch::Any | KeyMatch::Endpoint(_) => Filter::All,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LifecycleScope {
    collection: &'static str,
    members: KeyMatch,
}

impl LifecycleScope {
    pub(crate) fn new(
        collection: &'static str,
        members: KeyMatch,
    ) -> Self {
        Self { collection, members }
    }
}

pub(crate) fn watch_lifecycles(
    st: &State,
    scope: LifecycleScope,
) -> LifecyclesWatcher {
    let set = LifecycleSet::new(st.clone(), scope);
    Watcher::spawn(KIND_LIFECYCLES, move |outbox, dying| set.run(outbox, dying))
}

/// Diff state of a lifecycle watcher: last observed life per member
#[derive(Debug)]
pub(crate) struct LifecycleSet {
    st: State,
    scope: LifecycleScope,
    pub(crate) life: HashMap<String, Life>,
}

impl LifecycleSet {
    pub(crate) fn new(
        st: State,
        scope: LifecycleScope,
    ) -> Self {
        Self {
            st,
            scope,
            life: HashMap::new(),
        }
    }

    /// Loads every current member and returns them as the first batch.
    pub(crate) fn initial(&mut self) -> WatcherResult<Vec<String>> {
        let collection = self.scope.collection;
        let docs = self.st.store().find(collection, &self.scope.members.filter())?;

        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            if !self.scope.members.matches(&doc.id) {
                continue;
            }
            let LifeDoc { life } = doc.decode(collection)?;
            self.life.insert(doc.id.clone(), life);
            ids.push(doc.id);
        }
        Ok(ids)
    }

    /// Folds one feed change into `pending`.
    pub(crate) fn merge(
        &mut self,
        pending: &mut Vec<String>,
        change: &Change,
    ) -> WatcherResult<()> {
        let key = change.key.as_str();
        if !self.scope.members.matches(key) {
            return Ok(());
        }

        let current = if change.is_removal() {
            None
        } else {
            self.st
                .find_doc(self.scope.collection, key)?
                .map(|doc| doc.decode::<LifeDoc>(self.scope.collection))
                .transpose()?
                .map(|doc| doc.life)
        };

        let reported = match (self.life.get(key).copied(), current) {
            // Created and gone again before the re-read.
            (None, None) => !change.is_removal() && push_unique(pending, key),
            (Some(known), None) => {
                self.life.remove(key);
                known != Life::Dead && push_unique(pending, key)
            }
            (None, Some(life)) => {
                self.life.insert(key.to_string(), life);
                push_unique(pending, key)
            }
            (Some(known), Some(life)) => {
                self.life.insert(key.to_string(), life);
                known != life && push_unique(pending, key)
            }
        };

        if self.st.config().trace_merges {
            trace!(key, revno = change.revno, ?current, reported, "lifecycle change merged");
        }
        Ok(())
    }

    async fn run(
        mut self,
        mut outbox: Outbox<Vec<String>>,
        dying: CancellationToken,
    ) -> WatcherResult<()> {
        let feed = self.st.feed().clone();
        let feed_dead = feed.dead();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = Subscription::collection(feed.clone(), self.scope.collection, tx);

        let mut pending = self.initial()?;
        let mut sent_initial = false;
        loop {
            tokio::select! {
                biased;
                _ = dying.cancelled() => return Ok(()),
                _ = feed_dead.cancelled() => return Err(must_err(feed.as_ref())),
                Some(change) = rx.recv() => {
                    merge_queued(&mut rx, change, |c| self.merge(&mut pending, &c))?
                }
                _ = outbox.accept(), if outbox.accepting() => {}
            }
            if outbox.flush(!sent_initial || !pending.is_empty(), &mut pending) {
                sent_initial = true;
            }
        }
    }
}
