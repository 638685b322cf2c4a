use std::collections::HashSet;

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
use crate::State;
use crate::Subscription;
use crate::WatcherResult;
use crate::KIND_SCOPE;
use crate::RELATION_SCOPES_C;
use crate::SCOPE_SEPARATOR;

/// Participants entering and leaving a scope since the previous batch
///
/// A participant that changed presence more than once before delivery
/// appears in both lists; its presence document tells where it ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeChange {
    pub entered: Vec<String>,
    pub left: Vec<String>,
}

impl ScopeChange {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

pub type ScopeWatcher = Watcher<ScopeChange>;

/// Watches presence documents `<scope>#<participant>`, ignoring `ignore`.
pub(crate) fn watch_scope(
    st: &State,
    scope: &str,
    ignore: &str,
) -> ScopeWatcher {
    let set = ScopeSet::new(st.clone(), scope, ignore);
    Watcher::spawn(KIND_SCOPE, move |outbox, dying| set.run(outbox, dying))
}

#[derive(Debug)]
pub(crate) struct ScopeSet {
    st: State,
    prefix: String,
    ignore: String,
    known: HashSet<String>,
}

impl ScopeSet {
    pub(crate) fn new(
        st: State,
        scope: &str,
        ignore: &str,
    ) -> Self {
        Self {
            st,
            prefix: format!("{scope}{SCOPE_SEPARATOR}"),
            ignore: ignore.to_string(),
            known: HashSet::new(),
        }
    }

    /// Participant named by a presence key, if it belongs to this scope.
    fn participant<'a>(
        &self,
        key: &'a str,
    ) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
            .filter(|name| !name.is_empty() && *name != self.ignore)
    }

    fn initial(&mut self) -> WatcherResult<ScopeChange> {
        let docs = self
            .st
            .store()
            .find(RELATION_SCOPES_C, &Filter::IdPrefix(self.prefix.clone()))?;

        let mut changes = ScopeChange::default();
        for doc in &docs {
            if let Some(name) = self.participant(&doc.id) {
                self.known.insert(name.to_string());
                changes.entered.push(name.to_string());
            }
        }
        Ok(changes)
    }

    /// Folds one presence change into `pending`. A participant that leaves
    /// and comes back before delivery is reported in both lists.
    fn merge(
        &mut self,
        pending: &mut ScopeChange,
        change: &Change,
    ) {
        let Some(name) = self.participant(&change.key) else {
            return;
        };

        if change.is_removal() {
            if self.known.remove(name) {
                push_unique(&mut pending.left, name);
            }
        } else if self.known.insert(name.to_string()) {
            push_unique(&mut pending.entered, name);
        }

        if self.st.config().trace_merges {
            trace!(participant = name, revno = change.revno, "scope change merged");
        }
    }

    async fn run(
        mut self,
        mut outbox: Outbox<ScopeChange>,
        dying: CancellationToken,
    ) -> WatcherResult<()> {
        let feed = self.st.feed().clone();
        let feed_dead = feed.dead();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = Subscription::collection(feed.clone(), RELATION_SCOPES_C, tx);

        let mut pending = self.initial()?;
        let mut sent_initial = false;
        loop {
            tokio::select! {
                biased;
                _ = dying.cancelled() => return Ok(()),
                _ = feed_dead.cancelled() => return Err(must_err(feed.as_ref())),
                Some(change) = rx.recv() => {
                    merge_queued(&mut rx, change, |c| {
                        self.merge(&mut pending, &c);
                        Ok(())
                    })?
                }
                _ = outbox.accept(), if outbox.accepting() => {}
            }
            if outbox.flush(!sent_initial || !pending.is_empty(), &mut pending) {
                sent_initial = true;
            }
        }
    }
}
