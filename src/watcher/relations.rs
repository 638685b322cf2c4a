//! Relations a service takes part in, by relation id.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::merge_queued;
use super::KeyMatch;
use super::Outbox;
use super::Watcher;
use crate::must_err;
use crate::Change;
use crate::Life;
use crate::RelationDoc;
use crate::State;
use crate::Subscription;
use crate::WatcherResult;
use crate::KIND_RELATIONS;
use crate::RELATIONS_C;

/// Reports ids of a service's relations whose life changed
///
/// The first batch holds the id of every relation with an endpoint of the
/// service. Later batches hold relations that appeared, changed life or
/// vanished. A relation already seen Dead is not reported when removed.
pub type ServiceRelationsWatcher = Watcher<Vec<i64>>;

pub(crate) fn watch_service_relations(
    st: &State,
    service: &str,
) -> ServiceRelationsWatcher {
    let set = RelationsSet::new(st.clone(), service);
    Watcher::spawn(KIND_RELATIONS, move |outbox, dying| set.run(outbox, dying))
}

fn push_id(
    pending: &mut Vec<i64>,
    id: i64,
) -> bool {
    if pending.contains(&id) {
        return false;
    }
    pending.push(id);
    true
}

#[derive(Debug)]
pub(crate) struct RelationsSet {
    st: State,
    members: KeyMatch,
    /// Last read of every relation still present, by key
    pub(crate) known: HashMap<String, RelationDoc>,
}

impl RelationsSet {
    pub(crate) fn new(
        st: State,
        service: &str,
    ) -> Self {
        Self {
            st,
            members: KeyMatch::Endpoint(service.to_string()),
            known: HashMap::new(),
        }
    }

    pub(crate) fn initial(&mut self) -> WatcherResult<Vec<i64>> {
        let docs = self.st.store().find(RELATIONS_C, &self.members.filter())?;

        let mut ids = Vec::new();
        for doc in docs {
            if !self.members.matches(&doc.id) {
                continue;
            }
            let relation: RelationDoc = doc.decode(RELATIONS_C)?;
            ids.push(relation.id);
            self.known.insert(doc.id, relation);
        }
        Ok(ids)
    }

    /// Folds one feed change into `pending`. Relations are told apart by key;
    /// the id is what gets reported.
    pub(crate) fn merge(
        &mut self,
        pending: &mut Vec<i64>,
        change: &Change,
    ) -> WatcherResult<()> {
        let key = change.key.as_str();
        if !self.members.matches(key) {
            return Ok(());
        }

        let current = if change.is_removal() {
            None
        } else {
            self.st
                .find_doc(RELATIONS_C, key)?
                .map(|doc| doc.decode::<RelationDoc>(RELATIONS_C))
                .transpose()?
        };

        let reported = match current {
            None => match self.known.remove(key) {
                Some(old) => old.life != Life::Dead && push_id(pending, old.id),
                // Created and gone again before the re-read: nothing to name it by.
                None => false,
            },
            Some(doc) => {
                let id = doc.id;
                let changed = self.known.get(key).map_or(true, |old| old.life != doc.life);
                self.known.insert(key.to_string(), doc);
                changed && push_id(pending, id)
            }
        };

        if self.st.config().trace_merges {
            trace!(key, revno = change.revno, reported, "relation change merged");
        }
        Ok(())
    }

    async fn run(
        mut self,
        mut outbox: Outbox<Vec<i64>>,
        dying: CancellationToken,
    ) -> WatcherResult<()> {
        let feed = self.st.feed().clone();
        let feed_dead = feed.dead();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = Subscription::collection(feed.clone(), RELATIONS_C, tx);

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
