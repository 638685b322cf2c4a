//! Counterpart units of a relation scope and their settings.
//!
//! The watcher owns a [`ScopeWatcher`] for presence and one settings
//! subscription per counterpart in scope. It stops the scope watcher and
//! drops every subscription on all exit paths.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::merge_queued;
use super::push_unique;
use super::read_settings;
use super::remove_key;
use super::watch_scope;
use super::Outbox;
use super::ScopeChange;
use super::ScopeWatcher;
use super::Watcher;
use crate::must_err;
use crate::Change;
use crate::ChangeSender;
use crate::RelationUnit;
use crate::State;
use crate::Subscription;
use crate::WatcherError;
use crate::WatcherResult;
use crate::KIND_RELATION_UNITS;
use crate::KIND_SCOPE;
use crate::RELATION_SCOPES_C;
use crate::SCOPE_SEPARATOR;
use crate::SETTINGS_C;

/// Relation settings of one counterpart unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitSettings {
    /// Revision of the settings document
    pub version: i64,
    pub settings: BTreeMap<String, Value>,
}

/// Counterparts joining, changing settings and departing
///
/// A name appears in at most one of `joined` and `departed`. A counterpart's
/// settings appear in `changed` from the batch that reports it joined until
/// it departs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationUnitsChange {
    pub joined: Vec<String>,
    pub changed: BTreeMap<String, UnitSettings>,
    pub departed: Vec<String>,
}

impl RelationUnitsChange {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.changed.is_empty() && self.departed.is_empty()
    }
}

pub type RelationUnitsWatcher = Watcher<RelationUnitsChange>;

pub(crate) fn watch_relation_units(ru: &RelationUnit) -> RelationUnitsWatcher {
    let st = ru.state().clone();
    let scope = ru.scope().to_string();
    let ignore = ru.unit_name().to_string();
    Watcher::spawn(KIND_RELATION_UNITS, move |outbox, dying| async move {
        let mut scope_watcher = watch_scope(&st, &scope, &ignore);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut set = RelationUnitsSet::new(st, &scope, tx);

        let result = set.run(&mut scope_watcher, rx, outbox, dying).await;
        // Settings subscriptions go before the scope watcher is awaited.
        drop(set);
        let stopped = scope_watcher.stop().await;
        result.and(stopped)
    })
}

#[derive(Debug)]
struct RelationUnitsSet {
    st: State,
    prefix: String,
    tx: ChangeSender,
    /// Settings subscription per counterpart currently in scope
    following: HashMap<String, Subscription>,
}

impl RelationUnitsSet {
    fn new(
        st: State,
        scope: &str,
        tx: ChangeSender,
    ) -> Self {
        Self {
            st,
            prefix: format!("{scope}{SCOPE_SEPARATOR}"),
            tx,
            following: HashMap::new(),
        }
    }

    /// Reads a counterpart's settings into `changed`, returning their
    /// revision.
    fn merge_settings(
        &self,
        pending: &mut RelationUnitsChange,
        name: &str,
    ) -> WatcherResult<i64> {
        let settings = read_settings(&self.st, &format!("{}{name}", self.prefix))?;
        let revno = settings.revno;
        pending.changed.insert(
            name.to_string(),
            UnitSettings {
                version: revno,
                settings: settings.values,
            },
        );
        Ok(revno)
    }

    /// Whether `name`'s presence document currently exists.
    fn in_scope(
        &self,
        name: &str,
    ) -> WatcherResult<bool> {
        let key = format!("{}{name}", self.prefix);
        Ok(self.st.find_doc(RELATION_SCOPES_C, &key)?.is_some())
    }

    fn join(
        &mut self,
        pending: &mut RelationUnitsChange,
        name: &str,
    ) -> WatcherResult<()> {
        // Left and came back; its settings subscription never lapsed.
        if self.following.contains_key(name) {
            return Ok(());
        }
        let revno = self.merge_settings(pending, name)?;
        // Back before its departure was delivered: still joined as far as
        // the consumer knows.
        if !remove_key(&mut pending.departed, name) {
            push_unique(&mut pending.joined, name);
        }

        let key = format!("{}{name}", self.prefix);
        let sub = Subscription::document(self.st.feed().clone(), SETTINGS_C, &key, revno, self.tx.clone());
        self.following.insert(name.to_string(), sub);
        Ok(())
    }

    fn depart(
        &mut self,
        pending: &mut RelationUnitsChange,
        name: &str,
    ) {
        if self.following.remove(name).is_none() {
            return;
        }
        pending.changed.remove(name);
        // A join nobody has seen yet is simply withdrawn.
        if !remove_key(&mut pending.joined, name) {
            push_unique(&mut pending.departed, name);
        }
    }

    fn merge_scope(
        &mut self,
        pending: &mut RelationUnitsChange,
        change: ScopeChange,
    ) -> WatcherResult<()> {
        for name in &change.left {
            if !change.entered.contains(name) {
                self.depart(pending, name);
            }
        }
        for name in &change.entered {
            // Both directions in one batch: the order is lost, so ask the store.
            if change.left.contains(name) && !self.in_scope(name)? {
                self.depart(pending, name);
            } else {
                self.join(pending, name)?;
            }
        }

        if self.st.config().trace_merges {
            trace!(entered = ?change.entered, left = ?change.left, "scope change merged");
        }
        Ok(())
    }

    fn merge_settings_change(
        &self,
        pending: &mut RelationUnitsChange,
        change: &Change,
    ) -> WatcherResult<()> {
        // Departures arrive through the scope.
        if change.is_removal() {
            return Ok(());
        }
        let Some(name) = change.key.strip_prefix(self.prefix.as_str()) else {
            return Ok(());
        };
        if !self.following.contains_key(name) {
            return Ok(());
        }
        self.merge_settings(pending, name)?;

        if self.st.config().trace_merges {
            trace!(unit = name, revno = change.revno, "settings change merged");
        }
        Ok(())
    }

    async fn run(
        &mut self,
        scope: &mut ScopeWatcher,
        mut rx: mpsc::UnboundedReceiver<Change>,
        mut outbox: Outbox<RelationUnitsChange>,
        dying: CancellationToken,
    ) -> WatcherResult<()> {
        let feed = self.st.feed().clone();
        let feed_dead = feed.dead();

        let mut pending = RelationUnitsChange::default();
        // Nothing is offered before the scope's initial snapshot arrives.
        let mut scope_seen = false;
        let mut sent_initial = false;
        loop {
            let mut scope_closed = false;
            tokio::select! {
                biased;
                _ = dying.cancelled() => return Ok(()),
                _ = feed_dead.cancelled() => return Err(must_err(feed.as_ref())),
                next = scope.next() => match next {
                    Some(change) => {
                        self.merge_scope(&mut pending, change)?;
                        scope_seen = true;
                    }
                    None => scope_closed = true,
                },
                Some(change) = rx.recv() => {
                    merge_queued(&mut rx, change, |c| self.merge_settings_change(&mut pending, &c))?
                }
                _ = outbox.accept(), if outbox.accepting() => {}
            }
            if scope_closed {
                return Err(scope
                    .wait()
                    .await
                    .err()
                    .unwrap_or(WatcherError::UpstreamStopped(KIND_SCOPE)));
            }

            let ready = scope_seen && (!sent_initial || !pending.is_empty());
            if outbox.flush(ready, &mut pending) {
                sent_initial = true;
            }
        }
    }
}
