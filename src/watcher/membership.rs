//! Units assigned to a machine.
//!
//! Both watchers follow the machine document for its list of principals.
//! [`MachineUnitsWatcher`] additionally follows every attached unit and,
//! through them, their subordinates, however deeply nested. The walk
//! assumes the principal/subordinate relation is acyclic; a unit already
//! followed is never descended into again.

use std::collections::BTreeSet;
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
use crate::ChangeSender;
use crate::Filter;
use crate::Life;
use crate::Machine;
use crate::Subscription;
use crate::UnitDoc;
use crate::WatcherResult;
use crate::KIND_MACHINE_UNITS;
use crate::KIND_PRINCIPAL_UNITS;
use crate::MACHINES_C;
use crate::UNITS_C;

/// Reports units assigned to or unassigned from a machine, and life changes
/// of assigned units
///
/// The first batch holds every assigned unit regardless of life. A unit found
/// Dead is not reported again.
pub type MachineUnitsWatcher = Watcher<Vec<String>>;

pub(crate) fn watch_machine_units(machine: &Machine) -> MachineUnitsWatcher {
    let (tx, rx) = mpsc::unbounded_channel();
    let set = MachineUnits::new(machine.clone(), tx);
    Watcher::spawn(KIND_MACHINE_UNITS, move |outbox, dying| set.run(rx, outbox, dying))
}

/// A unit currently attached to the machine
#[derive(Debug)]
struct Followed {
    life: Life,
    /// Subordinates at the last read, dropped along with the unit
    subordinates: Vec<String>,
    _sub: Subscription,
}

#[derive(Debug)]
pub(crate) struct MachineUnits {
    machine: Machine,
    tx: ChangeSender,
    /// Principals listed by the machine at the last read
    listed: Vec<String>,
    known: HashMap<String, Followed>,
}

impl MachineUnits {
    fn new(
        machine: Machine,
        tx: ChangeSender,
    ) -> Self {
        Self {
            machine,
            tx,
            listed: Vec::new(),
            known: HashMap::new(),
        }
    }

    /// Re-reads the machine and diffs its principals against the last read.
    fn update_machine(
        &mut self,
        pending: &mut Vec<String>,
    ) -> WatcherResult<()> {
        self.machine.refresh()?;
        let principals = self.machine.principals().to_vec();

        for name in &self.listed.clone() {
            if !principals.contains(name) {
                self.forget(pending, name);
            }
        }
        for name in &principals {
            if !self.known.contains_key(name) {
                self.merge(pending, name)?;
            }
        }
        self.listed = principals;
        Ok(())
    }

    /// Re-reads one unit and attaches, updates or detaches it.
    fn merge(
        &mut self,
        pending: &mut Vec<String>,
        name: &str,
    ) -> WatcherResult<()> {
        let st = self.machine.state().clone();
        let doc = match st.find_doc(UNITS_C, name)? {
            Some(doc) => Some((doc.decode::<UnitDoc>(UNITS_C)?, doc.revno)),
            None => None,
        };
        let attached = doc.filter(|(unit, _)| {
            !unit.is_principal() || unit.machine_id.as_deref() == Some(self.machine.id())
        });
        let Some((unit, revno)) = attached else {
            // Removed, or unassigned from this machine.
            self.forget(pending, name);
            return Ok(());
        };

        match self.known.get_mut(name) {
            Some(followed) => {
                if followed.life != unit.life {
                    push_unique(pending, name);
                }
                followed.life = unit.life;
                followed.subordinates = unit.subordinates.clone();
            }
            None => {
                let sub = Subscription::document(st.feed().clone(), UNITS_C, name, revno, self.tx.clone());
                self.known.insert(
                    name.to_string(),
                    Followed {
                        life: unit.life,
                        subordinates: unit.subordinates.clone(),
                        _sub: sub,
                    },
                );
                push_unique(pending, name);
            }
        }

        if st.config().trace_merges {
            trace!(unit = name, life = ?unit.life, "machine unit merged");
        }

        for subordinate in &unit.subordinates {
            if !self.known.contains_key(subordinate) {
                self.merge(pending, subordinate)?;
            }
        }
        Ok(())
    }

    /// Stops following a unit and everything subordinate to it.
    fn forget(
        &mut self,
        pending: &mut Vec<String>,
        name: &str,
    ) {
        let Some(followed) = self.known.remove(name) else {
            return;
        };
        if followed.life != Life::Dead {
            push_unique(pending, name);
        }
        for subordinate in &followed.subordinates {
            self.forget(pending, subordinate);
        }
    }

    fn merge_change(
        &mut self,
        pending: &mut Vec<String>,
        change: &Change,
    ) -> WatcherResult<()> {
        if change.collection == MACHINES_C {
            self.update_machine(pending)
        } else if self.known.contains_key(&change.key) {
            self.merge(pending, &change.key)
        } else {
            // Queued before the unit was forgotten.
            Ok(())
        }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Change>,
        mut outbox: Outbox<Vec<String>>,
        dying: CancellationToken,
    ) -> WatcherResult<()> {
        let feed = self.machine.state().feed().clone();
        let feed_dead = feed.dead();
        let _machine_sub = Subscription::document(
            feed.clone(),
            MACHINES_C,
            self.machine.id(),
            self.machine.revno(),
            self.tx.clone(),
        );

        let mut pending = Vec::new();
        self.update_machine(&mut pending)?;
        let mut sent_initial = false;
        loop {
            tokio::select! {
                biased;
                _ = dying.cancelled() => return Ok(()),
                _ = feed_dead.cancelled() => return Err(must_err(feed.as_ref())),
                Some(change) = rx.recv() => {
                    merge_queued(&mut rx, change, |c| self.merge_change(&mut pending, &c))?
                }
                _ = outbox.accept(), if outbox.accepting() => {}
            }
            if outbox.flush(!sent_initial || !pending.is_empty(), &mut pending) {
                sent_initial = true;
            }
        }
    }
}

/// Principal units added to or removed from a machine since the previous
/// batch
///
/// A unit listed and unlisted again before delivery appears in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalUnitsChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl PrincipalUnitsChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub type MachinePrincipalUnitsWatcher = Watcher<PrincipalUnitsChange>;

pub(crate) fn watch_principal_units(machine: &Machine) -> MachinePrincipalUnitsWatcher {
    let set = PrincipalUnits {
        machine: machine.clone(),
        known: BTreeSet::new(),
    };
    Watcher::spawn(KIND_PRINCIPAL_UNITS, move |outbox, dying| set.run(outbox, dying))
}

#[derive(Debug)]
struct PrincipalUnits {
    machine: Machine,
    known: BTreeSet<String>,
}

impl PrincipalUnits {
    fn initial(&mut self) -> WatcherResult<PrincipalUnitsChange> {
        let filter = Filter::IdIn(self.machine.principals().to_vec());
        let docs = self.machine.state().store().find(UNITS_C, &filter)?;

        let mut changes = PrincipalUnitsChange::default();
        for doc in docs {
            self.known.insert(doc.id.clone());
            changes.added.push(doc.id);
        }
        Ok(changes)
    }

    /// Re-reads the machine and diffs its principals. Listed units that do
    /// not exist yet are skipped until they do.
    fn merge(
        &mut self,
        pending: &mut PrincipalUnitsChange,
    ) -> WatcherResult<()> {
        self.machine.refresh()?;
        let st = self.machine.state().clone();

        let mut listed = BTreeSet::new();
        for name in self.machine.principals() {
            if !self.known.contains(name) {
                if st.find_doc(UNITS_C, name)?.is_none() {
                    continue;
                }
                self.known.insert(name.clone());
                push_unique(&mut pending.added, name);
            }
            listed.insert(name.clone());
        }

        let gone: Vec<String> = self.known.difference(&listed).cloned().collect();
        for name in &gone {
            self.known.remove(name);
            push_unique(&mut pending.removed, name);
        }

        if st.config().trace_merges {
            trace!(added = ?pending.added, removed = ?pending.removed, "principal units merged");
        }
        Ok(())
    }

    async fn run(
        mut self,
        mut outbox: Outbox<PrincipalUnitsChange>,
        dying: CancellationToken,
    ) -> WatcherResult<()> {
        let feed = self.machine.state().feed().clone();
        let feed_dead = feed.dead();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = Subscription::document(
            feed.clone(),
            MACHINES_C,
            self.machine.id(),
            self.machine.revno(),
            tx,
        );

        let mut pending = self.initial()?;
        let mut sent_initial = false;
        loop {
            tokio::select! {
                biased;
                _ = dying.cancelled() => return Ok(()),
                _ = feed_dead.cancelled() => return Err(must_err(feed.as_ref())),
                Some(change) = rx.recv() => {
                    merge_queued(&mut rx, change, |_| self.merge(&mut pending))?
                }
                _ = outbox.accept(), if outbox.accepting() => {}
            }
            if outbox.flush(!sent_initial || !pending.is_empty(), &mut pending) {
                sent_initial = true;
            }
        }
    }
}
