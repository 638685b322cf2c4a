//! Session object and entity handles.
//!
//! [`State`] carries the store and the change feed every watcher depends on.
//! There is no process-wide feed: whoever builds the `State` owns the feed's
//! lifetime, and every watcher started from it (or from one of its entity
//! handles) follows that feed.

mod docs;
mod environ;

pub use docs::*;
pub use environ::*;


use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::watcher::watch_entity;
use crate::watcher::watch_environ_config;
use crate::watcher::watch_lifecycles;
use crate::watcher::watch_machine_units;
use crate::watcher::watch_principal_units;
use crate::watcher::watch_relation_units;
use crate::watcher::watch_scope;
use crate::watcher::watch_service_relations;
use crate::watcher::watch_settings;
use crate::watcher::KeyMatch;
use crate::watcher::LifecycleScope;
use crate::ChangeFeed;
use crate::Document;
use crate::EntityWatcher;
use crate::EnvironConfigWatcher;
use crate::LifecyclesWatcher;
use crate::MachinePrincipalUnitsWatcher;
use crate::MachineUnitsWatcher;
use crate::RelationUnitsWatcher;
use crate::ScopeWatcher;
use crate::ServiceRelationsWatcher;
use crate::SettingsWatcher;
use crate::Store;
use crate::WatcherConfig;
use crate::WatcherError;
use crate::WatcherResult;
use crate::MACHINES_C;
use crate::SCOPE_SEPARATOR;
use crate::SERVICES_C;
use crate::SERVICE_SETTINGS_PREFIX;
use crate::UNITS_C;

#[derive(Clone)]
pub struct State {
    store: Arc<dyn Store>,
    feed: Arc<dyn ChangeFeed>,
    config: WatcherConfig,
}

impl std::fmt::Debug for State {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("State").field("config", &self.config).finish_non_exhaustive()
    }
}

impl State {
    pub fn new(
        store: Arc<dyn Store>,
        feed: Arc<dyn ChangeFeed>,
        config: WatcherConfig,
    ) -> Self {
        Self { store, feed, config }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn feed(&self) -> &Arc<dyn ChangeFeed> {
        &self.feed
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Point read; `Ok(None)` when the document does not exist.
    pub(crate) fn find_doc(
        &self,
        collection: &str,
        key: &str,
    ) -> WatcherResult<Option<Document>> {
        Ok(self.store.find_id(collection, key)?)
    }

    /// Point read of a document that must exist, decoded with its revision.
    fn load<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> WatcherResult<(T, i64)> {
        let doc = self
            .find_doc(collection, key)?
            .ok_or_else(|| WatcherError::not_found(collection, key))?;
        Ok((doc.decode(collection)?, doc.revno))
    }

    pub fn machine(
        &self,
        id: &str,
    ) -> WatcherResult<Machine> {
        let (doc, revno) = self.load(MACHINES_C, id)?;
        Ok(Machine {
            st: self.clone(),
            id: id.to_string(),
            revno,
            doc,
        })
    }

    pub fn service(
        &self,
        name: &str,
    ) -> WatcherResult<Service> {
        let (doc, revno) = self.load(SERVICES_C, name)?;
        Ok(Service {
            st: self.clone(),
            name: name.to_string(),
            revno,
            doc,
        })
    }

    pub fn unit(
        &self,
        name: &str,
    ) -> WatcherResult<Unit> {
        let (doc, revno) = self.load(UNITS_C, name)?;
        Ok(Unit {
            st: self.clone(),
            name: name.to_string(),
            revno,
            doc,
        })
    }

    /// Handle on `unit`'s membership of relation scope `scope`.
    pub fn relation_unit(
        &self,
        scope: &str,
        unit: &str,
    ) -> RelationUnit {
        RelationUnit {
            st: self.clone(),
            scope: scope.to_string(),
            unit: unit.to_string(),
        }
    }

    /// Life changes of every machine.
    pub fn watch_machines(&self) -> LifecyclesWatcher {
        watch_lifecycles(self, LifecycleScope::new(MACHINES_C, KeyMatch::Any))
    }

    /// Life changes of every service.
    pub fn watch_services(&self) -> LifecyclesWatcher {
        watch_lifecycles(self, LifecycleScope::new(SERVICES_C, KeyMatch::Any))
    }

    pub fn watch_settings(
        &self,
        key: &str,
    ) -> SettingsWatcher {
        watch_settings(self, key)
    }

    pub fn watch_environ_config(&self) -> EnvironConfigWatcher {
        watch_environ_config(self)
    }
}

#[derive(Debug, Clone)]
pub struct Machine {
    st: State,
    id: String,
    revno: i64,
    doc: MachineDoc,
}

impl Machine {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn revno(&self) -> i64 {
        self.revno
    }

    pub fn life(&self) -> Life {
        self.doc.life
    }

    pub fn principals(&self) -> &[String] {
        &self.doc.principals
    }

    /// Re-reads the machine. Fails with `NotFound` once it was removed.
    pub fn refresh(&mut self) -> WatcherResult<()> {
        let (doc, revno) = self.st.load(MACHINES_C, &self.id)?;
        self.doc = doc;
        self.revno = revno;
        Ok(())
    }

    pub fn watch(&self) -> EntityWatcher {
        watch_entity(&self.st, MACHINES_C, &self.id, self.revno)
    }

    /// Every unit assigned to the machine, subordinates included.
    pub fn watch_units(&self) -> MachineUnitsWatcher {
        watch_machine_units(self)
    }

    pub fn watch_principal_units(&self) -> MachinePrincipalUnitsWatcher {
        watch_principal_units(self)
    }

    pub(crate) fn state(&self) -> &State {
        &self.st
    }
}

#[derive(Debug, Clone)]
pub struct Service {
    st: State,
    name: String,
    revno: i64,
    doc: ServiceDoc,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revno(&self) -> i64 {
        self.revno
    }

    pub fn life(&self) -> Life {
        self.doc.life
    }

    pub fn watch(&self) -> EntityWatcher {
        watch_entity(&self.st, SERVICES_C, &self.name, self.revno)
    }

    /// Life changes of the service's units.
    pub fn watch_units(&self) -> LifecyclesWatcher {
        watch_lifecycles(
            &self.st,
            LifecycleScope::new(UNITS_C, KeyMatch::Prefix(format!("{}/", self.name))),
        )
    }

    /// Life changes of the relations the service takes part in, by relation
    /// id.
    pub fn watch_relations(&self) -> ServiceRelationsWatcher {
        watch_service_relations(&self.st, &self.name)
    }

    /// The service's configuration settings.
    pub fn watch_config(&self) -> SettingsWatcher {
        watch_settings(&self.st, &format!("{SERVICE_SETTINGS_PREFIX}{}", self.name))
    }
}

#[derive(Debug, Clone)]
pub struct Unit {
    st: State,
    name: String,
    revno: i64,
    doc: UnitDoc,
}

impl Unit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revno(&self) -> i64 {
        self.revno
    }

    pub fn life(&self) -> Life {
        self.doc.life
    }

    pub fn service_name(&self) -> &str {
        &self.doc.service
    }

    pub fn principal(&self) -> Option<&str> {
        (!self.doc.is_principal()).then_some(self.doc.principal.as_str())
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.doc.machine_id.as_deref()
    }

    pub fn subordinates(&self) -> &[String] {
        &self.doc.subordinates
    }

    pub fn watch(&self) -> EntityWatcher {
        watch_entity(&self.st, UNITS_C, &self.name, self.revno)
    }
}

/// A unit's view of one relation scope
#[derive(Debug, Clone)]
pub struct RelationUnit {
    st: State,
    scope: String,
    unit: String,
}

impl RelationUnit {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn unit_name(&self) -> &str {
        &self.unit
    }

    /// Key shared by the unit's scope presence document and its relation
    /// settings document.
    pub fn settings_key(&self) -> String {
        format!("{}{SCOPE_SEPARATOR}{}", self.scope, self.unit)
    }

    /// Other units entering and leaving the scope.
    pub fn watch_scope(&self) -> ScopeWatcher {
        watch_scope(&self.st, &self.scope, &self.unit)
    }

    /// Counterpart units joining, changing settings and departing.
    pub fn watch(&self) -> RelationUnitsWatcher {
        watch_relation_units(self)
    }

    pub(crate) fn state(&self) -> &State {
        &self.st
    }
}
