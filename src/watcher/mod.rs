//! Watchers turn raw feed changes into incremental, coalesced batches.
//!
//! Every watcher is one supervised task that owns its diff state outright and
//! hands batches to its consumer through a gated [`Changes`] stream. The
//! first batch is always the full initial snapshot; later batches are diffs
//! against what was already delivered.

mod delivery;
mod entity;
mod handle;
mod lifecycle;
mod membership;
mod relation_units;
mod relations;
mod scope;
mod settings;
mod supervisor;

pub(crate) use delivery::Outbox;
pub use delivery::Changes;
pub use entity::EntityWatcher;
pub(crate) use entity::watch_entity;
pub use handle::Watcher;
pub(crate) use lifecycle::watch_lifecycles;
pub(crate) use lifecycle::KeyMatch;
pub(crate) use lifecycle::LifecycleScope;
pub use lifecycle::LifecyclesWatcher;
pub(crate) use membership::watch_machine_units;
pub(crate) use membership::watch_principal_units;
pub use membership::MachinePrincipalUnitsWatcher;
pub use membership::MachineUnitsWatcher;
pub use membership::PrincipalUnitsChange;
pub(crate) use relation_units::watch_relation_units;
pub use relation_units::RelationUnitsChange;
pub use relation_units::RelationUnitsWatcher;
pub use relation_units::UnitSettings;
pub(crate) use relations::watch_service_relations;
pub use relations::ServiceRelationsWatcher;
pub(crate) use scope::watch_scope;
pub use scope::ScopeChange;
pub use scope::ScopeWatcher;
pub(crate) use settings::read_settings;
pub(crate) use settings::watch_environ_config;
pub(crate) use settings::watch_settings;
pub use settings::EnvironConfigWatcher;
pub use settings::Settings;
pub use settings::SettingsWatcher;
pub use supervisor::Supervisor;

use crate::Change;
use crate::ChangeReceiver;
use crate::WatcherResult;

#[cfg(test)]
mod entity_test;
#[cfg(test)]
mod membership_test;

/// Merges `first` and every change already queued behind it, so a batch
/// handed over afterwards covers everything the feed has delivered so far.
pub(crate) fn merge_queued<F>(
    rx: &mut ChangeReceiver,
    first: Change,
    mut merge: F,
) -> WatcherResult<()>
where
    F: FnMut(Change) -> WatcherResult<()>,
{
    merge(first)?;
    while let Ok(change) = rx.try_recv() {
        merge(change)?;
    }
    Ok(())
}

/// Appends `key` unless the batch already holds it.
pub(crate) fn push_unique(
    batch: &mut Vec<String>,
    key: &str,
) -> bool {
    if batch.iter().any(|k| k == key) {
        return false;
    }
    batch.push(key.to_string());
    true
}

/// Removes `key` from the batch, returning whether it was there.
pub(crate) fn remove_key(
    batch: &mut Vec<String>,
    key: &str,
) -> bool {
    match batch.iter().position(|k| k == key) {
        Some(pos) => {
            batch.remove(pos);
            true
        }
        None => false,
    }
}
