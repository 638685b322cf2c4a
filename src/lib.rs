//! Composable change-notification watchers.
//!
//! A single append-only change feed over persisted collections is turned into
//! many independent watchers, each tracking one slice of state (life of a
//! collection's members, units of a machine, presence in a relation scope,
//! settings of a document) and delivering coalesced incremental batches to
//! its consumer.
//!
//! ```ignore
//! let hub = Arc::new(ChangeHub::default());
//! let store = Arc::new(MemStore::new(hub.clone()));
//! let st = State::new(store, hub, WatcherConfig::default());
//!
//! let mut machines = st.watch_machines();
//! while let Some(ids) = machines.next().await {
//!     // initial snapshot first, then diffs
//! }
//! ```

mod config;
mod constants;
mod errors;
mod feed;
mod state;
mod storage;
mod watcher;

pub mod metrics;
pub mod utils;

pub use config::*;
pub use constants::*;
pub use errors::*;
pub use feed::*;
pub use state::*;
pub use storage::*;
pub use watcher::Changes;
pub use watcher::EntityWatcher;
pub use watcher::EnvironConfigWatcher;
pub use watcher::LifecyclesWatcher;
pub use watcher::MachinePrincipalUnitsWatcher;
pub use watcher::MachineUnitsWatcher;
pub use watcher::PrincipalUnitsChange;
pub use watcher::RelationUnitsChange;
pub use watcher::RelationUnitsWatcher;
pub use watcher::ScopeChange;
pub use watcher::ServiceRelationsWatcher;
pub use watcher::ScopeWatcher;
pub use watcher::Settings;
pub use watcher::SettingsWatcher;
pub use watcher::Supervisor;
pub use watcher::UnitSettings;
pub use watcher::Watcher;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
