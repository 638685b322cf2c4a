use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serde_json::Value;
use tokio::time::timeout;

use crate::ChangeHub;
use crate::MemStore;
use crate::State;
use crate::Watcher;
use crate::WatcherConfig;
use crate::MACHINES_C;
use crate::RELATION_SCOPES_C;
use crate::SERVICES_C;
use crate::SETTINGS_C;
use crate::UNITS_C;

/// Longest wait for a batch that is expected to arrive
pub(crate) const CHANGE_TIMEOUT: Duration = Duration::from_secs(1);

/// Wait used to assert that nothing arrives
pub(crate) const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// In-memory store and feed wired into a session with merge tracing on.
pub(crate) fn setup() -> (Arc<MemStore>, Arc<ChangeHub>, State) {
    let hub = Arc::new(ChangeHub::default());
    let store = Arc::new(MemStore::new(hub.clone()));
    let config = WatcherConfig {
        trace_merges: true,
        ..Default::default()
    };
    let st = State::new(store.clone(), hub.clone(), config);
    (store, hub, st)
}

/// Next batch of `w`, failing the test if none arrives in time.
pub(crate) async fn next_change<T>(w: &mut Watcher<T>) -> T {
    match timeout(CHANGE_TIMEOUT, w.next()).await {
        Ok(Some(batch)) => batch,
        Ok(None) => panic!("watcher closed unexpectedly: {:?}", w.err()),
        Err(_) => panic!("timed out waiting for a batch"),
    }
}

/// Fails the test if `w` delivers anything within [`QUIET_PERIOD`].
pub(crate) async fn assert_no_change<T: Debug>(w: &mut Watcher<T>) {
    if let Ok(batch) = timeout(QUIET_PERIOD, w.next()).await {
        panic!("unexpected batch: {:?}", batch);
    }
}

/// Waits until `w` closes its stream.
pub(crate) async fn assert_closed<T: Debug>(w: &mut Watcher<T>) {
    match timeout(CHANGE_TIMEOUT, w.next()).await {
        Ok(None) => {}
        Ok(Some(batch)) => panic!("expected closed stream, got {:?}", batch),
        Err(_) => panic!("timed out waiting for the stream to close"),
    }
}

/// Sorted copy, for comparing unordered batches.
pub(crate) fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

pub(crate) fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

pub(crate) fn add_machine(
    store: &MemStore,
    id: &str,
    principals: &[&str],
) -> i64 {
    store.put(MACHINES_C, id, json!({ "life": "alive", "principals": principals }))
}

pub(crate) fn add_service(
    store: &MemStore,
    name: &str,
) -> i64 {
    store.put(SERVICES_C, name, json!({ "life": "alive" }))
}

/// Principal unit, optionally assigned to a machine.
pub(crate) fn add_unit(
    store: &MemStore,
    name: &str,
    machine_id: Option<&str>,
) -> i64 {
    let service = name.split('/').next().unwrap_or(name);
    store.put(
        UNITS_C,
        name,
        json!({
            "service": service,
            "life": "alive",
            "principal": "",
            "machine_id": machine_id,
            "subordinates": [],
        }),
    )
}

pub(crate) fn add_subordinate(
    store: &MemStore,
    name: &str,
    principal: &str,
) -> i64 {
    let service = name.split('/').next().unwrap_or(name);
    store.put(
        UNITS_C,
        name,
        json!({
            "service": service,
            "life": "alive",
            "principal": principal,
            "machine_id": null,
            "subordinates": [],
        }),
    )
}

/// Overwrites a single field of an existing document.
pub(crate) fn set_field(
    store: &MemStore,
    collection: &str,
    id: &str,
    field: &str,
    value: Value,
) {
    store
        .update(collection, id, |body| body[field] = value)
        .expect("document should exist");
}

pub(crate) fn enter_scope(
    store: &MemStore,
    key: &str,
) {
    store.put(RELATION_SCOPES_C, key, json!({}));
}

pub(crate) fn put_settings(
    store: &MemStore,
    key: &str,
    values: Value,
) -> i64 {
    store.put(SETTINGS_C, key, values)
}
