use serde_json::json;

use super::*;
use crate::test_utils::*;
use crate::FeedError;
use crate::WatcherError;
use crate::MACHINES_C;
use crate::UNITS_C;

/// Test: a nested subordinate appearing under a followed unit is reported
#[tokio::test]
async fn test_machine_units_follow_nested_subordinates() {
    let (store, _hub, st) = setup();
    add_machine(&store, "0", &["u/0"]);
    add_unit(&store, "u/0", Some("0"));

    let machine = st.machine("0").unwrap();
    let mut w = machine.watch_units();
    assert_eq!(next_change(&mut w).await, names(&["u/0"]));

    add_subordinate(&store, "u-sub/0", "u/0");
    set_field(&store, UNITS_C, "u/0", "subordinates", json!(["u-sub/0"]));
    assert_eq!(next_change(&mut w).await, names(&["u-sub/0"]));

    // Sub-subordinates are followed too.
    add_subordinate(&store, "u-subsub/0", "u-sub/0");
    set_field(&store, UNITS_C, "u-sub/0", "subordinates", json!(["u-subsub/0"]));
    assert_eq!(next_change(&mut w).await, names(&["u-subsub/0"]));

    set_field(&store, UNITS_C, "u-subsub/0", "life", json!("dying"));
    assert_eq!(next_change(&mut w).await, names(&["u-subsub/0"]));
}

/// Test: the initial batch holds principals and their subordinates
#[tokio::test]
async fn test_machine_units_initial_snapshot() {
    let (store, _hub, st) = setup();
    add_machine(&store, "0", &["u/0", "v/0"]);
    add_unit(&store, "u/0", Some("0"));
    add_unit(&store, "v/0", Some("0"));
    add_subordinate(&store, "log/0", "u/0");
    set_field(&store, UNITS_C, "u/0", "subordinates", json!(["log/0"]));
    add_unit(&store, "w/0", Some("1"));

    let mut w = st.machine("0").unwrap().watch_units();
    assert_eq!(sorted(next_change(&mut w).await), names(&["log/0", "u/0", "v/0"]));
}

/// Test: a vanished principal takes its subordinates with it
#[tokio::test]
async fn test_machine_units_removal_drops_subordinates() {
    let (store, hub, st) = setup();
    add_machine(&store, "0", &["u/0"]);
    add_unit(&store, "u/0", Some("0"));
    add_subordinate(&store, "log/0", "u/0");
    set_field(&store, UNITS_C, "u/0", "subordinates", json!(["log/0"]));

    let mut w = st.machine("0").unwrap().watch_units();
    assert_eq!(sorted(next_change(&mut w).await), names(&["log/0", "u/0"]));
    assert_eq!(hub.document_subscribers(UNITS_C, "log/0"), 1);

    store.remove(UNITS_C, "u/0");
    assert_eq!(sorted(next_change(&mut w).await), names(&["log/0", "u/0"]));
    assert_eq!(hub.document_subscribers(UNITS_C, "log/0"), 0);
    assert_eq!(hub.document_subscribers(UNITS_C, "u/0"), 0);
}

/// Test: units are attached through the machine's principals list and
/// detached when they leave it
#[tokio::test]
async fn test_machine_units_follow_principals_list() {
    let (store, _hub, st) = setup();
    add_machine(&store, "0", &[]);
    add_unit(&store, "u/0", Some("0"));

    let mut w = st.machine("0").unwrap().watch_units();
    assert_eq!(next_change(&mut w).await, Vec::<String>::new());

    set_field(&store, MACHINES_C, "0", "principals", json!(["u/0"]));
    assert_eq!(next_change(&mut w).await, names(&["u/0"]));

    set_field(&store, UNITS_C, "u/0", "life", json!("dead"));
    assert_eq!(next_change(&mut w).await, names(&["u/0"]));

    // Dead units are not reported when they go away.
    set_field(&store, MACHINES_C, "0", "principals", json!([]));
    assert_no_change(&mut w).await;
}

/// Test: a unit reassigned to another machine is reported and dropped
#[tokio::test]
async fn test_machine_units_unassigned() {
    let (store, hub, st) = setup();
    add_machine(&store, "0", &["u/0"]);
    add_unit(&store, "u/0", Some("0"));

    let mut w = st.machine("0").unwrap().watch_units();
    assert_eq!(next_change(&mut w).await, names(&["u/0"]));

    set_field(&store, UNITS_C, "u/0", "machine_id", json!("1"));
    assert_eq!(next_change(&mut w).await, names(&["u/0"]));
    assert_eq!(hub.document_subscribers(UNITS_C, "u/0"), 0);
}

/// Test: a removed machine is a fatal condition
#[tokio::test]
async fn test_machine_units_machine_removed() {
    let (store, _hub, st) = setup();
    add_machine(&store, "0", &[]);

    let mut w = st.machine("0").unwrap().watch_units();
    assert_eq!(next_change(&mut w).await, Vec::<String>::new());

    store.remove(MACHINES_C, "0");
    assert_closed(&mut w).await;
    assert_eq!(w.err(), Err(WatcherError::not_found(MACHINES_C, "0")));
}

fn principals(
    added: &[&str],
    removed: &[&str],
) -> PrincipalUnitsChange {
    PrincipalUnitsChange {
        added: names(added),
        removed: names(removed),
    }
}

#[tokio::test]
async fn test_principal_units_added_and_removed() {
    let (store, _hub, st) = setup();
    add_machine(&store, "0", &["u/0"]);
    add_unit(&store, "u/0", Some("0"));
    add_unit(&store, "v/0", Some("0"));

    let mut w = st.machine("0").unwrap().watch_principal_units();
    assert_eq!(next_change(&mut w).await, principals(&["u/0"], &[]));

    set_field(&store, MACHINES_C, "0", "principals", json!(["u/0", "v/0"]));
    assert_eq!(next_change(&mut w).await, principals(&["v/0"], &[]));

    set_field(&store, MACHINES_C, "0", "principals", json!(["v/0"]));
    assert_eq!(next_change(&mut w).await, principals(&[], &["u/0"]));
}

/// Test: listed units that do not exist yet are skipped until they do
#[tokio::test]
async fn test_principal_units_skip_missing() {
    let (store, _hub, st) = setup();
    add_machine(&store, "0", &["ghost/0"]);

    let mut w = st.machine("0").unwrap().watch_principal_units();
    assert_eq!(next_change(&mut w).await, PrincipalUnitsChange::default());

    set_field(&store, MACHINES_C, "0", "life", json!("dying"));
    assert_no_change(&mut w).await;

    add_unit(&store, "ghost/0", Some("0"));
    set_field(&store, MACHINES_C, "0", "life", json!("alive"));
    assert_eq!(next_change(&mut w).await, principals(&["ghost/0"], &[]));
}

/// Test: a unit listed and unlisted again before delivery is reported in
/// both lists
#[tokio::test]
async fn test_principal_units_added_then_removed() {
    let (store, _hub, st) = setup();
    add_machine(&store, "0", &[]);
    add_unit(&store, "v/0", Some("0"));

    let mut w = st.machine("0").unwrap().watch_principal_units();
    assert_eq!(next_change(&mut w).await, PrincipalUnitsChange::default());

    set_field(&store, MACHINES_C, "0", "principals", json!(["v/0"]));
    // Merged while nobody is asking, so it stays pending.
    tokio::time::sleep(QUIET_PERIOD).await;
    set_field(&store, MACHINES_C, "0", "principals", json!([]));

    assert_eq!(next_change(&mut w).await, principals(&["v/0"], &["v/0"]));
    assert_no_change(&mut w).await;
}

#[tokio::test]
async fn test_principal_units_feed_death() {
    let (store, hub, st) = setup();
    add_machine(&store, "0", &[]);

    let mut w = st.machine("0").unwrap().watch_principal_units();
    assert_eq!(next_change(&mut w).await, PrincipalUnitsChange::default());

    hub.kill(None);
    assert_closed(&mut w).await;
    assert_eq!(w.stop().await, Err(WatcherError::Feed(FeedError::Stopped)));
    assert_eq!(hub.document_subscribers(MACHINES_C, "0"), 0);
}
