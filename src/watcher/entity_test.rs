use serde_json::json;

use crate::test_utils::*;
use crate::FeedError;
use crate::WatcherError;
use crate::MACHINES_C;
use crate::UNITS_C;

/// Test: the first signal is immediate and later changes coalesce
#[tokio::test]
async fn test_entity_signals() {
    let (store, hub, st) = setup();
    add_machine(&store, "0", &[]);

    let mut w = st.machine("0").unwrap().watch();
    next_change(&mut w).await;
    assert_no_change(&mut w).await;

    set_field(&store, MACHINES_C, "0", "life", json!("dying"));
    set_field(&store, MACHINES_C, "0", "life", json!("dead"));
    next_change(&mut w).await;
    assert_no_change(&mut w).await;

    store.remove(MACHINES_C, "0");
    next_change(&mut w).await;

    assert_eq!(w.stop().await, Ok(()));
    assert_eq!(hub.document_subscribers(MACHINES_C, "0"), 0);
}

/// Test: a handle older than the document signals the newer revision once
#[tokio::test]
async fn test_entity_stale_handle() {
    let (store, _hub, st) = setup();
    add_unit(&store, "u/0", None);
    let unit = st.unit("u/0").unwrap();
    set_field(&store, UNITS_C, "u/0", "life", json!("dying"));

    let mut w = unit.watch();
    next_change(&mut w).await;
    assert_no_change(&mut w).await;
}

/// Test: a handle whose document is already gone still signals once, then
/// stays quiet
#[tokio::test]
async fn test_entity_handle_on_removed_document() {
    let (store, hub, st) = setup();
    add_unit(&store, "u/0", None);
    let unit = st.unit("u/0").unwrap();
    store.remove(UNITS_C, "u/0");

    let mut w = unit.watch();
    next_change(&mut w).await;
    assert_no_change(&mut w).await;
    assert!(st.unit("u/0").is_err(), "consumer re-read must fail");

    assert_eq!(w.stop().await, Ok(()));
    assert_eq!(hub.document_subscribers(UNITS_C, "u/0"), 0);
}

#[tokio::test]
async fn test_service_entity_feed_death() {
    let (store, hub, st) = setup();
    add_service(&store, "wordpress");

    let mut w = st.service("wordpress").unwrap().watch();
    next_change(&mut w).await;

    hub.kill(Some(FeedError::Failed("lost".to_string())));
    assert_closed(&mut w).await;
    assert_eq!(w.err(), Err(WatcherError::Feed(FeedError::Failed("lost".to_string()))));
}
