use std::sync::Arc;

use tokio::sync::mpsc;

use super::*;

/// Test: a collection subscription unwatches with the same channel on drop
#[test]
fn test_collection_subscription_unwatches_on_drop() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let expected = tx.clone();

    let mut feed = MockChangeFeed::new();
    feed.expect_watch_collection()
        .withf(|collection, _| collection == "units")
        .times(1)
        .return_const(());
    feed.expect_unwatch_collection()
        .withf(move |collection, tx| collection == "units" && tx.same_channel(&expected))
        .times(1)
        .return_const(());

    let sub = Subscription::collection(Arc::new(feed), "units", tx);
    drop(sub);
}

/// Test: a document subscription passes its known revision and unwatches on
/// drop
#[test]
fn test_document_subscription_unwatches_on_drop() {
    let (tx, _rx) = mpsc::unbounded_channel();

    let mut feed = MockChangeFeed::new();
    feed.expect_watch()
        .withf(|collection, key, known_revno, _| collection == "settings" && key == "e" && *known_revno == 7)
        .times(1)
        .return_const(());
    feed.expect_unwatch()
        .withf(|collection, key, _| collection == "settings" && key == "e")
        .times(1)
        .return_const(());

    let sub = Subscription::document(Arc::new(feed), "settings", "e", 7, tx);
    assert!(format!("{:?}", sub).contains("settings"));
}

/// Test: subscriptions are released when the owning task panics
#[tokio::test]
async fn test_subscription_released_on_panic() {
    let hub = Arc::new(ChangeHub::default());
    let feed: Arc<dyn ChangeFeed> = hub.clone();

    let task = tokio::spawn(async move {
        let (tx, _rx) = mpsc::unbounded_channel();
        let _sub = Subscription::collection(feed, "machines", tx);
        panic!("watcher body failed");
    });
    assert!(task.await.is_err());
    assert_eq!(hub.collection_subscribers("machines"), 0);
}
