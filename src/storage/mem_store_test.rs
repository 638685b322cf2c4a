use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use super::*;
use crate::Change;
use crate::ChangeFeed;
use crate::ChangeHub;
use crate::LifeDoc;
use crate::StorageError;
use crate::WatcherError;
use crate::REVNO_REMOVED;

fn store() -> (MemStore, Arc<ChangeHub>) {
    let hub = Arc::new(ChangeHub::default());
    (MemStore::new(hub.clone()), hub)
}

#[test]
fn test_insert_then_find_id() {
    let (store, _hub) = store();
    let revno = store.insert("machines", "0", json!({"life": "alive"})).unwrap();
    assert_eq!(revno, 1);

    let doc = store.find_id("machines", "0").unwrap().unwrap();
    assert_eq!(doc.revno, 1);
    assert_eq!(doc.body, json!({"life": "alive"}));
    assert!(store.find_id("machines", "1").unwrap().is_none());
}

#[test]
fn test_insert_existing_fails() {
    let (store, _hub) = store();
    store.insert("machines", "0", json!({})).unwrap();
    assert_eq!(
        store.insert("machines", "0", json!({})),
        Err(StorageError::DocumentExists {
            collection: "machines".to_string(),
            id: "0".to_string(),
        })
    );
}

#[test]
fn test_update_missing_fails() {
    let (store, _hub) = store();
    let result = store.update("units", "u/0", |_| {});
    assert!(matches!(result, Err(StorageError::DocumentMissing { .. })));
}

/// Test: revisions keep growing across removal and re-creation
#[test]
fn test_revnos_survive_removal() {
    let (store, hub) = store();
    assert_eq!(store.put("units", "u/0", json!({})), 1);
    assert_eq!(store.update("units", "u/0", |b| b["life"] = json!("dying")).unwrap(), 2);
    assert!(store.remove("units", "u/0"));
    assert!(!store.remove("units", "u/0"));
    assert_eq!(hub.revno("units", "u/0"), None);

    assert_eq!(store.put("units", "u/0", json!({})), 3);
    assert_eq!(hub.revno("units", "u/0"), Some(3));
}

/// Test: every mutation is published in the order it was applied
#[test]
fn test_mutations_are_published_in_order() {
    let (store, hub) = store();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.watch_collection("units", tx);

    store.put("units", "u/0", json!({}));
    store.update("units", "u/0", |_| {}).unwrap();
    store.remove("units", "u/0");

    let received: Vec<Change> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(
        received,
        vec![
            Change::new("units", "u/0", 1),
            Change::new("units", "u/0", 2),
            Change::new("units", "u/0", REVNO_REMOVED),
        ]
    );
}

#[test]
fn test_find_filters() {
    let (store, _hub) = store();
    store.put("units", "wordpress/0", json!({"service": "wordpress"}));
    store.put("units", "wordpress/1", json!({"service": "wordpress"}));
    store.put("units", "mysql/0", json!({"service": "mysql"}));

    let ids = |filter: Filter| -> Vec<String> {
        store
            .find("units", &filter)
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect()
    };

    assert_eq!(ids(Filter::All).len(), 3);
    assert_eq!(ids(Filter::IdPrefix("wordpress/".to_string())), vec!["wordpress/0", "wordpress/1"]);
    assert_eq!(
        ids(Filter::IdIn(vec!["mysql/0".to_string(), "nope/0".to_string()])),
        vec!["mysql/0"]
    );
    assert_eq!(
        ids(Filter::FieldEq {
            field: "service".to_string(),
            value: json!("mysql"),
        }),
        vec!["mysql/0"]
    );
    assert!(store.find("machines", &Filter::All).unwrap().is_empty());
}

#[test]
fn test_decode_reports_malformed_documents() {
    let doc = Document {
        id: "0".to_string(),
        revno: 1,
        body: json!({"life": "undead"}),
    };
    match doc.decode::<LifeDoc>("machines") {
        Err(WatcherError::Malformed { collection, key, .. }) => {
            assert_eq!(collection, "machines");
            assert_eq!(key, "0");
        }
        other => panic!("expected malformed error, got {:?}", other),
    }
}
