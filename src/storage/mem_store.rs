use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

use super::Document;
use super::Filter;
use super::Store;
use crate::Change;
use crate::ChangeHub;
use crate::StorageError;
use crate::REVNO_REMOVED;

#[derive(Debug, Default)]
struct Collections {
    docs: HashMap<String, BTreeMap<String, Document>>,
    /// Last revision handed out per document, kept across removals so a
    /// re-created document never reuses a revision.
    last_revnos: HashMap<(String, String), i64>,
}

impl Collections {
    fn next_revno(
        &mut self,
        collection: &str,
        id: &str,
    ) -> i64 {
        let revno = self
            .last_revnos
            .entry((collection.to_string(), id.to_string()))
            .or_insert(0);
        *revno += 1;
        *revno
    }
}

/// In-memory document store publishing every mutation to a [`ChangeHub`]
///
/// Mutations publish while the write lock is held, so the feed observes
/// changes in exactly the order they were applied.
#[derive(Debug)]
pub struct MemStore {
    inner: RwLock<Collections>,
    hub: Arc<ChangeHub>,
}

impl MemStore {
    pub fn new(hub: Arc<ChangeHub>) -> Self {
        Self {
            inner: RwLock::new(Collections::default()),
            hub,
        }
    }

    pub fn hub(&self) -> Arc<ChangeHub> {
        self.hub.clone()
    }

    /// Creates a document. Fails if the id is taken.
    pub fn insert(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<i64, StorageError> {
        let mut inner = self.inner.write();
        if inner
            .docs
            .get(collection)
            .is_some_and(|c| c.contains_key(id))
        {
            return Err(StorageError::DocumentExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        let revno = inner.next_revno(collection, id);
        self.store_doc(&mut inner, collection, id, revno, body);
        Ok(revno)
    }

    /// Creates or replaces a document.
    pub fn put(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> i64 {
        let mut inner = self.inner.write();
        let revno = inner.next_revno(collection, id);
        self.store_doc(&mut inner, collection, id, revno, body);
        revno
    }

    /// Modifies an existing document in place.
    pub fn update<F>(
        &self,
        collection: &str,
        id: &str,
        f: F,
    ) -> Result<i64, StorageError>
    where
        F: FnOnce(&mut Value),
    {
        let mut inner = self.inner.write();
        let mut body = inner
            .docs
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|d| d.body.clone())
            .ok_or_else(|| StorageError::DocumentMissing {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        f(&mut body);
        let revno = inner.next_revno(collection, id);
        self.store_doc(&mut inner, collection, id, revno, body);
        Ok(revno)
    }

    /// Removes a document. Returns whether it existed.
    pub fn remove(
        &self,
        collection: &str,
        id: &str,
    ) -> bool {
        let mut inner = self.inner.write();
        let removed = inner
            .docs
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some();
        if removed {
            trace!(collection, id, "document removed");
            self.hub.publish(Change::new(collection, id, REVNO_REMOVED));
        }
        removed
    }

    fn store_doc(
        &self,
        inner: &mut Collections,
        collection: &str,
        id: &str,
        revno: i64,
        body: Value,
    ) {
        inner.docs.entry(collection.to_string()).or_default().insert(
            id.to_string(),
            Document {
                id: id.to_string(),
                revno,
                body,
            },
        );
        trace!(collection, id, revno, "document stored");
        self.hub.publish(Change::new(collection, id, revno));
    }
}

impl Store for MemStore {
    fn find_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        let inner = self.inner.read();
        Ok(inner.docs.get(collection).and_then(|c| c.get(id)).cloned())
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .docs
            .get(collection)
            .map(|c| c.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }
}
