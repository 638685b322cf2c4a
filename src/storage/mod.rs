//! Document store abstraction.
//!
//! Watchers only ever read: a full scan when they start and a point read
//! after every change notification.

mod mem_store;

pub use mem_store::*;

#[cfg(test)]
mod mem_store_test;

#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::StorageError;
use crate::WatcherError;
use crate::WatcherResult;

/// A persisted document with its revision counter
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub revno: i64,
    pub body: Value,
}

impl Document {
    /// Decodes the body into a typed document.
    pub fn decode<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> WatcherResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| WatcherError::Malformed {
            collection: collection.to_string(),
            key: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Selection used by collection scans
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    IdPrefix(String),
    IdIn(Vec<String>),
    FieldEq { field: String, value: Value },
}

impl Filter {
    pub fn matches(
        &self,
        doc: &Document,
    ) -> bool {
        match self {
            Filter::All => true,
            Filter::IdPrefix(prefix) => doc.id.starts_with(prefix.as_str()),
            Filter::IdIn(ids) => ids.iter().any(|id| *id == doc.id),
            Filter::FieldEq { field, value } => doc.body.get(field.as_str()) == Some(value),
        }
    }
}

/// Read side of the persistence engine
#[cfg_attr(test, automock)]
pub trait Store: Send + Sync + 'static {
    fn find_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError>;

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>, StorageError>;
}
