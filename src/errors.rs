//! Change-Notification Error Hierarchy
//!
//! Defines the error types raised by watchers, by the change feed they follow
//! and by the document store they re-read after every notification.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Result of a watcher operation. The error side is cheap to clone so that a
/// terminal error can be handed to every caller of `stop()`.
pub type WatcherResult<T> = std::result::Result<T, WatcherError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure reported by a watcher or one of its collaborators
    #[error(transparent)]
    Watcher(#[from] WatcherError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Watcher did not report its terminal state in time
    #[error("watcher did not stop within {0:?}")]
    StopTimeout(Duration),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatcherError {
    /// Sentinel returned by `err()` while the watcher task is still running
    #[error("watcher is still alive")]
    StillAlive,

    /// The change feed died; propagated verbatim
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// The document store failed a point read or a scan
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A document the watcher relies on does not exist
    #[error("{collection} document {key:?} not found")]
    NotFound { collection: String, key: String },

    /// A persisted document could not be decoded
    #[error("{collection} document {key:?} is malformed: {reason}")]
    Malformed {
        collection: String,
        key: String,
        reason: String,
    },

    /// Environment settings do not form a valid configuration
    #[error("invalid environment configuration: {0}")]
    InvalidEnvironConfig(String),

    /// An owned upstream watcher finished without reporting an error
    #[error("{0} watcher stopped unexpectedly")]
    UpstreamStopped(&'static str),

    /// The watcher task panicked
    #[error("watcher task panicked: {0}")]
    Panicked(String),

    /// The watcher task was dropped by the runtime before it could report
    #[error("watcher task aborted")]
    Aborted,
}

impl WatcherError {
    pub fn not_found(
        collection: &str,
        key: &str,
    ) -> Self {
        WatcherError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WatcherError::NotFound { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// Feed was shut down on request
    #[error("change feed stopped")]
    Stopped,

    /// Feed died because of an underlying failure
    #[error("change feed failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Storage backend failures
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Insert of a document whose id is already taken
    #[error("{collection} document {id:?} already exists")]
    DocumentExists { collection: String, id: String },

    /// Update of a document that does not exist
    #[error("{collection} document {id:?} does not exist")]
    DocumentMissing { collection: String, id: String },
}
