use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::delivery;
use super::Changes;
use super::Outbox;
use super::Supervisor;
use crate::WatcherResult;

/// A running watcher: one supervised task plus the stream of its batches
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct Watcher<T> {
    supervisor: Supervisor,
    changes: Changes<T>,
}

impl<T: Send + 'static> Watcher<T> {
    /// Starts `body` as the watcher's task.
    pub(crate) fn spawn<F, Fut>(
        kind: &'static str,
        body: F,
    ) -> Self
    where
        F: FnOnce(Outbox<T>, CancellationToken) -> Fut,
        Fut: Future<Output = WatcherResult<()>> + Send + 'static,
    {
        let (outbox, changes) = delivery::channel(kind);
        let supervisor = Supervisor::start(kind, move |dying| body(outbox, dying));
        Self { supervisor, changes }
    }
}

impl<T> Watcher<T> {
    /// Stream of batches. The first batch is the initial snapshot.
    pub fn changes(&mut self) -> &mut Changes<T> {
        &mut self.changes
    }

    /// Waits for the next batch; `None` once the watcher has exited.
    pub async fn next(&mut self) -> Option<T> {
        self.changes.next().await
    }

    /// Stops the watcher and returns its terminal result.
    pub async fn stop(&self) -> WatcherResult<()> {
        self.supervisor.stop().await
    }

    /// Requests the watcher to stop without waiting.
    pub fn kill(&self) {
        self.supervisor.kill()
    }

    /// Waits for the watcher to exit on its own.
    pub async fn wait(&self) -> WatcherResult<()> {
        self.supervisor.wait().await
    }

    /// Terminal result, or `Err(WatcherError::StillAlive)` while running.
    pub fn err(&self) -> WatcherResult<()> {
        self.supervisor.err()
    }

    pub fn id(&self) -> &str {
        self.supervisor.id()
    }

    pub fn kind(&self) -> &'static str {
        self.supervisor.kind()
    }
}
