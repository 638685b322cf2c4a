//! Lifecycle of a single watcher task.
//!
//! A [`Supervisor`] launches exactly one task and keeps its terminal result.
//! Stopping is cooperative: the task is handed a cancellation token it must
//! observe at every suspension point, and it reports `Ok(())` when it exits
//! because of that token.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use nanoid::nanoid;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info_span;
use tracing::warn;
use tracing::Instrument;

use crate::metrics::ACTIVE_WATCHERS;
use crate::metrics::WATCHER_FAILURES;
use crate::WatcherError;
use crate::WatcherResult;

type Outcome = Option<WatcherResult<()>>;

#[derive(Debug)]
pub struct Supervisor {
    id: String,
    kind: &'static str,
    dying: CancellationToken,
    outcome: watch::Receiver<Outcome>,
}

impl Supervisor {
    /// Spawns `work` on the current tokio runtime.
    ///
    /// `work` receives the dying token. Its result becomes the terminal
    /// result returned by [`Supervisor::stop`] and [`Supervisor::err`].
    pub fn start<F, Fut>(
        kind: &'static str,
        work: F,
    ) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = WatcherResult<()>> + Send + 'static,
    {
        let id = nanoid!(10);
        let dying = CancellationToken::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let work = work(dying.clone());

        let span = info_span!("watcher", kind, id = %id);
        tokio::spawn(
            async move {
                ACTIVE_WATCHERS.with_label_values(&[kind]).inc();
                debug!("watcher started");

                let result = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(WatcherError::Panicked(panic_message(panic))),
                };

                ACTIVE_WATCHERS.with_label_values(&[kind]).dec();
                match &result {
                    Ok(()) => debug!("watcher stopped"),
                    Err(e) => {
                        WATCHER_FAILURES.with_label_values(&[kind]).inc();
                        warn!("watcher failed: {}", e);
                    }
                }
                outcome_tx.send_replace(Some(result));
            }
            .instrument(span),
        );

        Self {
            id,
            kind,
            dying,
            outcome: outcome_rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Requests cancellation without waiting for the task to exit.
    pub fn kill(&self) {
        self.dying.cancel();
    }

    /// Waits for the task to exit and returns its terminal result.
    pub async fn wait(&self) -> WatcherResult<()> {
        let mut outcome = self.outcome.clone();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(done) => (*done).clone(),
            // The sender only disappears without a value when the runtime
            // dropped the task.
            Err(_) => None,
        };
        result.unwrap_or(Err(WatcherError::Aborted))
    }

    /// Requests cancellation and waits for the terminal result.
    ///
    /// Safe to call any number of times; every call yields the same result.
    pub async fn stop(&self) -> WatcherResult<()> {
        self.kill();
        self.wait().await
    }

    /// Terminal result without blocking, or `Err(StillAlive)` while running.
    pub fn err(&self) -> WatcherResult<()> {
        (*self.outcome.borrow()).clone().unwrap_or(Err(WatcherError::StillAlive))
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.dying.cancel();
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
