//! Gated hand-off of aggregated batches from a watcher task to its consumer.
//!
//! The consumer pulls: each call to [`Changes::next`] hands the task a
//! one-shot reply slot. The task keeps at most one slot in its [`Outbox`] and
//! fills it only when its pending batch is ready, which gives three states:
//!
//! - Idle: nothing ready, nothing handed over.
//! - Pending: a batch is ready but no consumer is waiting; further changes
//!   fold into it.
//! - Delivering: a consumer is waiting and the batch is handed over at once.
//!
//! A slow consumer therefore only ever delays and coalesces batches; it never
//! causes one to be dropped or duplicated.

use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::trace;

use crate::metrics::BATCHES_DELIVERED;

type Reply<T> = oneshot::Sender<T>;

/// Creates the two halves of a watcher's output.
pub(crate) fn channel<T>(kind: &'static str) -> (Outbox<T>, Changes<T>) {
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    (
        Outbox {
            kind,
            requests: requests_rx,
            waiter: None,
            closed: false,
        },
        Changes {
            requests: requests_tx,
            inflight: None,
        },
    )
}

/// Task side of the hand-off
#[derive(Debug)]
pub(crate) struct Outbox<T> {
    kind: &'static str,
    requests: mpsc::UnboundedReceiver<Reply<T>>,
    waiter: Option<Reply<T>>,
    /// The consumer dropped its [`Changes`]
    closed: bool,
}

impl<T> Outbox<T> {
    /// Whether the task should wait for another consumer request.
    pub(crate) fn accepting(&self) -> bool {
        self.waiter.is_none() && !self.closed
    }

    /// Waits for the next consumer request. Cancel safe.
    pub(crate) async fn accept(&mut self) {
        match self.requests.recv().await {
            Some(reply) => self.waiter = Some(reply),
            None => {
                trace!(kind = self.kind, "consumer went away");
                self.closed = true;
            }
        }
    }

    /// Hands `pending` over when it is `ready` and a consumer is waiting,
    /// leaving the default value behind. Returns whether a batch was handed
    /// over.
    pub(crate) fn flush(
        &mut self,
        ready: bool,
        pending: &mut T,
    ) -> bool
    where
        T: Default,
    {
        if !ready {
            return false;
        }
        let Some(reply) = self.waiter.take() else {
            return false;
        };
        match reply.send(std::mem::take(pending)) {
            Ok(()) => {
                BATCHES_DELIVERED.with_label_values(&[self.kind]).inc();
                true
            }
            // The waiting consumer gave up; keep the batch for the next one.
            Err(batch) => {
                *pending = batch;
                false
            }
        }
    }
}

/// Consumer side of the hand-off
///
/// Yields `None` once the watcher task has exited.
#[derive(Debug)]
pub struct Changes<T> {
    requests: mpsc::UnboundedSender<Reply<T>>,
    /// Reply slot already handed to the task. Kept across dropped `next()`
    /// futures so a batch sent into it is never lost.
    inflight: Option<oneshot::Receiver<T>>,
}

impl<T> Changes<T> {
    /// Waits for the next batch.
    pub async fn next(&mut self) -> Option<T> {
        futures::StreamExt::next(self).await
    }
}

impl<T> Stream for Changes<T> {
    type Item = T;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.inflight.is_none() {
            let (tx, rx) = oneshot::channel();
            if this.requests.send(tx).is_err() {
                return Poll::Ready(None);
            }
            this.inflight = Some(rx);
        }
        let Some(rx) = this.inflight.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(result) => {
                this.inflight = None;
                Poll::Ready(result.ok())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
