use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::merge_queued;
use super::Outbox;
use super::Watcher;
use crate::must_err;
use crate::State;
use crate::Subscription;
use crate::WatcherResult;
use crate::KIND_ENTITY;

/// Content-free "something changed" signal for one document
///
/// The first signal is delivered right away, even when a stale handle's
/// document was removed in the meantime; consumers re-read the entity
/// themselves and find out.
pub type EntityWatcher = Watcher<()>;

pub(crate) fn watch_entity(
    st: &State,
    collection: &'static str,
    key: &str,
    known_revno: i64,
) -> EntityWatcher {
    let st = st.clone();
    let key = key.to_string();
    Watcher::spawn(KIND_ENTITY, move |outbox, dying| {
        run_entity(st, collection, key, known_revno, outbox, dying)
    })
}

async fn run_entity(
    st: State,
    collection: &'static str,
    key: String,
    known_revno: i64,
    mut outbox: Outbox<()>,
    dying: CancellationToken,
) -> WatcherResult<()> {
    let feed = st.feed().clone();
    let feed_dead = feed.dead();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = Subscription::document(feed.clone(), collection, &key, known_revno, tx);

    let mut ready = true;
    loop {
        tokio::select! {
            biased;
            _ = dying.cancelled() => return Ok(()),
            _ = feed_dead.cancelled() => return Err(must_err(feed.as_ref())),
            Some(change) = rx.recv() => {
                merge_queued(&mut rx, change, |c| {
                    ready = true;
                    if st.config().trace_merges {
                        trace!(collection, key = %key, revno = c.revno, "entity changed");
                    }
                    Ok(())
                })?
            }
            _ = outbox.accept(), if outbox.accepting() => {}
        }
        if outbox.flush(ready, &mut ()) {
            ready = false;
        }
    }
}
