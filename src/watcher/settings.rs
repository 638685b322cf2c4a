//! Single-document settings watchers.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::merge_queued;
use super::Outbox;
use super::Watcher;
use crate::must_err;
use crate::EnvironConfig;
use crate::State;
use crate::Subscription;
use crate::WatcherError;
use crate::WatcherResult;
use crate::ENVIRON_SETTINGS_KEY;
use crate::KIND_ENVIRON_CONFIG;
use crate::KIND_SETTINGS;
use crate::REVNO_REMOVED;
use crate::SETTINGS_C;

/// Content of a settings document at one revision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub key: String,
    pub revno: i64,
    pub values: BTreeMap<String, Value>,
}

impl Settings {
    pub fn get(
        &self,
        name: &str,
    ) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Reads a settings document that must exist and hold a JSON object.
pub(crate) fn read_settings(
    st: &State,
    key: &str,
) -> WatcherResult<Settings> {
    let doc = st
        .find_doc(SETTINGS_C, key)?
        .ok_or_else(|| WatcherError::not_found(SETTINGS_C, key))?;
    match doc.body {
        Value::Object(map) => Ok(Settings {
            key: key.to_string(),
            revno: doc.revno,
            values: map.into_iter().collect(),
        }),
        other => Err(WatcherError::Malformed {
            collection: SETTINGS_C.to_string(),
            key: key.to_string(),
            reason: format!("expected an object, got {other}"),
        }),
    }
}

/// Delivers the latest content of one settings document
///
/// Nothing is delivered while the document does not exist.
pub type SettingsWatcher = Watcher<Settings>;

pub(crate) fn watch_settings(
    st: &State,
    key: &str,
) -> SettingsWatcher {
    let st = st.clone();
    let key = key.to_string();
    Watcher::spawn(KIND_SETTINGS, move |outbox, dying| run_settings(st, key, outbox, dying))
}

async fn run_settings(
    st: State,
    key: String,
    mut outbox: Outbox<Settings>,
    dying: CancellationToken,
) -> WatcherResult<()> {
    let (mut pending, mut ready) = match read_settings(&st, &key) {
        Ok(settings) => (settings, true),
        Err(e) if e.is_not_found() => {
            debug!(key = %key, "settings do not exist yet");
            (Settings::default(), false)
        }
        Err(e) => return Err(e),
    };
    let known_revno = if ready { pending.revno } else { REVNO_REMOVED };

    let feed = st.feed().clone();
    let feed_dead = feed.dead();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = Subscription::document(feed.clone(), SETTINGS_C, &key, known_revno, tx);

    loop {
        tokio::select! {
            biased;
            _ = dying.cancelled() => return Ok(()),
            _ = feed_dead.cancelled() => return Err(must_err(feed.as_ref())),
            Some(change) = rx.recv() => {
                merge_queued(&mut rx, change, |c| {
                    if c.is_removal() {
                        ready = false;
                    } else {
                        pending = read_settings(&st, &key)?;
                        ready = true;
                    }
                    if st.config().trace_merges {
                        trace!(key = %key, revno = c.revno, ready, "settings change merged");
                    }
                    Ok(())
                })?
            }
            _ = outbox.accept(), if outbox.accepting() => {}
        }
        if outbox.flush(ready, &mut pending) {
            ready = false;
        }
    }
}

/// Delivers the parsed environment configuration
pub type EnvironConfigWatcher = Watcher<EnvironConfig>;

pub(crate) fn watch_environ_config(st: &State) -> EnvironConfigWatcher {
    let st = st.clone();
    Watcher::spawn(KIND_ENVIRON_CONFIG, move |outbox, dying| run_environ_config(st, outbox, dying))
}

async fn run_environ_config(
    st: State,
    outbox: Outbox<EnvironConfig>,
    dying: CancellationToken,
) -> WatcherResult<()> {
    let mut settings = watch_settings(&st, ENVIRON_SETTINGS_KEY);
    let result = follow_environ_settings(&st, &mut settings, outbox, dying).await;
    let stopped = settings.stop().await;
    result.and(stopped)
}

async fn follow_environ_settings(
    st: &State,
    settings: &mut SettingsWatcher,
    mut outbox: Outbox<EnvironConfig>,
    dying: CancellationToken,
) -> WatcherResult<()> {
    let feed = st.feed().clone();
    let feed_dead = feed.dead();
    let mut pending = EnvironConfig::default();
    let mut ready = false;

    loop {
        let mut upstream_closed = false;
        tokio::select! {
            biased;
            _ = dying.cancelled() => return Ok(()),
            _ = feed_dead.cancelled() => return Err(must_err(feed.as_ref())),
            next = settings.next() => match next {
                Some(values) => {
                    pending = EnvironConfig::from_settings(&values)?;
                    ready = true;
                }
                None => upstream_closed = true,
            },
            _ = outbox.accept(), if outbox.accepting() => {}
        }
        if upstream_closed {
            return Err(settings
                .wait()
                .await
                .err()
                .unwrap_or(WatcherError::UpstreamStopped(KIND_SETTINGS)));
        }
        if outbox.flush(ready, &mut pending) {
            ready = false;
        }
    }
}
