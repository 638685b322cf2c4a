use std::future::Future;

use tokio::time::timeout;
use tracing::warn;

use crate::Error;
use crate::Result;
use crate::Watcher;
use crate::WatcherConfig;
use crate::WatcherResult;

/// Stops `watcher`, waiting at most `config.stop_timeout()` for its terminal
/// result. Watchers never time out on their own; callers that cannot block
/// indefinitely go through here.
pub async fn stop_with_timeout<T>(
    watcher: &Watcher<T>,
    config: &WatcherConfig,
) -> Result<()> {
    watcher.kill();
    await_terminal(watcher.kind(), watcher.wait(), config).await
}

/// Waits at most `config.stop_timeout()` for a watcher exit future.
pub(crate) async fn await_terminal<F>(
    kind: &str,
    exit: F,
    config: &WatcherConfig,
) -> Result<()>
where
    F: Future<Output = WatcherResult<()>>,
{
    let limit = config.stop_timeout();
    match timeout(limit, exit).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => {
            warn!(kind, "watcher did not stop within {:?}", limit);
            Err(Error::StopTimeout(limit))
        }
    }
}
