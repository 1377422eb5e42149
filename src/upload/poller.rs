use std::time::Duration;

use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::debug;

use super::services::{check_file_exists, FileStatus};
use crate::storage::StorageClient;

/// Re-check `key` every `every` until it exists or `max_wait` elapses.
///
/// Returns the last observed status. Dropping the future stops polling.
pub async fn wait_for_file(
    storage: &dyn StorageClient,
    key: &str,
    every: Duration,
    max_wait: Duration,
) -> anyhow::Result<FileStatus> {
    let mut last = FileStatus::missing();
    let mut ticker = interval(every.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let poll = async {
        let mut attempt = 0u32;
        loop {
            ticker.tick().await;
            attempt += 1;
            let status = check_file_exists(storage, key).await?;
            debug!(%key, attempt, exists = status.exists, "file status polled");
            if status.exists {
                return Ok::<_, anyhow::Error>(status);
            }
            last = status;
        }
    };

    let outcome = timeout(max_wait, poll).await;
    match outcome {
        Ok(res) => res,
        Err(_) => Ok(last),
    }
}
