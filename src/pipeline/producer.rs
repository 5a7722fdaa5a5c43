//! Record production for the handoff channel

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::source::RecordReader;
use crate::types::Record;

/// Open the catalogue at `path` (retrying per `retry`) and feed its records
pub(crate) async fn produce_from_file(
    path: PathBuf,
    retry: RetryConfig,
    tx: mpsc::Sender<Record>,
    cancel: CancellationToken,
) -> Result<()> {
    let reader = with_retry(&retry, &cancel, "open input", || {
        let path = path.clone();
        async move { RecordReader::open(&path) }
    })
    .await?;

    tracing::debug!(path = %path.display(), "Opened record source");
    produce(reader, tx, cancel).await
}

/// Feed records from a blocking iterator until it ends, fails, or the run is cancelled
pub(crate) async fn produce<I>(
    records: I,
    tx: mpsc::Sender<Record>,
    cancel: CancellationToken,
) -> Result<()>
where
    I: Iterator<Item = Result<Record>> + Send + 'static,
{
    // CSV parsing is synchronous; keep it off the async workers
    tokio::task::spawn_blocking(move || feed(records, &tx, &cancel)).await?
}

fn feed<I>(records: I, tx: &mpsc::Sender<Record>, cancel: &CancellationToken) -> Result<()>
where
    I: Iterator<Item = Result<Record>>,
{
    for item in records {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let record = item?;
        if tx.blocking_send(record).is_err() {
            // Every worker has exited
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tracing::warn!("All workers stopped before the record source was exhausted");
            return Ok(());
        }
    }
    Ok(())
}
