//! Worker loop: take a record, resolve its content URL, transfer it to disk.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::RunCounters;
use crate::config::{Config, UnresolvedPolicy};
use crate::error::{Error, Result};
use crate::resolver::ContentResolver;
use crate::transfer::TransferEngine;
use crate::types::{Event, Record};
use crate::utils::destination_path;

/// State shared by every worker of one run
pub(crate) struct WorkerContext {
    pub(crate) config: Arc<Config>,
    pub(crate) resolver: ContentResolver,
    pub(crate) engine: TransferEngine,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) cancel: CancellationToken,
    pub(crate) counters: Arc<RunCounters>,
}

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) records: Arc<Mutex<mpsc::Receiver<Record>>>,
    pub(crate) ctx: Arc<WorkerContext>,
}

impl Worker {
    /// Process records until the channel closes or the run is cancelled
    ///
    /// Only an unresolved record under [`UnresolvedPolicy::Abort`] ends the loop with an error.
    pub(crate) async fn run(self) -> Result<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => None,
                record = async { self.records.lock().await.recv().await } => record,
            };
            let Some(record) = next else {
                break;
            };

            self.ctx.counters.records.fetch_add(1, Ordering::SeqCst);
            self.ctx.process_record(record).await?;
        }

        tracing::debug!(worker = self.id, "Worker exiting");
        Ok(())
    }
}

impl WorkerContext {
    async fn process_record(&self, record: Record) -> Result<()> {
        let content_url = match self.resolver.resolve(&record, &self.cancel).await {
            Ok(Some(url)) => url,
            Ok(None) => return self.handle_unresolved(&record),
            Err(Error::Cancelled) => return Ok(()),
            Err(e) => {
                tracing::error!(record = %record, error = %e, "Failed to fetch landing page");
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                self.event_tx
                    .send(Event::ResolveFailed {
                        title: record.title.clone(),
                        error: e.to_string(),
                    })
                    .ok();
                return Ok(());
            }
        };

        let format = self.resolver.format();
        let path = destination_path(&self.config.output_dir, &record, format);

        tracing::info!(path = %path.display(), url = %content_url, "Download begins");
        self.event_tx
            .send(Event::DownloadStarted {
                title: record.title.clone(),
                path: path.clone(),
            })
            .ok();

        match self.engine.transfer(&content_url, &path, &self.cancel).await {
            Ok(bytes) => {
                tracing::info!(path = %path.display(), bytes, "Download complete");
                self.counters.downloaded.fetch_add(1, Ordering::SeqCst);
                self.counters.bytes.fetch_add(bytes, Ordering::SeqCst);
                self.event_tx
                    .send(Event::DownloadComplete { path, bytes })
                    .ok();
            }
            Err(Error::Cancelled) => {}
            Err(e) => {
                tracing::error!(
                    record = %record,
                    path = %path.display(),
                    error = %e,
                    "Download failed"
                );
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                self.event_tx
                    .send(Event::DownloadFailed {
                        path,
                        error: e.to_string(),
                    })
                    .ok();
            }
        }
        Ok(())
    }

    fn handle_unresolved(&self, record: &Record) -> Result<()> {
        let format = self.resolver.format();
        self.counters.unresolved.fetch_add(1, Ordering::SeqCst);
        self.event_tx
            .send(Event::Unresolved {
                title: record.title.clone(),
                url: record.landing_page_url.clone(),
                format,
            })
            .ok();

        match self.config.on_unresolved {
            UnresolvedPolicy::Skip => Ok(()),
            UnresolvedPolicy::Abort => {
                self.cancel.cancel();
                Err(Error::Unresolved {
                    title: record.title.clone(),
                    format: format.name().to_string(),
                    url: record.landing_page_url.clone(),
                })
            }
        }
    }
}
