//! Worker pool coordinator split into focused submodules.
//!
//! - [`producer`] - Feeds records from the source into the handoff channel
//! - [`worker`] - Resolves and transfers one record at a time
//!
//! A run moves through [`PipelineState::NotStarted`] -> `Running` -> `Draining` ->
//! `Done`. One producer pushes records into a capacity-1 channel shared by a fixed
//! set of workers. The producer closing the channel is the only termination signal
//! workers need; cancelling the run token stops everything early.

mod producer;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::resolver::ContentResolver;
use crate::transfer::TransferEngine;
use crate::types::{Event, PipelineState, Record, RunSummary};

use worker::{Worker, WorkerContext};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Records waiting between the producer and the workers
///
/// tokio channels cannot be zero-capacity; one slot keeps the producer at most
/// one record ahead of the next free worker.
const HANDOFF_CAPACITY: usize = 1;

/// Shared success/failure counters for a run
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    pub(crate) records: AtomicU64,
    pub(crate) downloaded: AtomicU64,
    pub(crate) unresolved: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) bytes: AtomicU64,
}

impl RunCounters {
    pub(crate) fn snapshot(&self) -> RunSummary {
        RunSummary {
            records: self.records.load(Ordering::SeqCst),
            downloaded: self.downloaded.load(Ordering::SeqCst),
            unresolved: self.unresolved.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            bytes: self.bytes.load(Ordering::SeqCst),
        }
    }
}

/// Concurrent download pipeline (cloneable - all fields are Arc-wrapped or cheap handles)
///
/// # Example
///
/// ```no_run
/// use textbook_dl::{Config, Format, Pipeline};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config {
///         format: Format::Epub,
///         workers: 8,
///         ..Default::default()
///     };
///     let pipeline = Pipeline::new(config)?;
///
///     let mut events = pipeline.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     let summary = pipeline.run().await?;
///     println!("downloaded {} files", summary.downloaded);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    resolver: ContentResolver,
    engine: TransferEngine,
    event_tx: broadcast::Sender<Event>,
    state_tx: Arc<watch::Sender<PipelineState>>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = config.http.build_client()?;

        let resolver = ContentResolver::new(
            client.clone(),
            config.format,
            config.retry.landing_page.clone(),
            config.http.read_timeout,
        );
        let engine = TransferEngine::new(
            client,
            config.retry.transfer.clone(),
            config.relay_capacity,
            config.http.read_timeout,
        );

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _state_rx) = watch::channel(PipelineState::NotStarted);

        Ok(Self {
            config: Arc::new(config),
            resolver,
            engine,
            event_tx,
            state_tx: Arc::new(state_tx),
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to pipeline events
    ///
    /// Subscribe before calling [`run`](Self::run) to see every event.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    /// Token that aborts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort the run; in-flight operations stop at their next suspension point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Configuration this pipeline was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run against the configured input file
    pub async fn run(&self) -> Result<RunSummary> {
        let path = self.config.input_path.clone();
        self.run_file(path).await
    }

    /// Run against a CSV catalogue at `path`
    ///
    /// Opening the file is retried with the `open_input` policy. A malformed row stops
    /// record production; records already handed to workers still finish, then the
    /// row error is returned.
    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<RunSummary> {
        let path = path.as_ref().to_path_buf();
        let retry = self.config.retry.open_input.clone();
        let cancel = self.cancel.clone();
        self.execute(move |tx| {
            tokio::spawn(producer::produce_from_file(path, retry, tx, cancel))
        })
        .await
    }

    /// Run against any record producer
    ///
    /// The first `Err` item is treated like a malformed catalogue row.
    pub async fn run_records<I>(&self, records: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<Record>>,
        I::IntoIter: Send + 'static,
    {
        let records = records.into_iter();
        let cancel = self.cancel.clone();
        self.execute(move |tx| tokio::spawn(producer::produce(records, tx, cancel)))
            .await
    }

    async fn execute<F>(&self, start_producer: F) -> Result<RunSummary>
    where
        F: FnOnce(mpsc::Sender<Record>) -> JoinHandle<Result<()>>,
    {
        let started = self.state_tx.send_if_modified(|state| {
            if *state == PipelineState::NotStarted {
                *state = PipelineState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(Error::AlreadyStarted);
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.config.output_dir).await {
            self.state_tx.send_replace(PipelineState::Done);
            return Err(Error::file(&self.config.output_dir, e));
        }

        tracing::info!(
            workers = self.config.workers,
            format = self.config.format.name(),
            output_dir = %self.config.output_dir.display(),
            "Pipeline started"
        );

        let (tx, rx) = mpsc::channel::<Record>(HANDOFF_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(RunCounters::default());
        let ctx = Arc::new(WorkerContext {
            config: Arc::clone(&self.config),
            resolver: self.resolver.clone(),
            engine: self.engine.clone(),
            event_tx: self.event_tx.clone(),
            cancel: self.cancel.clone(),
            counters: Arc::clone(&counters),
        });

        let producer = start_producer(tx);

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                records: Arc::clone(&rx),
                ctx: Arc::clone(&ctx),
            };
            workers.spawn(worker.run());
        }
        drop(rx);

        let source_result = match producer.await {
            Ok(result) => result,
            Err(e) => Err(Error::from(e)),
        };
        self.state_tx.send_replace(PipelineState::Draining);
        if let Err(e) = &source_result
            && !matches!(e, Error::Cancelled)
        {
            tracing::error!(error = %e, "Record source failed, finishing queued records");
        }

        let mut worker_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(Error::from(e)),
            };
            if let Err(e) = outcome {
                worker_error.get_or_insert(e);
            }
        }
        self.state_tx.send_replace(PipelineState::Done);

        let summary = counters.snapshot();
        tracing::info!(
            records = summary.records,
            downloaded = summary.downloaded,
            unresolved = summary.unresolved,
            failed = summary.failed,
            bytes = summary.bytes,
            "Pipeline finished"
        );

        match (source_result, worker_error) {
            (Err(e), _) if !matches!(e, Error::Cancelled) => Err(e),
            (_, Some(e)) => Err(e),
            (Err(e), None) => Err(e),
            (Ok(()), None) if self.cancel.is_cancelled() => Err(Error::Cancelled),
            (Ok(()), None) => Ok(summary),
        }
    }
}
