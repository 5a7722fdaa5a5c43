//! # textbook-dl
//!
//! Concurrent bulk downloader for catalogues of freely available textbooks.
//!
//! A CSV catalogue lists one book per row together with the URL of its landing
//! page. For each book the pipeline fetches the landing page, finds the download
//! link for the requested format and streams the file to disk.
//!
//! ## Design
//!
//! - **Bounded** - a fixed pool of workers; memory per transfer is capped by the relay capacity
//! - **Streaming** - landing pages are scanned line by line, files are never held whole in memory
//! - **Event-driven** - consumers subscribe to [`Event`]s instead of polling
//! - **Retrying** - each network or file operation has its own backoff policy
//!
//! ## Quick Start
//!
//! ```no_run
//! use textbook_dl::{Config, Format, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         input_path: "csv/Free+English+textbooks.csv".into(),
//!         format: Format::Pdf,
//!         ..Default::default()
//!     };
//!
//!     let pipeline = Pipeline::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = pipeline.run().await?;
//!     println!("{} files downloaded", summary.downloaded);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Worker pool coordinating resolution and transfer
pub mod pipeline;
/// Landing page scanning and content URL resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// CSV catalogue parsing
pub mod source;
/// Streaming HTTP-to-file transfers
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, HttpConfig, RetryConfig, RetryPolicies, UnresolvedPolicy};
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use resolver::ContentResolver;
pub use source::RecordReader;
pub use transfer::{TransferEngine, relay};
pub use types::{Event, Format, PipelineState, Record, RunSummary};

/// Run the pipeline against its configured input, cancelling on a termination signal.
///
/// When a signal arrives the run token is cancelled and the in-flight work is
/// allowed to unwind; the result is then [`Error::Cancelled`].
///
/// - **Unix:** listens for SIGTERM and SIGINT; a handler that fails to register is skipped.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use textbook_dl::{Config, Pipeline, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default())?;
///     let summary = run_until_signal(&pipeline).await?;
///     println!("{summary:?}");
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(pipeline: &Pipeline) -> Result<RunSummary> {
    let run = pipeline.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        signal = termination_signal() => {
            tracing::info!(signal, "Termination signal received, cancelling run");
        }
    }

    pipeline.cancel();
    run.await
}

/// Resolve with the name of the first termination signal delivered
///
/// A listener that cannot be registered never fires; if none can be, this
/// never resolves and the run is left to finish on its own.
#[cfg(unix)]
async fn termination_signal() -> &'static str {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    fn listen(kind: SignalKind, name: &str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| {
                tracing::warn!(error = %e, signal = name, "Could not register signal handler")
            })
            .ok()
    }

    async fn next(listener: &mut Option<Signal>) -> Option<()> {
        match listener {
            Some(listener) => listener.recv().await,
            None => std::future::pending().await,
        }
    }

    let mut sigterm = listen(SignalKind::terminate(), "SIGTERM");
    let mut sigint = listen(SignalKind::interrupt(), "SIGINT");

    tokio::select! {
        Some(()) = next(&mut sigterm) => "SIGTERM",
        Some(()) = next(&mut sigint) => "SIGINT",
        else => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}
