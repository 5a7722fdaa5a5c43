//! Retry logic with exponential backoff
//!
//! Every network or file operation in the pipeline runs through [`with_retry`].
//! Transient failures are retried with exponentially growing delays (optionally
//! jittered) until the policy's attempt budget runs out, at which point the last
//! error is returned to the caller. Cancelling the run token interrupts both the
//! operation in flight and any pending backoff sleep.
//!
//! # Example
//!
//! ```no_run
//! use textbook_dl::config::RetryConfig;
//! use textbook_dl::error::Error;
//! use textbook_dl::retry::with_retry;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let body = with_retry(&config, &cancel, "fetch example", || async {
//!     let body = reqwest::get("https://example.com").await?.text().await?;
//!     Ok::<_, Error>(body)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (connection reset, server busy, stalled body) should return `true`.
/// Permanent failures (404, malformed input, cancellation) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Builder errors mean the request itself is malformed
            Error::Network(e) => !e.is_builder(),
            Error::Io(_) | Error::File { .. } => true,
            Error::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Error::Timeout { .. } => true,
            Error::RelayClosed(_) => true,
            Error::Config { .. } => false,
            Error::Csv { .. } | Error::InvalidRecord { .. } => false,
            Error::InvalidUrl { .. } => false,
            Error::Unresolved { .. } => false,
            Error::Serialization(_) => false,
            Error::Cancelled | Error::AlreadyStarted => false,
            Error::Task(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry policy for this call site
/// * `cancel` - Run-wide cancellation token
/// * `operation_name` - Short label used in diagnostics (e.g., "landing page")
/// * `operation` - Closure producing a fresh attempt each time it is called
///
/// # Returns
///
/// The first successful result, the first non-retryable error, the last error once
/// `max_attempts` retries are exhausted, or [`Error::Cancelled`].
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = operation() => result,
        };

        match outcome {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                let wait = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    operation = operation_name,
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        operation = operation_name,
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else if !matches!(e, Error::Cancelled) {
                    tracing::error!(
                        operation = operation_name,
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay lands uniformly between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
