//! Error types for textbook-dl
//!
//! A single [`Error`] enum covers every failure the pipeline can produce.
//! Variants fall into three classes:
//! - source-fatal (malformed catalogue rows, unreadable input) which stop record production
//! - operation-transient (network, HTTP, file I/O, relay) which are retried per policy
//! - configuration and control errors (bad config, cancellation, unresolved abort)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for textbook-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for textbook-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// The input catalogue could not be parsed as CSV
    #[error("failed to read row {row}: {source}")]
    Csv {
        /// Zero-based row index (the header is row 0)
        row: usize,
        /// Underlying CSV error
        #[source]
        source: csv::Error,
    },

    /// A catalogue row has the wrong shape
    #[error("unexpected number of columns in row {row}: expected {expected}, got {found}")]
    InvalidRecord {
        /// Zero-based row index (the header is row 0)
        row: usize,
        /// Number of fields every row must have
        expected: usize,
        /// Number of fields actually found
        found: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File I/O error on a specific path
    #[error("I/O error on {path}: {source}")]
    File {
        /// The path being opened, read or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// A URL could not be parsed or rebuilt
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        /// The offending URL text
        url: String,
        /// Underlying parse error
        #[source]
        source: url::ParseError,
    },

    /// No chunk arrived within the configured read timeout
    #[error("timed out after {timeout:?} waiting for data from {url}")]
    Timeout {
        /// The URL being read
        url: String,
        /// The read timeout that elapsed
        timeout: std::time::Duration,
    },

    /// One side of a streaming relay went away before the transfer finished
    #[error("relay closed: {0}")]
    RelayClosed(String),

    /// No download link for the requested format was found and the run is configured to abort
    #[error("no {format} download link found for '{title}' at {url}")]
    Unresolved {
        /// Title of the record
        title: String,
        /// Format name (e.g., "PDF")
        format: String,
        /// Landing page URL that was scanned
        url: String,
    },

    /// Serialization error (config files)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled before the operation finished
    #[error("operation cancelled")]
    Cancelled,

    /// A pipeline can only be run once
    #[error("pipeline has already been started")]
    AlreadyStarted,

    /// A worker or producer task panicked or was aborted
    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Wrap an I/O error with the path it occurred on
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::File {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
