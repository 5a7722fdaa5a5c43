//! Core types for textbook-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// One catalogue row identifying a work to download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Book title
    pub title: String,
    /// Author list as it appears in the catalogue
    pub author: String,
    /// Content identifier (electronic ISBN)
    pub content_id: String,
    /// DOI URL (carried but not used for downloading)
    pub doi_url: String,
    /// Landing page that links to the downloadable content
    pub landing_page_url: String,
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{Title: '{}', Author: '{}', ISBN: {}, URL: {}}}",
            self.title, self.author, self.content_id, self.landing_page_url
        )
    }
}

/// Publication file format to download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Portable Document Format (default)
    #[default]
    Pdf,
    /// EPUB e-book
    Epub,
}

impl Format {
    /// Upper-cased name used in landing page link titles (e.g., "PDF")
    pub fn name(&self) -> &'static str {
        match self {
            Format::Pdf => "PDF",
            Format::Epub => "EPUB",
        }
    }

    /// File extension for downloaded content (e.g., "pdf")
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Epub => "epub",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Format::Pdf),
            "epub" => Ok(Format::Epub),
            _ => Err(Error::config(
                "format",
                format!("format '{}' must be pdf or epub", s),
            )),
        }
    }
}

/// Lifecycle of a single pipeline run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Created but `run` has not been called
    #[default]
    NotStarted,
    /// Producer and workers are active
    Running,
    /// Producer has closed the channel, workers are finishing in-flight records
    Draining,
    /// Producer and all workers have finished
    Done,
}

/// Events emitted by the pipeline
///
/// Consumers subscribe via [`Pipeline::subscribe`](crate::Pipeline::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Transfer of a resolved record is about to start
    DownloadStarted {
        /// Record title
        title: String,
        /// Destination file
        path: PathBuf,
    },

    /// Transfer finished and the file is complete
    DownloadComplete {
        /// Destination file
        path: PathBuf,
        /// Number of bytes written
        bytes: u64,
    },

    /// Transfer failed after all retry attempts
    DownloadFailed {
        /// Destination file (removed after failure)
        path: PathBuf,
        /// Error message
        error: String,
    },

    /// The landing page had no download link for the requested format
    Unresolved {
        /// Record title
        title: String,
        /// Landing page URL
        url: String,
        /// Requested format
        format: Format,
    },

    /// The landing page could not be fetched after all retry attempts
    ResolveFailed {
        /// Record title
        title: String,
        /// Error message
        error: String,
    },
}

/// Counters describing the outcome of a completed run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Records handed to workers
    pub records: u64,
    /// Files written successfully
    pub downloaded: u64,
    /// Records skipped because no download link was found
    pub unresolved: u64,
    /// Records whose landing page fetch or transfer failed terminally
    pub failed: u64,
    /// Total bytes written across all files
    pub bytes: u64,
}
