//! Utility functions for file naming and path manipulation

use crate::types::{Format, Record};
use std::path::{Path, PathBuf};

/// Replacement for path separator characters in derived file names
const SEPARATOR_REPLACEMENT: &str = "_";

/// Replace every path separator in `name` so it stays a single path segment
///
/// Both `/` and `\` are replaced regardless of platform, since catalogue data
/// written on one system may be downloaded on another.
///
/// # Examples
///
/// ```
/// use textbook_dl::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("A/B Testing"), "A_B Testing");
/// assert_eq!(sanitize_file_name(r"C:\temp"), "C:_temp");
/// ```
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.replace(['/', '\\'], SEPARATOR_REPLACEMENT)
}

/// File name for a record in the given format: `"<title> (<identifier>).<extension>"`
///
/// # Examples
///
/// ```
/// use textbook_dl::types::{Format, Record};
/// use textbook_dl::utils::destination_file_name;
///
/// let record = Record {
///     title: "A/B Testing".to_string(),
///     author: String::new(),
///     content_id: "978-3/0".to_string(),
///     doi_url: String::new(),
///     landing_page_url: String::new(),
/// };
/// assert_eq!(destination_file_name(&record, Format::Pdf), "A_B Testing (978-3_0).pdf");
/// ```
#[must_use]
pub fn destination_file_name(record: &Record, format: Format) -> String {
    sanitize_file_name(&format!(
        "{} ({}).{}",
        record.title,
        record.content_id,
        format.extension()
    ))
}

/// Full destination path for a record under `output_dir`
#[must_use]
pub fn destination_path(output_dir: &Path, record: &Record, format: Format) -> PathBuf {
    output_dir.join(destination_file_name(record, format))
}
