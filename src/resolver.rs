//! Content URL resolution from landing pages
//!
//! A landing page links to the actual content file with an anchor of the form
//!
//! ```text
//! <a href="/content/pdf/10.1007/978-3-319-00026-8.pdf" title="Download this book in PDF format">
//! ```
//!
//! [`ContentResolver`] streams the page, scans it line by line for that anchor
//! and turns the captured path into an absolute URL on the landing page's host.
//! Matching is strictly per line: an anchor split across lines never matches.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use regex::Regex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{Format, Record};

/// Build the link pattern for a format; capture group 1 is the content path
// Only the escaped format name varies, so the pattern is always valid
#[allow(clippy::expect_used)]
pub fn link_pattern(format: Format) -> Regex {
    let pattern = format!(
        r#"href="([^"]+)" title="Download this book in {} format""#,
        regex::escape(format.name())
    );
    Regex::new(&pattern).expect("link pattern is a valid regex")
}

/// Resolves records to absolute content URLs for one format
#[derive(Clone, Debug)]
pub struct ContentResolver {
    client: reqwest::Client,
    format: Format,
    pattern: Regex,
    retry: RetryConfig,
    read_timeout: Duration,
}

impl ContentResolver {
    /// Create a resolver for `format`
    pub fn new(
        client: reqwest::Client,
        format: Format,
        retry: RetryConfig,
        read_timeout: Duration,
    ) -> Self {
        Self {
            client,
            format,
            pattern: link_pattern(format),
            retry,
            read_timeout,
        }
    }

    /// Format this resolver looks for
    pub fn format(&self) -> Format {
        self.format
    }

    /// Resolve a record's content URL
    ///
    /// Returns `Ok(None)` when the landing page has no link for this format.
    /// Fetch and read failures restart the whole page according to the retry policy.
    pub async fn resolve(&self, record: &Record, cancel: &CancellationToken) -> Result<Option<Url>> {
        let landing = Url::parse(&record.landing_page_url).map_err(|source| Error::InvalidUrl {
            url: record.landing_page_url.clone(),
            source,
        })?;

        let resolved = with_retry(&self.retry, cancel, "landing page", || {
            self.scan_landing_page(&landing)
        })
        .await?;

        if resolved.is_none() {
            tracing::warn!(
                record = %record,
                format = self.format.name(),
                "Can't find content URL for record"
            );
        }
        Ok(resolved)
    }

    async fn scan_landing_page(&self, landing: &Url) -> Result<Option<Url>> {
        let response = self.client.get(landing.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: landing.to_string(),
            });
        }

        let body = response.bytes_stream();
        let path = find_link(body, &self.pattern, self.read_timeout, landing.as_str()).await?;
        Ok(path.map(|path| content_url(landing, &path)))
    }
}

/// Scan a byte stream line by line and return the first captured link path
///
/// Only bytes terminated by `\n` form a line; a trailing fragment is never tested.
pub async fn find_link<S, E>(
    body: S,
    pattern: &Regex,
    read_timeout: Duration,
    url: &str,
) -> Result<Option<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Error>,
{
    futures::pin_mut!(body);
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let next = tokio::time::timeout(read_timeout, body.next())
            .await
            .map_err(|_| Error::Timeout {
                url: url.to_string(),
                timeout: read_timeout,
            })?;
        let Some(chunk) = next else {
            return Ok(None);
        };
        pending.extend_from_slice(&chunk.map_err(Into::into)?);

        let mut consumed = 0;
        while let Some(offset) = pending[consumed..].iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&pending[consumed..consumed + offset + 1]);
            if let Some(captures) = pattern.captures(&line) {
                return Ok(Some(captures[1].to_string()));
            }
            consumed += offset + 1;
        }
        pending.drain(..consumed);
    }
}

/// Replace the landing URL's path with `path` and drop its query
pub fn content_url(landing: &Url, path: &str) -> Url {
    let mut url = landing.clone();
    url.set_path(path);
    url.set_query(None);
    url
}
