//! Streaming transfer of content files to disk
//!
//! A transfer attempt runs two activities concurrently, joined by a bounded
//! channel of byte chunks (the relay):
//! - fetch: request the content URL and push each body chunk into the relay
//! - persist: create/truncate the destination file and write every chunk it receives
//!
//! At most `relay_capacity` chunks sit in the relay at once, so memory use does not
//! grow with the size of the file. The attempt finishes when both sides finish, and
//! the first error from either side fails it. Retries restart from byte zero.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;

/// Streams content URLs into files
#[derive(Clone, Debug)]
pub struct TransferEngine {
    client: reqwest::Client,
    retry: RetryConfig,
    relay_capacity: usize,
    read_timeout: Duration,
}

impl TransferEngine {
    /// Create a transfer engine
    ///
    /// `relay_capacity` is the number of chunks buffered between fetch and persist;
    /// values below 1 are raised to 1.
    pub fn new(
        client: reqwest::Client,
        retry: RetryConfig,
        relay_capacity: usize,
        read_timeout: Duration,
    ) -> Self {
        Self {
            client,
            retry,
            relay_capacity: relay_capacity.max(1),
            read_timeout,
        }
    }

    /// Download `url` into `destination`, returning the number of bytes written
    ///
    /// On terminal failure (or cancellation) the partially written file is removed.
    pub async fn transfer(
        &self,
        url: &Url,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let result = with_retry(&self.retry, cancel, "transfer", || {
            self.transfer_once(url, destination)
        })
        .await;

        if result.is_err() {
            match tokio::fs::remove_file(destination).await {
                Ok(()) => {
                    tracing::debug!(path = %destination.display(), "Removed partial download")
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %destination.display(),
                    error = %e,
                    "Failed to remove partial download"
                ),
            }
        }
        result
    }

    async fn transfer_once(&self, url: &Url, destination: &Path) -> Result<u64> {
        let (tx, rx) = mpsc::channel::<Bytes>(self.relay_capacity);

        let fetch = async move {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            pump(
                response.bytes_stream(),
                tx,
                Some(self.read_timeout),
                url.as_str(),
            )
            .await
        };

        let persist = async move {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(destination)
                .await
                .map_err(|e| Error::file(destination, e))?;
            drain(rx, file).await
        };

        let (_, written) = tokio::try_join!(fetch, persist)?;
        Ok(written)
    }
}

/// Copy `body` through a relay of `capacity` chunks into `writer`
///
/// Both sides run concurrently; the first error from either side is returned.
pub async fn relay<S, E, W>(body: S, writer: W, capacity: usize) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Error>,
    W: AsyncWrite + Unpin,
{
    let (tx, rx) = mpsc::channel::<Bytes>(capacity.max(1));
    let (_, written) = tokio::try_join!(pump(body, tx, None, "relay"), drain(rx, writer))?;
    Ok(written)
}

/// Fetch side: forward every chunk of `body` into the relay
///
/// Returns the number of bytes sent. Dropping `tx` on return closes the relay.
async fn pump<S, E>(
    body: S,
    tx: mpsc::Sender<Bytes>,
    read_timeout: Option<Duration>,
    url: &str,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<Error>,
{
    futures::pin_mut!(body);
    let mut sent = 0u64;

    loop {
        let next = match read_timeout {
            Some(limit) => tokio::time::timeout(limit, body.next())
                .await
                .map_err(|_| Error::Timeout {
                    url: url.to_string(),
                    timeout: limit,
                })?,
            None => body.next().await,
        };
        let Some(chunk) = next else {
            return Ok(sent);
        };
        let chunk = chunk.map_err(Into::into)?;
        let len = chunk.len() as u64;
        tx.send(chunk)
            .await
            .map_err(|_| Error::RelayClosed("persist side stopped receiving".to_string()))?;
        sent += len;
    }
}

/// Persist side: write every chunk from the relay until it closes
async fn drain<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = rx.recv().await {
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}
