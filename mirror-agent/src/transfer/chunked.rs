//! Range-based content download.
//!
//! A file is fetched as a sequence of `bytes=start-end` requests no larger
//! than the chunk size, each body appended to the output in order. A body
//! shorter than the chunk ends the transfer. When the service reported a
//! size the loop also stops once that many bytes arrived, and falling short
//! of it is an error. The downloader never stamps timestamps: a file that
//! fails here stays unstamped and is fetched again by the next session.

use crate::utils::errors::{MirrorError, Result};
use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a completed download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub bytes_written: u64,
    pub requests: u64,
}

/// Number of range requests a complete transfer of `size` bytes takes.
pub fn expected_requests(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size)
}

pub struct ChunkedDownloader {
    client: reqwest::Client,
    chunk_size: u64,
    request_timeout: Duration,
}

impl ChunkedDownloader {
    pub fn new(client: reqwest::Client, chunk_size: u64, request_timeout: Duration) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
            request_timeout,
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Download `url` into `dest`, truncating whatever was there.
    ///
    /// With `expected_size` unknown at least one request is always sent.
    /// On error the partial file is kept as written so far.
    pub async fn download(
        &self,
        url: &str,
        expected_size: Option<u64>,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        let mut file = File::create(dest).await?;
        let result = self.fetch_into(&mut file, url, expected_size, cancel).await;
        file.flush().await?;

        let report = result?;
        file.sync_all().await?;

        match expected_size {
            Some(size) if report.bytes_written < size => {
                return Err(MirrorError::ChunkTransfer(format!(
                    "short transfer: {} of {} bytes",
                    report.bytes_written, size
                )));
            }
            Some(size) if report.bytes_written > size => warn!(
                "Received {} bytes for {}, expected {}",
                report.bytes_written,
                dest.display(),
                size
            ),
            Some(_) => {}
            None => debug!(
                "Received {} bytes for {} (size not reported)",
                report.bytes_written,
                dest.display()
            ),
        }

        Ok(report)
    }

    async fn fetch_into(
        &self,
        file: &mut File,
        url: &str,
        expected_size: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        let mut offset = 0u64;
        let mut report = DownloadReport {
            bytes_written: 0,
            requests: 0,
        };

        while expected_size.map_or(true, |size| report.bytes_written < size) {
            if cancel.is_cancelled() {
                return Err(MirrorError::Cancelled);
            }

            let end = offset + self.chunk_size - 1;
            let request = self
                .client
                .get(url)
                .header(RANGE, format!("bytes={}-{}", offset, end))
                .timeout(self.request_timeout)
                .send();

            let response = tokio::select! {
                result = request => result.map_err(|e| {
                    MirrorError::ChunkTransfer(format!("range {}-{}: {}", offset, end, e))
                })?,
                _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
            };
            report.requests += 1;

            let status = response.status();
            // Unsized content that is an exact multiple of the chunk ends here
            if status == StatusCode::RANGE_NOT_SATISFIABLE && expected_size.is_none() {
                debug!("Range {}-{} past the end of content", offset, end);
                break;
            }
            if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
                return Err(MirrorError::ChunkTransfer(format!(
                    "range {}-{} returned {}",
                    offset, end, status
                )));
            }
            if status == StatusCode::OK && offset > 0 {
                return Err(MirrorError::ChunkTransfer(format!(
                    "server ignored range request at offset {}",
                    offset
                )));
            }

            let mut body = Box::pin(response.bytes_stream());
            let mut received = 0u64;
            loop {
                let frame = tokio::select! {
                    frame = body.next() => frame,
                    _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
                };
                match frame {
                    Some(Ok(bytes)) => {
                        file.write_all(&bytes).await?;
                        received += bytes.len() as u64;
                    }
                    Some(Err(e)) => {
                        return Err(MirrorError::ChunkTransfer(format!(
                            "body of range {}-{}: {}",
                            offset, end, e
                        )))
                    }
                    None => break,
                }
            }

            report.bytes_written += received;
            debug!("Range {}-{}: {} bytes", offset, end, received);

            offset += self.chunk_size;
            if received < self.chunk_size {
                break;
            }
        }

        Ok(report)
    }
}
