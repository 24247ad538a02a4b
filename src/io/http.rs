use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ByteRange, ByteRangeSource};
use anyhow::{Result, bail};

/// HTTP Range source for remote ROOT files; the path is the file's URL
pub struct HttpRangeSource {
    client: Client,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeSource {
    /// Create a new HTTP Range source with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        })
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry.max(1);
        self
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ByteRangeSource for HttpRangeSource {
    async fn read(&self, url: &str, range: ByteRange) -> Result<Bytes> {
        if range.length == 0 {
            return Ok(Bytes::new());
        }

        let header = format!("bytes={}-{}", range.offset, range.end() - 1);
        let mut retry_count = 0;

        loop {
            let result = self
                .client
                .get(url)
                .header("Range", &header)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    match resp.status() {
                        StatusCode::PARTIAL_CONTENT => {}
                        // Range starts past the end of the file
                        StatusCode::RANGE_NOT_SATISFIABLE => return Ok(Bytes::new()),
                        status => bail!("HTTP request failed with status: {}", status),
                    }

                    let mut bytes = resp.bytes().await?;
                    bytes.truncate(range.length as usize);
                    self.transferred_bytes
                        .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    debug!(url, %range, received = bytes.len(), "range read");
                    return Ok(bytes);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded: {}", e);
                    }
                    warn!(
                        url,
                        retry_count,
                        max_retry = self.max_retry,
                        error = %e,
                        "connection error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
