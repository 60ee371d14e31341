use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Default timeout of a single HTTP transfer.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Transfers the bytes behind a URL into a local file.
///
/// Implementations write to `destination` only; moving the file to its
/// final location is the cache's job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads `url` into `destination` and returns the number of bytes written.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Fetcher streaming HTTP(S) responses straight to disk.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::fetch("<client>", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        use futures_util::StreamExt;
        use tokio::io::AsyncWriteExt;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(CacheError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            tracing::debug!(url, expected_bytes = length, "Starting media transfer");
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CacheError::fetch(url, format!("Failed to read chunk: {}", e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }
}
