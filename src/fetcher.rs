//! Image transport: the fetcher trait and its reqwest implementation.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::error::{ImageError, Result};

/// Abstraction over fetching one image into a file, enabling testability.
///
/// Implementations must not leave a file behind when they return an error.
#[async_trait::async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch `url` and store its body at `dest`, returning the bytes written.
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> std::result::Result<u64, ImageError>;
}

/// Client shared by image downloads and page crawling.
pub fn http_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// Production [`ImageFetcher`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Build a fetcher with a per-request timeout and User-Agent.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout, user_agent)?,
        })
    }

    /// Wrap an existing client (shared with the page crawler).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> std::result::Result<u64, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| ImageError::CreateFile {
                path: dest.to_path_buf(),
                source,
            })?;

        match stream_body(response, file).await {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                    tracing::debug!(
                        path = %dest.display(),
                        error = %remove_err,
                        "Failed to remove partial image file"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Copy a response body into `file` chunk by chunk.
async fn stream_body(
    mut response: reqwest::Response,
    mut file: tokio::fs::File,
) -> std::result::Result<u64, ImageError> {
    let mut written = 0u64;
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                return Err(ImageError::Copy {
                    written,
                    reason: e.to_string(),
                });
            }
        };
        file.write_all(&chunk)
            .await
            .map_err(|e| ImageError::Copy {
                written,
                reason: e.to_string(),
            })?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| ImageError::Copy {
        written,
        reason: e.to_string(),
    })?;
    Ok(written)
}
