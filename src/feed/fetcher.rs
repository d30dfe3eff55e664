use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::util::validate_feed_url;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while downloading a feed document.
///
/// Any of these aborts the sync of that one feed; sibling feeds in a batch
/// run are unaffected.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The configured URL is not an http(s) URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// A successful GET: the status and the body decoded as text.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub text: String,
}

/// Plain HTTP GET collaborator.
///
/// No retries, no authentication. A timeout is applied only when one is
/// configured; by default a slow server blocks that feed until it answers.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl Fetcher {
    /// Build a fetcher with its own connection pool.
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Wrap an existing client (tests, shared pools).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// GET `url` and return its body as text.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - not an http(s) URL
    /// - [`FetchError::Network`] - connection, TLS or body read errors
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::Timeout`] - configured timeout elapsed
    /// - [`FetchError::ResponseTooLarge`] - body exceeded 10MB
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let url = validate_feed_url(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        // The limit covers headers and the whole body stream
        let exchange = self.exchange(url);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| FetchError::Timeout)?,
            None => exchange.await,
        }
    }

    async fn exchange(&self, url: url::Url) -> Result<FetchResponse, FetchError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "Feed request rejected");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        Ok(FetchResponse {
            status: status.as_u16(),
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
