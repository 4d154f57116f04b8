// src/fetch.rs

//! Product page retrieval.
//!
//! Stock state must be inferable from the initial server-rendered HTML; no
//! cookies, no sessions, no script execution.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::WatcherConfig;
use crate::utils::http;

/// Typed failure for a single page fetch.
///
/// Always recoverable per item; a failed fetch never aborts a sweep.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = error.status() {
            FetchError::Status(status)
        } else {
            FetchError::Network(error)
        }
    }
}

/// Source of raw page markup for a product URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Retrieve the document text behind `url`.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP-backed page source with a bounded timeout and a static
/// browser-like user-agent.
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    /// Build a fetcher from watcher settings. The client is constructed
    /// once and reused across sweeps.
    pub fn new(config: &WatcherConfig) -> crate::error::Result<Self> {
        let client = http::create_async_client(config)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for PageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
