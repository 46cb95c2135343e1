//! # Appshell Net
//!
//! Network fetch layer for the appshell cache manager.
//!
//! ## Design Goals
//!
//! 1. **Async fetch**: Non-blocking GETs for manifest population and
//!    pass-through routing
//! 2. **Status is data**: a non-2xx response is a successful fetch; status
//!    policy belongs to the caller
//! 3. **Store handoff**: responses convert directly into cache blobs

use std::time::Duration;

use appshell_store::CachedResponse;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, StatusCode};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

/// Errors that can occur in the fetch layer.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// A fully-read network response.
#[derive(Debug)]
pub struct FetchedResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchedResponse {
    /// Check if the fetch was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Convert into a storable cache blob.
    pub fn into_cached(self) -> CachedResponse {
        let headers: HashMap<String, String> = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        CachedResponse::new(
            self.url.as_str(),
            self.status.as_u16(),
            headers,
            self.body.to_vec(),
        )
    }
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub default_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "Appshell/1.0".to_string(),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Asset fetcher for manifest population and pass-through routing.
pub struct AssetFetcher {
    client: Client,
    config: FetcherConfig,
}

impl AssetFetcher {
    /// Create a new fetcher.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        debug!(
            user_agent = %config.user_agent,
            timeout = ?config.default_timeout,
            "AssetFetcher initialized"
        );

        Ok(Self { client, config })
    }

    fn map_err(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.config.default_timeout)
        } else {
            FetchError::HttpError(e)
        }
    }

    /// Fetch a URL, reading the full body.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedResponse, FetchError> {
        debug!(url = %url, "Fetching resource");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = response.bytes().await.map_err(|e| self.map_err(e))?;

        trace!(
            url = %final_url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(FetchedResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }

    /// Fetch a URL given as a string.
    pub async fn fetch_str(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        self.fetch(&url).await
    }
}
