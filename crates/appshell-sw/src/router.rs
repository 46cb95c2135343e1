//! Request routing: bypass → cache-first → network.

use std::sync::Arc;

use appshell_net::{AssetFetcher, FetchedResponse};
use appshell_store::{CacheStorage, CachedResponse};
use hashbrown::HashMap;
use tracing::{debug, trace, warn};
use url::Url;

use crate::pattern::BypassRules;
use crate::SwError;

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the active generation's store.
    Cache,
    /// Passed through to the network.
    Network,
}

/// A response handed back to the client.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    /// Final URL.
    pub url: String,
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    /// Origin of the response.
    pub source: ResponseSource,
}

impl RoutedResponse {
    /// Build a response from a cached blob, verbatim.
    fn from_cache(entry: CachedResponse) -> Self {
        Self {
            url: entry.url,
            status: entry.status,
            headers: entry.headers,
            body: entry.body,
            source: ResponseSource::Cache,
        }
    }

    /// Build a response from a fresh network fetch.
    fn from_network(response: FetchedResponse) -> Self {
        let cached = response.into_cached();
        Self {
            url: cached.url,
            status: cached.status,
            headers: cached.headers,
            body: cached.body,
            source: ResponseSource::Network,
        }
    }
}

/// Routes intercepted requests against the active generation.
pub struct RequestRouter {
    storage: CacheStorage,
    fetcher: Arc<AssetFetcher>,
    bypass: BypassRules,
}

impl RequestRouter {
    /// Create a new router.
    pub fn new(storage: CacheStorage, fetcher: Arc<AssetFetcher>, bypass: BypassRules) -> Self {
        Self {
            storage,
            fetcher,
            bypass,
        }
    }

    /// Route a request.
    ///
    /// Bypass patterns always go to the network, hit or miss. Everything
    /// else is cache-first against the active generation with no freshness
    /// check. A miss falls through to the network and is NOT written back;
    /// the cache only grows at install time.
    pub async fn route(&self, url: &Url) -> Result<RoutedResponse, SwError> {
        if self.bypass.is_bypassed(url) {
            debug!(url = %url, "Bypassing cache");
            let response = self.fetcher.fetch(url).await?;
            return Ok(RoutedResponse::from_network(response));
        }

        match self.storage.match_key(url.as_str()).await {
            Ok(Some(entry)) => {
                trace!(url = %url, "Cache hit");
                return Ok(RoutedResponse::from_cache(entry));
            }
            Ok(None) => {
                trace!(url = %url, "Cache miss");
            }
            Err(e) => {
                // Degraded store must not take the request down with it.
                warn!(url = %url, error = %e, "Cache probe failed; falling through to network");
            }
        }

        let response = self.fetcher.fetch(url).await?;
        Ok(RoutedResponse::from_network(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::UrlPattern;
    use appshell_net::FetcherConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn router(storage: CacheStorage, bypass: BypassRules) -> RequestRouter {
        let fetcher = Arc::new(AssetFetcher::new(FetcherConfig::default()).unwrap());
        RequestRouter::new(storage, fetcher, bypass)
    }

    fn cached(url: &str, body: &[u8]) -> CachedResponse {
        CachedResponse::new(url, 200, HashMap::new(), body.to_vec())
    }

    #[tokio::test]
    async fn test_route_serves_cache_hit_without_network() {
        let server = MockServer::start().await;
        // Any network call would be a violation; expect zero.
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"from-network".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();

        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        storage
            .put("gen", url.as_str(), cached(url.as_str(), b"from-cache"))
            .await
            .unwrap();
        storage.set_active("gen").await.unwrap();

        let response = router(storage, BypassRules::default())
            .route(&url)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"from-cache");
    }

    #[tokio::test]
    async fn test_route_miss_falls_through_to_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fresh.css"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .mount(&server)
            .await;

        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        storage.set_active("gen").await.unwrap();

        let url = Url::parse(&format!("{}/fresh.css", server.uri())).unwrap();
        let response = router(storage.clone(), BypassRules::default())
            .route(&url)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body, b"fresh");

        // No opportunistic write-back: the miss did not grow the cache.
        assert_eq!(storage.entry_count("gen").await, Some(0));
    }

    #[tokio::test]
    async fn test_route_bypass_ignores_cached_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/log-habit"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"live".to_vec()))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/api/log-habit", server.uri())).unwrap();

        // Identical key sits in the active generation; bypass must win.
        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        storage
            .put("gen", url.as_str(), cached(url.as_str(), b"stale"))
            .await
            .unwrap();
        storage.set_active("gen").await.unwrap();

        let bypass = BypassRules::new(vec![UrlPattern::contains("/api/")]);
        let response = router(storage, bypass).route(&url).await.unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body, b"live");
    }

    #[tokio::test]
    async fn test_route_unavailable_store_falls_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"network".to_vec()))
            .mount(&server)
            .await;

        let storage = CacheStorage::new();
        storage.close();

        let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();
        let response = router(storage, BypassRules::default())
            .route(&url)
            .await
            .unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body, b"network");
    }

    #[tokio::test]
    async fn test_route_network_failure_surfaces() {
        let storage = CacheStorage::new();
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();

        let result = router(storage, BypassRules::default()).route(&url).await;
        assert!(matches!(result, Err(SwError::Fetch(_))));
    }
}
