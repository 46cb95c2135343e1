//! Population pipeline: scatter-gather prefetch of the manifest into a
//! target generation.
//!
//! Per-entry fetch failures and non-ok statuses never abort the run; a
//! missing optional asset must not cost the rest of the app shell. Only the
//! store backend becoming unavailable aborts.

use appshell_net::AssetFetcher;
use appshell_store::{CacheStorage, StoreError};
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Errors that can abort a population run.
#[derive(Error, Debug)]
pub enum PopulateError {
    /// The store backend became unavailable mid-run.
    #[error("Population aborted: {0}")]
    Aborted(#[source] StoreError),
}

/// Aggregate outcome of a population run. Buckets preserve manifest order.
#[derive(Debug, Clone, Default)]
pub struct PopulationReport {
    /// Entries fetched and stored.
    pub succeeded: Vec<String>,
    /// Entries that returned a non-ok status (e.g. 404) and were not stored.
    pub skipped: Vec<String>,
    /// Entries whose fetch failed outright.
    pub failed: Vec<String>,
}

impl PopulationReport {
    /// Total number of manifest entries accounted for.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }

    /// True when every entry was stored.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Per-entry outcome, folded into the report after the join.
enum Outcome {
    Succeeded(String),
    Skipped(String),
    Failed(String),
    StoreFailed(String, StoreError),
}

async fn populate_one(
    fetcher: &AssetFetcher,
    storage: &CacheStorage,
    origin: &Url,
    entry: &str,
    target: &str,
) -> Outcome {
    let url = match origin.join(entry) {
        Ok(url) => url,
        Err(e) => {
            warn!(entry, error = %e, "Manifest entry is not a valid URL");
            return Outcome::Failed(entry.to_string());
        }
    };

    let response = match fetcher.fetch(&url).await {
        Ok(response) => response,
        Err(e) => {
            warn!(entry, url = %url, error = %e, "Fetch failed while caching");
            return Outcome::Failed(entry.to_string());
        }
    };

    if !response.ok() {
        warn!(entry, url = %url, status = %response.status, "Not caching non-ok response");
        return Outcome::Skipped(entry.to_string());
    }

    let key = url.to_string();
    match storage.put(target, &key, response.into_cached()).await {
        Ok(()) => {
            debug!(entry, key = %key, "Cached manifest entry");
            Outcome::Succeeded(entry.to_string())
        }
        Err(e) => Outcome::StoreFailed(entry.to_string(), e),
    }
}

/// Fetch every manifest entry concurrently and store the successes into the
/// target generation.
///
/// Completion waits for all outcomes. The call fails only if the store
/// backend itself becomes unavailable; individual fetch outcomes surface in
/// the [`PopulationReport`].
pub async fn populate(
    fetcher: &AssetFetcher,
    storage: &CacheStorage,
    origin: &Url,
    manifest: &[String],
    target: &str,
) -> Result<PopulationReport, PopulateError> {
    debug!(target, entries = manifest.len(), "Populating generation");

    let outcomes = join_all(
        manifest
            .iter()
            .map(|entry| populate_one(fetcher, storage, origin, entry, target)),
    )
    .await;

    let mut report = PopulationReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Succeeded(entry) => report.succeeded.push(entry),
            Outcome::Skipped(entry) => report.skipped.push(entry),
            Outcome::Failed(entry) => report.failed.push(entry),
            Outcome::StoreFailed(entry, e) => {
                warn!(entry, error = %e, "Store write failed; aborting population");
                return Err(PopulateError::Aborted(e));
            }
        }
    }

    info!(
        target,
        succeeded = report.succeeded.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Population finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appshell_net::FetcherConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> AssetFetcher {
        AssetFetcher::new(FetcherConfig::default()).unwrap()
    }

    async fn mount_ok(server: &MockServer, p: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_populate_all_ok() {
        let server = MockServer::start().await;
        mount_ok(&server, "/", b"root").await;
        mount_ok(&server, "/index.html", b"index").await;
        mount_ok(&server, "/icon-512.png", b"png").await;

        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        let origin = Url::parse(&server.uri()).unwrap();
        let manifest = vec![
            "/".to_string(),
            "/index.html".to_string(),
            "/icon-512.png".to_string(),
        ];

        let report = populate(&fetcher(), &storage, &origin, &manifest, "gen")
            .await
            .unwrap();

        assert_eq!(report.succeeded, manifest);
        assert!(report.skipped.is_empty());
        assert!(report.failed.is_empty());
        assert!(report.is_complete());
        assert_eq!(storage.entry_count("gen").await, Some(3));
    }

    #[tokio::test]
    async fn test_populate_skips_not_found() {
        let server = MockServer::start().await;
        mount_ok(&server, "/index.html", b"index").await;
        Mock::given(method("GET"))
            .and(path("/missing-icon.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        let origin = Url::parse(&server.uri()).unwrap();
        let manifest = vec!["/index.html".to_string(), "/missing-icon.png".to_string()];

        let report = populate(&fetcher(), &storage, &origin, &manifest, "gen")
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec!["/index.html"]);
        assert_eq!(report.skipped, vec!["/missing-icon.png"]);
        assert!(report.failed.is_empty());
        assert_eq!(report.total(), 2);
        assert!(!report.is_complete());
        assert_eq!(storage.entry_count("gen").await, Some(1));
    }

    #[tokio::test]
    async fn test_populate_tolerates_fetch_failure() {
        let server = MockServer::start().await;
        mount_ok(&server, "/index.html", b"index").await;

        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        let origin = Url::parse(&server.uri()).unwrap();
        // Absolute entry pointing at a dead port: the fetch fails, the rest
        // of the manifest still populates.
        let manifest = vec![
            "/index.html".to_string(),
            "http://127.0.0.1:9/asset.js".to_string(),
        ];

        let report = populate(&fetcher(), &storage, &origin, &manifest, "gen")
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec!["/index.html"]);
        assert_eq!(report.failed, vec!["http://127.0.0.1:9/asset.js"]);
        assert_eq!(storage.entry_count("gen").await, Some(1));
    }

    #[tokio::test]
    async fn test_populate_flags_invalid_manifest_entry() {
        let server = MockServer::start().await;
        mount_ok(&server, "/index.html", b"index").await;

        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        let origin = Url::parse(&server.uri()).unwrap();
        let manifest = vec!["/index.html".to_string(), "https://[bad".to_string()];

        let report = populate(&fetcher(), &storage, &origin, &manifest, "gen")
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec!["/index.html"]);
        assert_eq!(report.failed, vec!["https://[bad"]);
    }

    #[tokio::test]
    async fn test_populate_aborts_when_store_unavailable() {
        let server = MockServer::start().await;
        mount_ok(&server, "/index.html", b"index").await;

        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        storage.close();

        let origin = Url::parse(&server.uri()).unwrap();
        let manifest = vec!["/index.html".to_string()];

        let result = populate(&fetcher(), &storage, &origin, &manifest, "gen").await;
        assert!(matches!(result, Err(PopulateError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_populate_keys_are_absolute_urls() {
        let server = MockServer::start().await;
        mount_ok(&server, "/index.html", b"index").await;

        let storage = CacheStorage::new();
        storage.open("gen").await.unwrap();
        let origin = Url::parse(&server.uri()).unwrap();
        let manifest = vec!["/index.html".to_string()];

        populate(&fetcher(), &storage, &origin, &manifest, "gen")
            .await
            .unwrap();

        storage.set_active("gen").await.unwrap();
        let key = format!("{}/index.html", server.uri());
        let entry = storage.match_key(&key).await.unwrap().unwrap();
        assert_eq!(entry.body, b"index");
    }
}
