//! Process-wide cache of card catalogs
//!
//! Catalogs are fetched lazily on first use and then kept for the lifetime
//! of the process. Loads are single-flight per [`SetKey`]: concurrent callers
//! for the same key share one fetch and all receive its result, success or
//! failure. Callers for other keys are unaffected. A failed load is not
//! stored, so a call made after it settles fetches again.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fetch::AssetFetcher;
use super::{catalog_url, SetCatalog, SetKey};
use crate::error::LoadError;

type PendingLoad = Shared<BoxFuture<'static, Result<Arc<SetCatalog>, LoadError>>>;

#[derive(Default)]
struct Entries {
    loaded: HashMap<SetKey, Arc<SetCatalog>>,
    in_flight: HashMap<SetKey, PendingLoad>,
}

/// Lazily populated map from set key to catalog
pub struct CatalogCache {
    base_url: String,
    fetcher: Arc<dyn AssetFetcher>,
    /// Guarded only while looking up or settling an entry, never across a fetch
    entries: Mutex<Entries>,
}

impl CatalogCache {
    pub fn new(base_url: impl Into<String>, fetcher: Box<dyn AssetFetcher>) -> Self {
        Self {
            base_url: base_url.into(),
            fetcher: Arc::from(fetcher),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Return the catalog for `key`, fetching it if this is the first request
    pub async fn ensure_loaded(&self, key: &SetKey) -> Result<Arc<SetCatalog>, LoadError> {
        let pending = {
            let mut entries = self.entries.lock();
            if let Some(catalog) = entries.loaded.get(key) {
                return Ok(Arc::clone(catalog));
            }
            entries
                .in_flight
                .entry(key.clone())
                .or_insert_with(|| self.start_load(key))
                .clone()
        };

        let result = pending.clone().await;
        self.settle(key, &pending, &result);
        result
    }

    /// Already-loaded catalog, without triggering a fetch
    pub fn get(&self, key: &SetKey) -> Option<Arc<SetCatalog>> {
        self.entries.lock().loaded.get(key).cloned()
    }

    /// Number of catalogs currently held
    pub fn loaded_count(&self) -> usize {
        self.entries.lock().loaded.len()
    }

    fn start_load(&self, key: &SetKey) -> PendingLoad {
        let fetcher = Arc::clone(&self.fetcher);
        let url = catalog_url(&self.base_url, key);
        let key = key.clone();

        async move { load(fetcher.as_ref(), &key, url).await }
            .boxed()
            .shared()
    }

    /// Retire a finished load. The first waiter to get here moves the result
    /// out of the in-flight table; a newer load for the same key is left alone.
    fn settle(&self, key: &SetKey, pending: &PendingLoad, result: &Result<Arc<SetCatalog>, LoadError>) {
        let mut entries = self.entries.lock();
        if !entries.in_flight.get(key).is_some_and(|current| current.ptr_eq(pending)) {
            return;
        }

        entries.in_flight.remove(key);
        if let Ok(catalog) = result {
            entries.loaded.insert(key.clone(), Arc::clone(catalog));
        }
    }
}

async fn load(fetcher: &dyn AssetFetcher, key: &SetKey, url: String) -> Result<Arc<SetCatalog>, LoadError> {
    debug!("Loading catalog for {} from {}", key, url);

    let bytes = fetcher.fetch_catalog_json(&url).await.map_err(|e| {
        warn!("Catalog fetch for {} failed: {}", key, e);
        LoadError::from(e)
    })?;

    let catalog = SetCatalog::from_json(&bytes).map_err(|e| {
        warn!("Catalog for {} is not valid JSON: {}", key, e);
        LoadError::Parse {
            url: url.clone(),
            message: e.to_string(),
        }
    })?;

    info!(
        "Loaded catalog {} ({} sub-sets, {} cards)",
        key,
        catalog.sets.len(),
        catalog.card_count()
    );

    Ok(Arc::new(catalog))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    pub(crate) const TOPPS_CHROME: &str = r#"{
        "Sets": [
            { "Name": "Base", "Cards": [
                { "Number": "1", "Name": "Mike Trout" },
                { "Number": "2", "Name": "Ronald Acuna Jr.", "Attributes": [] },
                { "Number": "3", "Name": "Shohei Ohtani" }
            ]},
            { "Name": "Rookies", "Cards": [
                { "Number": "R1", "Name": "Julio Rodriguez", "Attributes": ["RC"] }
            ]}
        ]
    }"#;

    /// Serves one JSON body for every URL and counts requests
    pub(crate) struct CountingFetcher {
        pub body: String,
        pub calls: AtomicUsize,
        pub delay: Duration,
        pub fail_first: AtomicBool,
    }

    impl CountingFetcher {
        pub(crate) fn new(body: &str) -> Self {
            Self {
                body: body.to_string(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail_first: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl AssetFetcher for Arc<CountingFetcher> {
        async fn fetch_catalog_json(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            Ok(self.body.as_bytes().to_vec())
        }
    }

    fn key() -> SetKey {
        SetKey::new("2022", "Topps-Chrome")
    }

    #[tokio::test]
    async fn test_loads_once_and_caches() {
        let fetcher = Arc::new(CountingFetcher::new(TOPPS_CHROME));
        let cache = CatalogCache::new("https://example.test", Box::new(Arc::clone(&fetcher)));

        assert!(cache.get(&key()).is_none());

        let first = cache.ensure_loaded(&key()).await.unwrap();
        let second = cache.ensure_loaded(&key()).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.card_count(), 4);
        assert!(cache.get(&key()).is_some());
        assert_eq!(cache.loaded_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_fetch() {
        let mut fetcher = CountingFetcher::new(TOPPS_CHROME);
        fetcher.delay = Duration::from_millis(50);
        let fetcher = Arc::new(fetcher);
        let cache = CatalogCache::new("https://example.test", Box::new(Arc::clone(&fetcher)));

        let key = key();
        let results = join_all((0..8).map(|_| cache.ensure_loaded(&key))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried() {
        let fetcher = Arc::new(CountingFetcher::new(TOPPS_CHROME));
        fetcher.fail_first.store(true, Ordering::SeqCst);
        let cache = CatalogCache::new("https://example.test", Box::new(Arc::clone(&fetcher)));

        let first = cache.ensure_loaded(&key()).await;
        assert!(matches!(first, Err(LoadError::Fetch(FetchError::Status { status: 503, .. }))));
        assert!(cache.get(&key()).is_none());

        let second = cache.ensure_loaded(&key()).await;
        assert!(second.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_does_not_poison() {
        let fetcher = Arc::new(CountingFetcher::new("<html>rate limited</html>"));
        let cache = CatalogCache::new("https://example.test", Box::new(Arc::clone(&fetcher)));

        let result = cache.ensure_loaded(&key()).await;
        assert!(matches!(result, Err(LoadError::Parse { .. })));

        let result = cache.ensure_loaded(&key()).await;
        assert!(result.is_err());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.loaded_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_a_failed_load() {
        let mut fetcher = CountingFetcher::new("{ not a catalog");
        fetcher.delay = Duration::from_millis(50);
        let fetcher = Arc::new(fetcher);
        let cache = CatalogCache::new("https://example.test", Box::new(Arc::clone(&fetcher)));

        let key = key();
        let results = join_all((0..8).map(|_| cache.ensure_loaded(&key))).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        for result in &results {
            assert!(matches!(result, Err(LoadError::Parse { url, .. }) if url.ends_with("/2022/2022-Topps-Chrome.json")));
        }
        assert!(cache.get(&key).is_none());

        // the failure is not cached, a later call goes back to the network
        let retry = cache.ensure_loaded(&key).await;
        assert!(retry.is_err());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    /// Holds the 1989 fetch until the 1990 fetch has gone through
    struct GatedFetcher {
        gate: Notify,
    }

    #[async_trait]
    impl AssetFetcher for Arc<GatedFetcher> {
        async fn fetch_catalog_json(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            if url.contains("/1989/") {
                self.gate.notified().await;
            } else {
                self.gate.notify_one();
            }
            Ok(TOPPS_CHROME.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block_each_other() {
        let fetcher = Arc::new(GatedFetcher { gate: Notify::new() });
        let cache = CatalogCache::new("https://example.test", Box::new(Arc::clone(&fetcher)));

        let slow = SetKey::new("1989", "Topps");
        let fast = SetKey::new("1990", "Topps");

        let both = async { tokio::join!(cache.ensure_loaded(&slow), cache.ensure_loaded(&fast)) };
        let (a, b) = tokio::time::timeout(Duration::from_secs(2), both)
            .await
            .expect("loads for different keys must not serialize");

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(cache.loaded_count(), 2);
    }
}
