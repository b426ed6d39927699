//! Retrieval of raw catalog files

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Source of raw catalog JSON
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the raw bytes behind `url`
    async fn fetch_catalog_json(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches catalogs over HTTP(S)
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    offline: bool,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            offline: crate::config::offline_mode(),
        })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch_catalog_json(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if self.offline {
            return Err(FetchError::Offline(url.to_string()));
        }

        debug!("Fetching catalog {}", url);

        let response = self.client.get(url).send().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// Reads catalogs from a local mirror of the catalog repository
#[derive(Debug, Default)]
pub struct LocalAssetFetcher;

#[async_trait]
impl AssetFetcher for LocalAssetFetcher {
    async fn fetch_catalog_json(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));

        tokio::fs::read(&path).await.map_err(|e| FetchError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Pick a fetcher for the configured catalog base URL
pub fn fetcher_for_base_url(base_url: &str, timeout: Duration) -> Result<Box<dyn AssetFetcher>, FetchError> {
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        Ok(Box::new(HttpAssetFetcher::new(timeout)?))
    } else {
        Ok(Box::new(LocalAssetFetcher))
    }
}
