//! HTTP access to the asset CDN.

use std::time::Duration;

use crate::common::{is_cache_key, path_to_url};
use crate::config::SyncConfig;
use crate::error::SyncError;

pub mod retry;

pub use retry::{retry, RetryPolicy};

/// A successful response body plus the transport checksum, when the server sent one.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: Vec<u8>,
    pub checksum: Option<String>,
}

/// Thin wrapper around a `reqwest::Client` that knows the CDN's URL scheme.
#[derive(Debug, Clone)]
pub struct CdnClient {
    http: reqwest::Client,
    base_url: String,
    checksum_header: String,
    bundle_retry: RetryPolicy,
    catalog_retry: RetryPolicy,
}

/// Normalizes an ETag-style header value into a bare lowercase hex token. Values that are not
/// hex are dropped, since the token becomes a cache file name.
pub fn normalize_checksum(raw: &str) -> Option<String> {
    let value = raw.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    let value = value.trim_matches('"').trim().to_ascii_lowercase();
    Some(value).filter(|v| is_cache_key(v))
}

impl CdnClient {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| SyncError::Other(Box::new(e)))?;
        Ok(Self {
            http,
            base_url: config.cdn_base_url.trim_end_matches('/').to_string(),
            checksum_header: config.checksum_header.to_ascii_lowercase(),
            bundle_retry: config.bundle_retry(),
            catalog_retry: config.catalog_retry(),
        })
    }

    pub fn catalog_url(&self, res_version: &str) -> String {
        format!("{}/{}/hot_update_list.json", self.base_url, res_version)
    }

    /// `<base>/<res>/<escaped name without .ab>.dat`
    pub fn bundle_url(&self, res_version: &str, bundle: &str) -> String {
        let stem = bundle.strip_suffix(".ab").unwrap_or(bundle);
        format!("{}/{}/{}.dat", self.base_url, res_version, path_to_url(stem))
    }

    async fn get_once(&self, url: &str) -> Result<Fetched, SyncError> {
        let network = |status: Option<u16>, reason: String| SyncError::Network { url: url.to_string(), status, reason };

        let response = self.http.get(url).send().await.map_err(|e| network(e.status().map(|s| s.as_u16()), e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(network(Some(status.as_u16()), status.canonical_reason().unwrap_or("unexpected status").to_string()));
        }

        let checksum = response
            .headers()
            .get(self.checksum_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(normalize_checksum);
        let body = response.bytes().await.map_err(|e| network(None, format!("reading body: {}", e)))?;
        Ok(Fetched { body: body.to_vec(), checksum })
    }

    /// GET with the given retry policy. Only network errors are retried.
    pub async fn get(&self, url: &str, policy: &RetryPolicy) -> Result<Fetched, SyncError> {
        retry(policy, SyncError::is_retryable, || self.get_once(url)).await
    }

    /// Fetches the raw catalog JSON, retrying a bounded number of times.
    pub async fn fetch_catalog(&self, res_version: &str) -> Result<Vec<u8>, SyncError> {
        let url = self.catalog_url(res_version);
        tracing::debug!(res_version, %url, "downloading hot_update_list.json");
        Ok(self.get(&url, &self.catalog_retry).await?.body)
    }

    /// Fetches a bundle object (still wrapped in its transport archive).
    pub async fn fetch_bundle(&self, res_version: &str, bundle: &str) -> Result<Fetched, SyncError> {
        let url = self.bundle_url(res_version, bundle);
        let fetched = self.get(&url, &self.bundle_retry).await?;
        tracing::debug!(bundle, bytes = fetched.body.len(), "downloaded");
        Ok(fetched)
    }
}
