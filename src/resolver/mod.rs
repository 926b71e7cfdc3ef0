//! # Content Resolver
//!
//! Maps a catalog path to a local file under `storage/assetbundle/`.
//!
//! Full-hash entries are durable across runs: the cache file is named by the hash and a file
//! whose contents hash back to that name is served without touching the network. Placeholder
//! entries cannot address the cache, so this run's downloads are remembered in memory and the
//! file is named after the server's transport checksum (or the payload's own MD5 when the
//! server sends none or sends one that is not hex). Only hex keys ever reach the file system.
//!
//! Concurrent resolves of the same path are not deduplicated; both write identical bytes via
//! temp-file-then-rename.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::{Mutex, Semaphore};

use crate::archive::unwrap_single_entry;
use crate::catalog::{AssetBundleInfo, CatalogSnapshot, ContentHash};
use crate::common::{is_cache_key, StorageLayout};
use crate::error::SyncError;
use crate::fetch::CdnClient;
use crate::fsx;

pub struct Resolver {
    res_version: String,
    entries: HashMap<String, AssetBundleInfo>,
    layout: StorageLayout,
    cdn: CdnClient,
    /// Placeholder-hash and unlisted downloads made during this run, by logical path.
    downloaded: Mutex<HashMap<String, PathBuf>>,
    downloads: Arc<Semaphore>,
}

impl Resolver {
    pub fn new(res_version: impl Into<String>, snapshot: &CatalogSnapshot, layout: StorageLayout, cdn: CdnClient, max_concurrent_downloads: usize) -> Self {
        Self {
            res_version: res_version.into(),
            entries: snapshot.lookup_table(),
            layout,
            cdn,
            downloaded: Mutex::new(HashMap::new()),
            downloads: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))),
        }
    }

    pub fn res_version(&self) -> &str {
        &self.res_version
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Finds the catalog entry for `path`, also trying `path.ab`.
    pub fn lookup(&self, path: &str) -> Option<&AssetBundleInfo> {
        self.entries.get(path).or_else(|| {
            if path.ends_with(".ab") {
                None
            } else {
                self.entries.get(&format!("{}.ab", path))
            }
        })
    }

    /// Resolves one catalog path to a validated local file.
    pub async fn resolve(&self, path: &str) -> Result<PathBuf, SyncError> {
        let info = self.lookup(path).ok_or_else(|| SyncError::NotFound { path: path.to_string() })?;
        match &info.content_hash {
            ContentHash::Full(hash) => self.resolve_full(&info.name, hash).await,
            ContentHash::Placeholder(_) => self.resolve_tracked(&info.name).await,
        }
    }

    /// Resolves every path concurrently. Fails with the first error.
    pub async fn resolve_many<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<(String, PathBuf)>, SyncError> {
        try_join_all(paths.iter().map(|p| async move {
            let p = p.as_ref();
            self.resolve(p).await.map(|local| (p.to_string(), local))
        }))
        .await
    }

    /// Fetches an object that has no catalog entry, such as the resource manifest. Tracked for
    /// the run like a placeholder entry.
    pub async fn resolve_unlisted(&self, name: &str) -> Result<PathBuf, SyncError> {
        self.resolve_tracked(name).await
    }

    async fn resolve_full(&self, name: &str, hash: &str) -> Result<PathBuf, SyncError> {
        if !is_cache_key(hash) {
            // no payload digest can match it
            return Err(SyncError::Integrity {
                path: self.layout.assetbundle_dir(),
                expected: hash.to_string(),
                actual: "a hex digest".to_string(),
            });
        }
        let target = self.layout.cache_path(hash);

        if let Some(actual) = hash_if_exists(target.clone()).await? {
            if actual == hash {
                tracing::trace!(bundle = name, "cache hit");
                return Ok(target);
            }
            let mismatch = SyncError::Integrity { path: target.clone(), expected: hash.to_string(), actual };
            tracing::warn!(bundle = name, "{}; downloading again", mismatch);
        }

        let payload = self.download(name).await?.1;
        let expected = hash.to_string();
        let path = target.clone();
        tokio::task::spawn_blocking(move || {
            let actual = fsx::md5_hex(&payload);
            if actual != expected {
                return Err(SyncError::Integrity { path, expected, actual });
            }
            fsx::write_atomic(&path, &payload).map_err(|e| SyncError::io(e, &path))
        })
        .await??;

        Ok(target)
    }

    async fn resolve_tracked(&self, name: &str) -> Result<PathBuf, SyncError> {
        if let Some(path) = self.downloaded.lock().await.get(name) {
            return Ok(path.clone());
        }

        let (checksum, payload) = self.download(name).await?;
        let layout = self.layout.clone();
        let target = tokio::task::spawn_blocking(move || {
            let key = checksum.filter(|c| is_cache_key(c)).unwrap_or_else(|| fsx::md5_hex(&payload));
            let path = layout.cache_path(&key);
            fsx::write_atomic(&path, &payload).map_err(|e| SyncError::io(e, &path))?;
            Ok::<_, SyncError>(path)
        })
        .await??;

        self.downloaded.lock().await.insert(name.to_string(), target.clone());
        Ok(target)
    }

    /// Downloads and unwraps one object. Returns the transport checksum and the payload.
    async fn download(&self, name: &str) -> Result<(Option<String>, Vec<u8>), SyncError> {
        let fetched = {
            let _permit = self.downloads.acquire().await.map_err(|e| SyncError::Other(Box::new(e)))?;
            self.cdn.fetch_bundle(&self.res_version, name).await?
        };
        let body = fetched.body;
        let payload = tokio::task::spawn_blocking(move || unwrap_single_entry(&body)).await??;
        Ok((fetched.checksum, payload))
    }
}

async fn hash_if_exists(path: PathBuf) -> Result<Option<String>, SyncError> {
    tokio::task::spawn_blocking(move || match fsx::md5_file(&path) {
        Ok(hash) => Ok(Some(hash)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::io(e, &path)),
    })
    .await?
}
