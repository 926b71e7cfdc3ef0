//! Verbatim local store of fetched catalogs, keyed by `res_version`.

use std::path::PathBuf;

use crate::catalog::CatalogSnapshot;
use crate::common::StorageLayout;
use crate::error::SyncError;
use crate::fetch::CdnClient;
use crate::fsx;

pub struct SnapshotStore<'a> {
    layout: &'a StorageLayout,
    cdn: &'a CdnClient,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(layout: &'a StorageLayout, cdn: &'a CdnClient) -> Self {
        Self { layout, cdn }
    }

    pub fn path(&self, res_version: &str) -> PathBuf {
        self.layout.snapshot_path(res_version)
    }

    /// Returns the locally stored snapshot, if one exists and parses.
    pub fn load_local(&self, res_version: &str) -> Option<CatalogSnapshot> {
        let path = self.path(res_version);
        let bytes = match fsx::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };
        match CatalogSnapshot::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(res_version, path = %path.display(), "stored catalog is unreadable, refetching: {e}");
                None
            }
        }
    }

    /// Local copy first, CDN second. A fetched catalog is persisted byte-for-byte before it is
    /// returned. Any failure is a [`SyncError::Catalog`].
    pub async fn load(&self, res_version: &str) -> Result<CatalogSnapshot, SyncError> {
        if let Some(snapshot) = self.load_local(res_version) {
            tracing::debug!(res_version, "catalog loaded from snapshot store");
            return Ok(snapshot);
        }

        let catalog_error = |reason: String| SyncError::Catalog { res_version: res_version.to_string(), reason };

        let bytes = self.cdn.fetch_catalog(res_version).await.map_err(|e| catalog_error(e.to_string()))?;
        let snapshot = CatalogSnapshot::from_slice(&bytes).map_err(|e| catalog_error(format!("invalid catalog JSON: {}", e)))?;

        let path = self.path(res_version);
        fsx::write_atomic(&path, &bytes).map_err(|e| catalog_error(SyncError::io(e, &path).to_string()))?;
        tracing::info!(res_version, entries = snapshot.ab_infos.len(), "catalog stored");
        Ok(snapshot)
    }
}
