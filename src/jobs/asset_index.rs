//! Builds the asset path to bundle name index that later tiers select bundles with.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Job, SyncContext};
use crate::catalog::{CatalogFormat, ChangeEntry};
use crate::container;
use crate::error::SyncError;
use crate::fsx;

pub const INDEX_BUNDLE: &str = "torappu_index.ab";
pub const INDEX_CONTAINER_PATH: &str = "assets/torappu/dynamicassets/torappu_index.asset";
pub const MANIFEST_SCHEMA: &str = "resource_manifest";

pub struct AssetIndexJob {
    ctx: Arc<SyncContext>,
}

impl AssetIndexJob {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    async fn from_index_bundle(&self) -> Result<Value, SyncError> {
        let bundle = self.ctx.resolver.resolve(INDEX_BUNDLE).await?;
        container::read_typetree(self.ctx.container.clone(), bundle, INDEX_CONTAINER_PATH.to_string())
            .await?
            .ok_or_else(|| SyncError::collaborator("asset container", format!("{} not found in {}", INDEX_CONTAINER_PATH, INDEX_BUNDLE)))
    }

    async fn from_manifest(&self, manifest_name: &str) -> Result<Value, SyncError> {
        let local = self.ctx.resolver.resolve_unlisted(manifest_name).await?;
        let bytes = tokio::task::spawn_blocking(move || fsx::read(&local).map_err(|e| SyncError::io(e, &local))).await??;
        self.ctx.flatc.decode(MANIFEST_SCHEMA, bytes).await
    }
}

/// Extracts `assetToBundleList` entries. A row names its bundle either directly with
/// `bundleName` or through `bundleIndex` into a top-level `bundles` table.
pub fn parse_asset_index(value: &Value) -> Result<HashMap<String, String>, SyncError> {
    let rows = value
        .get("assetToBundleList")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::CorruptStream("asset index has no assetToBundleList".into()))?;
    let bundles = value.get("bundles").and_then(Value::as_array);

    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        let Some(asset) = row.get("assetName").and_then(Value::as_str) else {
            continue;
        };
        let bundle = match row.get("bundleName").and_then(Value::as_str) {
            Some(name) => Some(name),
            None => row
                .get("bundleIndex")
                .and_then(Value::as_u64)
                .and_then(|i| bundles.and_then(|b| b.get(i as usize)))
                .and_then(|b| b.get("name"))
                .and_then(Value::as_str),
        };
        match bundle {
            Some(bundle) => {
                index.insert(asset.to_string(), bundle.to_string());
            }
            None => tracing::debug!(asset, "asset index row without a resolvable bundle"),
        }
    }
    Ok(index)
}

#[async_trait]
impl Job for AssetIndexJob {
    /// Runs whenever anything changed: later tiers select their bundles through the index, so
    /// it cannot be skipped for a change it does not itself cover. In steady state the index
    /// bundle is a cache hit.
    fn check(&mut self, changes: &[ChangeEntry]) -> Result<bool, SyncError> {
        Ok(!changes.is_empty())
    }

    async fn start(&mut self) -> Result<(), SyncError> {
        let raw = match (self.ctx.snapshot.format(), self.ctx.snapshot.manifest_name.as_deref()) {
            (CatalogFormat::Manifest, Some(manifest)) => self.from_manifest(manifest).await?,
            _ => self.from_index_bundle().await?,
        };
        let index = parse_asset_index(&raw)?;
        tracing::info!(assets = index.len(), "asset index loaded");
        self.ctx.publish_asset_index(index);
        Ok(())
    }
}
