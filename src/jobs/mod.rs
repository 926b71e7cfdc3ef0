//! # Extraction Jobs
//!
//! A job inspects the run's change list in [`Job::check`] and, if it applies, does its work in
//! [`Job::start`]. Jobs share one [`SyncContext`] per run.
//!
//! | job | priority | reads |
//! |-----|----------|-------|
//! | `asset_index` | 0 | index bundle or resource manifest |
//! | `game_data` | 1 | gamedata bundles |
//! | `item_demand` | 2 | decoded excel tables |
//! | `char_avatar`, `item_icon`, `audio` | 3 | art and audio bundles |

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::catalog::{CatalogSnapshot, ChangeEntry};
use crate::common::{StorageLayout, Version};
use crate::container::AssetContainer;
use crate::error::SyncError;
use crate::flatc::FlatcRunner;
use crate::fsx;
use crate::resolver::Resolver;
use crate::workers::{Registry, RegistryBuilder};

pub mod asset_index;
pub mod gamedata;
pub mod item_demand;
pub mod namespace_export;

pub use asset_index::AssetIndexJob;
pub use gamedata::GameDataJob;
pub use item_demand::ItemDemandJob;
pub use namespace_export::NamespaceExportJob;

#[async_trait]
pub trait Job: Send {
    /// Decides from the change list whether this job has work to do. Must not have side
    /// effects beyond remembering what it selected.
    fn check(&mut self, changes: &[ChangeEntry]) -> Result<bool, SyncError>;

    async fn start(&mut self) -> Result<(), SyncError>;
}

/// Everything a job needs for one run.
pub struct SyncContext {
    pub version: Version,
    pub snapshot: Arc<CatalogSnapshot>,
    pub resolver: Arc<Resolver>,
    pub container: Arc<dyn AssetContainer>,
    pub flatc: FlatcRunner,
    pub layout: StorageLayout,
    /// Asset path to bundle name, published by `asset_index`. `None` until it completes.
    asset_index: RwLock<Option<HashMap<String, String>>>,
}

impl SyncContext {
    pub fn new(
        version: Version,
        snapshot: Arc<CatalogSnapshot>,
        resolver: Arc<Resolver>,
        container: Arc<dyn AssetContainer>,
        flatc: FlatcRunner,
        layout: StorageLayout,
    ) -> Self {
        Self { version, snapshot, resolver, container, flatc, layout, asset_index: RwLock::new(None) }
    }

    pub fn res_version(&self) -> &str {
        &self.version.res_version
    }

    pub fn publish_asset_index(&self, index: HashMap<String, String>) {
        match self.asset_index.write() {
            Ok(mut guard) => *guard = Some(index),
            Err(poisoned) => *poisoned.into_inner() = Some(index),
        }
    }

    /// Distinct bundles holding at least one asset whose path starts with one of `prefixes`,
    /// sorted by name. Fails with [`SyncError::IndexUnavailable`] when no index was published.
    pub fn bundles_for_prefixes(&self, prefixes: &[&str]) -> Result<Vec<String>, SyncError> {
        let guard = match self.asset_index.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let index = guard.as_ref().ok_or(SyncError::IndexUnavailable)?;
        let bundles: BTreeSet<&String> = index
            .iter()
            .filter(|(asset, _)| prefixes.iter().any(|p| asset.starts_with(p)))
            .map(|(_, bundle)| bundle)
            .collect();
        Ok(bundles.into_iter().cloned().collect())
    }

    /// Like [`bundles_for_prefixes`](Self::bundles_for_prefixes), restricted to bundles named
    /// in `changes`.
    pub fn changed_bundles_for_prefixes(&self, changes: &[ChangeEntry], prefixes: &[&str]) -> Result<Vec<String>, SyncError> {
        let changed: HashSet<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        Ok(self.bundles_for_prefixes(prefixes)?.into_iter().filter(|b| changed.contains(b.as_str())).collect())
    }

    /// Reads a decoded gamedata file of this version, e.g. `excel/item_table.json`.
    pub fn read_gamedata(&self, relative: &str) -> Result<serde_json::Value, SyncError> {
        let path = self.layout.gamedata_dir(self.res_version()).join(relative);
        let bytes = fsx::read(&path).map_err(|e| SyncError::io(e, &path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn gamedata_dir_exists(&self) -> bool {
        self.layout.gamedata_dir(self.res_version()).is_dir()
    }
}

/// The fixed set of job kinds shipped with the binary.
pub fn default_registry() -> Result<Registry<Arc<SyncContext>>, SyncError> {
    RegistryBuilder::new()
        .register("asset_index", 0, |ctx: &Arc<SyncContext>| Ok(AssetIndexJob::new(ctx.clone())))
        .register("game_data", 1, |ctx: &Arc<SyncContext>| Ok(GameDataJob::new(ctx.clone())))
        .register("item_demand", 2, |ctx: &Arc<SyncContext>| Ok(ItemDemandJob::new(ctx.clone())))
        .register("char_avatar", 3, |ctx: &Arc<SyncContext>| Ok(NamespaceExportJob::char_avatar(ctx.clone())))
        .register("item_icon", 3, |ctx: &Arc<SyncContext>| Ok(NamespaceExportJob::item_icon(ctx.clone())))
        .register("audio", 3, |ctx: &Arc<SyncContext>| Ok(NamespaceExportJob::audio(ctx.clone())))
        .build()
}
