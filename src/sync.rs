//! One sync run: load catalogs, diff, prime the resolver, run the scheduler.

use std::sync::Arc;

use crate::catalog::{diff, CatalogSnapshot, ChangeEntry, SnapshotStore};
use crate::common::{StorageLayout, Version};
use crate::config::SyncConfig;
use crate::container::AssetContainer;
use crate::error::SyncError;
use crate::fetch::CdnClient;
use crate::flatc::FlatcRunner;
use crate::jobs::SyncContext;
use crate::resolver::Resolver;
use crate::workers::{JobFilter, Registry, RunReport, Scheduler};

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub version: Version,
    pub previous: Option<Version>,
    pub filter: JobFilter,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// The target equals the previous version; nothing was loaded.
    Unchanged,
    Completed { changes: Vec<ChangeEntry>, report: RunReport },
}

/// Loads the current snapshot and, when given, the previous one. Either failing is fatal.
pub async fn load_catalogs(
    layout: &StorageLayout,
    cdn: &CdnClient,
    res_version: &str,
    previous_res: Option<&str>,
) -> Result<(CatalogSnapshot, Option<CatalogSnapshot>), SyncError> {
    let store = SnapshotStore::new(layout, cdn);
    let current = store.load(res_version).await?;
    let previous = match previous_res {
        Some(prev) => Some(store.load(prev).await?),
        None => None,
    };
    Ok((current, previous))
}

/// Loads both catalogs and returns the change list between them.
pub async fn compute_changes(config: &SyncConfig, res_version: &str, previous_res: Option<&str>) -> Result<Vec<ChangeEntry>, SyncError> {
    let layout = StorageLayout::new(&config.storage_dir);
    let cdn = CdnClient::new(config)?;
    let (current, previous) = load_catalogs(&layout, &cdn, res_version, previous_res).await?;
    Ok(diff(&current, previous.as_ref()))
}

pub async fn run_sync(
    config: &SyncConfig,
    request: &SyncRequest,
    container: Arc<dyn AssetContainer>,
    registry: Registry<Arc<SyncContext>>,
) -> Result<SyncOutcome, SyncError> {
    if request.previous.as_ref() == Some(&request.version) {
        tracing::info!(version = %request.version, "version did not change, skipping run");
        return Ok(SyncOutcome::Unchanged);
    }

    let layout = StorageLayout::new(&config.storage_dir);
    let cdn = CdnClient::new(config)?;
    let res_version = request.version.res_version.clone();
    let previous_res = request.previous.as_ref().map(|v| v.res_version.as_str());

    let (current, previous) = load_catalogs(&layout, &cdn, &res_version, previous_res).await.map_err(|e| {
        tracing::error!("failed to load catalogs: {e}");
        e
    })?;
    let changes = diff(&current, previous.as_ref());
    tracing::info!(version = %request.version, changes = changes.len(), "catalog diff computed");

    let resolver = Arc::new(Resolver::new(&res_version, &current, layout.clone(), cdn, config.max_concurrent_downloads));
    let ctx = Arc::new(SyncContext::new(
        request.version.clone(),
        Arc::new(current),
        resolver,
        container,
        FlatcRunner::new(&config.flatc_path, &config.fbs_dir),
        layout,
    ));

    let report = Scheduler::new(registry).run(&ctx, &changes, &request.filter).await;
    for failed in report.failed() {
        tracing::warn!(job = %failed.name, "{}", failed.outcome);
    }
    tracing::info!(completed = report.completed(), "sync finished");
    Ok(SyncOutcome::Completed { changes, report })
}
