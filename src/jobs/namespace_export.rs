//! Raw export of one asset class from the bundles under a set of asset namespaces.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Job, SyncContext};
use crate::catalog::ChangeEntry;
use crate::container::{self, AssetClass, EmbeddedAsset};
use crate::error::SyncError;
use crate::fsx;

pub struct NamespaceExportJob {
    ctx: Arc<SyncContext>,
    name: &'static str,
    prefixes: &'static [&'static str],
    class: AssetClass,
    /// Container path prefix to strip when the export keeps the directory structure.
    /// `None` flattens exports to `<asset name>.<ext>`.
    container_root: Option<&'static str>,
    selected: Vec<String>,
}

impl NamespaceExportJob {
    pub fn new(ctx: Arc<SyncContext>, name: &'static str, prefixes: &'static [&'static str], class: AssetClass, container_root: Option<&'static str>) -> Self {
        Self { ctx, name, prefixes, class, container_root, selected: Vec::new() }
    }

    pub fn char_avatar(ctx: Arc<SyncContext>) -> Self {
        Self::new(ctx, "char_avatar", &["arts/charavatars"], AssetClass::Texture2D, None)
    }

    pub fn item_icon(ctx: Arc<SyncContext>) -> Self {
        Self::new(ctx, "item_icon", &["arts/items/icons", "activity/commonassets/[uc]items"], AssetClass::Sprite, None)
    }

    /// Only the `sound_beta_2` tree; exports keep its sub-directories.
    pub fn audio(ctx: Arc<SyncContext>) -> Self {
        Self::new(ctx, "audio", &["audio/sound_beta_2/"], AssetClass::AudioClip, Some("assets/torappu/dynamicassets/audio/sound_beta_2/"))
    }

    /// Bundles this job picked in its last [`check`](Job::check).
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    fn export_path(&self, asset: &EmbeddedAsset) -> PathBuf {
        let ext = asset.extension.as_deref().unwrap_or("bin");
        let relative = match self.container_root.and_then(|root| asset.container_path.strip_prefix(root)) {
            Some(rest) => {
                let rest = PathBuf::from(rest);
                if rest.extension().is_some() { rest } else { rest.with_extension(ext) }
            }
            None => PathBuf::from(format!("{}.{}", asset.name, ext)),
        };
        self.ctx.layout.raw_asset_dir(self.name).join(relative)
    }
}

#[async_trait]
impl Job for NamespaceExportJob {
    fn check(&mut self, changes: &[ChangeEntry]) -> Result<bool, SyncError> {
        self.selected = self.ctx.changed_bundles_for_prefixes(changes, self.prefixes)?;
        Ok(!self.selected.is_empty())
    }

    async fn start(&mut self) -> Result<(), SyncError> {
        let resolved = self.ctx.resolver.resolve_many(&self.selected).await?;
        let mut exported = 0usize;
        for (_, local) in resolved {
            let assets = container::embedded_assets(self.ctx.container.clone(), local).await?;
            let writes: Vec<(PathBuf, Vec<u8>)> =
                assets.into_iter().filter(|a| a.class == self.class).map(|a| (self.export_path(&a), a.data)).collect();
            exported += writes.len();
            tokio::task::spawn_blocking(move || {
                for (path, data) in writes {
                    fsx::write_atomic(&path, &data).map_err(|e| SyncError::io(e, &path))?;
                }
                Ok::<_, SyncError>(())
            })
            .await??;
        }
        tracing::info!(job = self.name, bundles = self.selected.len(), files = exported, "export finished");
        Ok(())
    }
}
