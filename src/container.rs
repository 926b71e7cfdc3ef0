//! Boundary to the game container-format reader.
//!
//! Parsing bundle files is delegated to an [`AssetContainer`] implementation; this crate only
//! needs the raw bytes of embedded assets by container path, plus typed fields of the few
//! scene objects it reads directly. Implementations are synchronous and are always called from
//! blocking worker threads.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetClass {
    TextAsset,
    Texture2D,
    Sprite,
    AudioClip,
    MonoBehaviour,
    Other(String),
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::TextAsset => f.write_str("TextAsset"),
            AssetClass::Texture2D => f.write_str("Texture2D"),
            AssetClass::Sprite => f.write_str("Sprite"),
            AssetClass::AudioClip => f.write_str("AudioClip"),
            AssetClass::MonoBehaviour => f.write_str("MonoBehaviour"),
            AssetClass::Other(name) => f.write_str(name),
        }
    }
}

/// One object inside a bundle, addressed by its container path.
#[derive(Debug, Clone)]
pub struct EmbeddedAsset {
    /// e.g. `dyn/gamedata/excel/item_table.bytes`
    pub container_path: String,
    /// The object's own name (`m_Name`).
    pub name: String,
    pub class: AssetClass,
    /// Suggested file extension for the raw payload, without the dot.
    pub extension: Option<String>,
    pub data: Vec<u8>,
}

pub trait AssetContainer: Send + Sync {
    /// Lists every embedded asset of the bundle file at `bundle`.
    fn embedded_assets(&self, bundle: &Path) -> Result<Vec<EmbeddedAsset>, SyncError>;

    /// Reads the typed fields of the object at `container_path` as JSON, if it exists.
    fn read_typetree(&self, bundle: &Path, container_path: &str) -> Result<Option<serde_json::Value>, SyncError>;
}

/// Stand-in used when no container reader is wired up. Every call fails, which fails only the
/// jobs that need one.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredContainer;

impl AssetContainer for UnconfiguredContainer {
    fn embedded_assets(&self, bundle: &Path) -> Result<Vec<EmbeddedAsset>, SyncError> {
        Err(SyncError::collaborator("asset container", format!("no container reader configured for {}", bundle.display())))
    }

    fn read_typetree(&self, bundle: &Path, _container_path: &str) -> Result<Option<serde_json::Value>, SyncError> {
        Err(SyncError::collaborator("asset container", format!("no container reader configured for {}", bundle.display())))
    }
}

/// Runs [`AssetContainer::embedded_assets`] on a blocking thread.
pub async fn embedded_assets(container: Arc<dyn AssetContainer>, bundle: PathBuf) -> Result<Vec<EmbeddedAsset>, SyncError> {
    tokio::task::spawn_blocking(move || container.embedded_assets(&bundle)).await?
}

/// Runs [`AssetContainer::read_typetree`] on a blocking thread.
pub async fn read_typetree(container: Arc<dyn AssetContainer>, bundle: PathBuf, container_path: String) -> Result<Option<serde_json::Value>, SyncError> {
    tokio::task::spawn_blocking(move || container.read_typetree(&bundle, &container_path)).await?
}
