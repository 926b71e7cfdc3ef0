//! Common utilities and types module.
// Version identity, the on-disk storage layout and URL escaping.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identifies one published catalog snapshot. Equality is structural.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub res_version: String,
    pub client_version: String,
}

impl Version {
    pub fn new(client_version: impl Into<String>, res_version: impl Into<String>) -> Self {
        Self { res_version: res_version.into(), client_version: client_version.into() }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client_version, self.res_version)
    }
}

/// Paths under the storage root.
///
/// ```text
/// storage/
///   hot_update_list/<res_version>      verbatim catalog snapshots
///   assetbundle/<hash-or-checksum>     content-addressed bundle cache
///   asset/gamedata/<res_version>/...   decoded gamedata, plus `latest` symlink
///   asset/raw/<job>/...                raw embedded asset exports
///   asset/derived/...                  computed outputs
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hot_update_list_dir(&self) -> PathBuf {
        self.root.join("hot_update_list")
    }

    pub fn snapshot_path(&self, res_version: &str) -> PathBuf {
        self.hot_update_list_dir().join(res_version)
    }

    pub fn assetbundle_dir(&self) -> PathBuf {
        self.root.join("assetbundle")
    }

    /// Joins `key` onto the bundle cache directory. Callers check [`is_cache_key`] first.
    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.assetbundle_dir().join(key)
    }

    pub fn gamedata_root(&self) -> PathBuf {
        self.root.join("asset").join("gamedata")
    }

    pub fn gamedata_dir(&self, res_version: &str) -> PathBuf {
        self.gamedata_root().join(res_version)
    }

    pub fn raw_asset_dir(&self, job: &str) -> PathBuf {
        self.root.join("asset").join("raw").join(job)
    }

    pub fn derived_dir(&self) -> PathBuf {
        self.root.join("asset").join("derived")
    }
}

/// Escapes a bundle path into the object name the CDN serves it under:
/// `\` becomes `/`, then `/` becomes `_`, then `#` becomes `__`.
/// A cache file name is a non-empty lowercase hex digest and nothing else.
pub fn is_cache_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub fn path_to_url(path: &str) -> String {
    path.replace('\\', "/").replace('/', "_").replace('#', "__")
}
