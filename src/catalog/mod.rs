//! # Catalog Model
//!
//! Types for the published hot-update list ("HotUpdateInfo"), the diff engine that compares two
//! snapshots, and the local snapshot store.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod diff;
pub mod store;

pub use diff::{diff, ChangeEntry, ChangeKind};
pub use store::SnapshotStore;

/// Hashes of at most this many characters are freshness markers, not checksums.
pub const PLACEHOLDER_MAX_LEN: usize = 4;

/// The `md5` field of a catalog entry, classified once at load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentHash {
    /// A lowercase hex checksum of the bundle payload. Addresses the cache directly.
    Full(String),
    /// A short marker that changes when the bundle does but says nothing about its bytes.
    Placeholder(String),
}

impl ContentHash {
    pub fn classify(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.chars().count() <= PLACEHOLDER_MAX_LEN {
            ContentHash::Placeholder(raw)
        } else {
            ContentHash::Full(raw.to_ascii_lowercase())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentHash::Full(s) | ContentHash::Placeholder(s) => s,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ContentHash::Placeholder(_))
    }
}

impl Default for ContentHash {
    fn default() -> Self {
        ContentHash::Placeholder(String::new())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ContentHash::classify(raw))
    }
}

/// One entry in a catalog.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AssetBundleInfo {
    pub name: String,
    #[serde(rename = "md5")]
    pub content_hash: ContentHash,
    #[serde(rename = "totalSize")]
    pub size_total: u64,
    #[serde(rename = "abSize")]
    pub size_packed: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "thash")]
    pub type_hash: String,
    #[serde(rename = "pid")]
    pub pack_id: String,
    #[serde(rename = "cid")]
    pub code: i64,
}

/// Which on-wire revision a snapshot belongs to, and so how its asset index is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    /// Asset index lives in an embedded scene asset inside `torappu_index.ab`.
    Legacy,
    /// Asset index is a FlatBuffer resource manifest named by `manifestName`.
    Manifest,
}

/// A published catalog ("HotUpdateInfo").
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub version_id: String,
    pub full_pack: Option<AssetBundleInfo>,
    pub ab_infos: Vec<AssetBundleInfo>,
    pub pack_infos: Vec<AssetBundleInfo>,
    pub count_of_typed_res: Option<i64>,
    pub manifest_name: Option<String>,
}

impl CatalogSnapshot {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn format(&self) -> CatalogFormat {
        match self.manifest_name.as_deref() {
            Some(name) if !name.is_empty() => CatalogFormat::Manifest,
            _ => CatalogFormat::Legacy,
        }
    }

    /// Builds the `name -> entry` lookup table the resolver consults.
    pub fn lookup_table(&self) -> HashMap<String, AssetBundleInfo> {
        self.ab_infos.iter().map(|info| (info.name.clone(), info.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "fullPack": {"totalSize": 0, "abSize": 0, "type": "", "cid": -1},
        "versionId": "24-06-01-10-00-00-abcdef",
        "abInfos": [
            {"name": "torappu_index.ab", "hash": "ignored", "md5": "0123456789ABCDEF0123456789abcdef", "totalSize": 10, "abSize": 8, "cid": 3},
            {"name": "arts/charavatars/char_002.ab", "md5": "a1b2", "totalSize": 1, "abSize": 1, "thash": "t", "pid": "lpack_init", "cid": 4}
        ],
        "countOfTypedRes": 12
    }"#;

    #[test]
    fn parses_wire_shape_and_classifies_hashes() {
        let snapshot = CatalogSnapshot::from_slice(SAMPLE.as_bytes()).unwrap();
        assert_eq!(snapshot.version_id, "24-06-01-10-00-00-abcdef");
        assert_eq!(snapshot.ab_infos.len(), 2);
        assert_eq!(snapshot.ab_infos[0].content_hash, ContentHash::Full("0123456789abcdef0123456789abcdef".into()));
        assert_eq!(snapshot.ab_infos[1].content_hash, ContentHash::Placeholder("a1b2".into()));
        assert_eq!(snapshot.ab_infos[1].pack_id, "lpack_init");
        assert_eq!(snapshot.count_of_typed_res, Some(12));
        assert!(snapshot.pack_infos.is_empty());
        assert_eq!(snapshot.format(), CatalogFormat::Legacy);
    }

    #[test]
    fn manifest_name_selects_manifest_format() {
        let snapshot = CatalogSnapshot { manifest_name: Some("resource.manifest".into()), ..Default::default() };
        assert_eq!(snapshot.format(), CatalogFormat::Manifest);
        let blank = CatalogSnapshot { manifest_name: Some(String::new()), ..Default::default() };
        assert_eq!(blank.format(), CatalogFormat::Legacy);
    }

    #[test]
    fn hash_serializes_as_plain_string() {
        let info = AssetBundleInfo { name: "a.ab".into(), content_hash: ContentHash::classify("ff00ff00ff"), ..Default::default() };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["md5"], "ff00ff00ff");
    }
}
