//! Decodes gamedata `TextAsset`s into `storage/asset/gamedata/<res_version>/`.
//!
//! Each asset is routed by its container path:
//! 1. FlatBuffer tables go through `flatc`.
//! 2. Encrypted tables go through AES-CBC and BSON.
//! 3. Everything else is BSON or JSON text, re-serialized compactly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;

use super::{Job, SyncContext};
use crate::catalog::ChangeEntry;
use crate::container::{self, AssetClass, EmbeddedAsset};
use crate::crypto;
use crate::error::SyncError;
use crate::fsx;

pub const GAMEDATA_PREFIX: &str = "gamedata";
const CONTAINER_PREFIX: &str = "dyn/gamedata/";

const FLATBUFFER_TABLES: &[&str] = &[
    // excel
    "activity_table",
    "audio_data",
    "battle_equip_table",
    "building_data",
    "campaign_table",
    "chapter_table",
    "char_master_table",
    "char_meta_table",
    "char_patch_table",
    "character_table",
    "charm_table",
    "charword_table",
    "checkin_table",
    "climb_tower_table",
    "clue_data",
    "crisis_table",
    "crisis_v2_table",
    "display_meta_table",
    "enemy_handbook_table",
    "favor_table",
    "gacha_table",
    "gamedata_const",
    "handbook_info_table",
    "handbook_team_table",
    "hotupdate_meta_table",
    "init_text",
    "item_table",
    "main_text",
    "medal_table",
    "meta_ui_table",
    "mission_table",
    "open_server_table",
    "replicate_table",
    "retro_table",
    "roguelike_topic_table",
    "sandbox_perm_table",
    "shop_client_table",
    "skill_table",
    "skin_table",
    "special_operator_table",
    "stage_table",
    "story_review_meta_table",
    "story_review_table",
    "story_table",
    "tip_table",
    "token_table",
    "uniequip_table",
    "zone_table",
    // battle
    "cooperate_battle_table",
    "ep_breakbuff_table",
    "extra_battlelog_table",
    "legion_mode_buff_table",
    // building
    "building_local_data",
];

/// Path fragment to schema name, checked in order.
const FLATBUFFER_MAPPINGS: &[(&str, &str)] = &[
    ("gamedata/levels/enemydata/enemy_database", "enemy_database"),
    ("gamedata/levels/", "prts___levels"),
    ("gamedata/buff_table", "buff_table"),
];

const ENCRYPTED_MARKERS: &[&str] = &["[uc]lua", "gamedata/excel", "gamedata/battle"];
const PLAINTEXTS: &[&str] = &["levels/levels_meta.json", "data_version.txt"];
const SIGNED_MARKERS: &[&str] = &["excel", "_table", "[uc]lua"];
const BUFF_TEMPLATE: &str = "buff_template_data";

/// How one gamedata asset is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoding {
    FlatBuffer { schema: &'static str },
    Encrypted { signed: bool },
    /// `bson` selects BSON over JSON text; `signed` strips the signature before BSON.
    Plain { bson: bool, signed: bool },
}

fn is_plaintext(path: &str) -> bool {
    PLAINTEXTS.iter().any(|p| path.contains(p))
}

pub fn classify(path: &str) -> Decoding {
    if !is_plaintext(path) {
        let schema = FLATBUFFER_TABLES
            .iter()
            .copied()
            .find(|table| path.contains(table))
            .or_else(|| FLATBUFFER_MAPPINGS.iter().find(|(prefix, _)| path.contains(prefix)).map(|(_, schema)| *schema));
        if let Some(schema) = schema {
            return Decoding::FlatBuffer { schema };
        }
        if ENCRYPTED_MARKERS.iter().any(|m| path.contains(m)) && !path.contains(BUFF_TEMPLATE) {
            return Decoding::Encrypted { signed: SIGNED_MARKERS.iter().any(|m| path.contains(m)) };
        }
    }
    let buff_template = path.contains(BUFF_TEMPLATE);
    Decoding::Plain { bson: buff_template || path.contains("gamedata/levels"), signed: !buff_template }
}

fn relative_path(container_path: &str) -> String {
    container_path.replace(CONTAINER_PREFIX, "")
}

fn replace_suffix(path: &str, suffix: &str, with: &str) -> Option<String> {
    path.strip_suffix(suffix).map(|stem| format!("{}{}", stem, with))
}

/// Where a decoded asset is written, relative to the version's gamedata directory.
pub fn output_path(asset: &EmbeddedAsset, decoding: &Decoding) -> PathBuf {
    let relative = relative_path(&asset.container_path);
    match decoding {
        Decoding::FlatBuffer { schema } => {
            let parent = Path::new(&relative).parent().map(Path::to_path_buf).unwrap_or_default();
            parent.join(format!("{}.json", schema))
        }
        Decoding::Encrypted { .. } => {
            if relative.ends_with(".lua.bytes") {
                let parent = Path::new(&relative).parent().map(Path::to_path_buf).unwrap_or_default();
                parent.join(&asset.name)
            } else {
                PathBuf::from(replace_suffix(&relative, ".bytes", ".json").unwrap_or(relative))
            }
        }
        Decoding::Plain { .. } => PathBuf::from(
            replace_suffix(&relative, ".lua.bytes", ".lua")
                .or_else(|| replace_suffix(&relative, ".bytes", ".json"))
                .unwrap_or(relative),
        ),
    }
}

/// Inlines the base64 BSON payloads of `activity_table.dynActs`.
pub fn expand_dyn_acts(table: &mut Value) {
    let Some(acts) = table.get_mut("dynActs").and_then(Value::as_object_mut) else {
        return;
    };
    for (key, act) in acts.iter_mut() {
        let Some(encoded) = act.get("base64").and_then(Value::as_str) else {
            continue;
        };
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| e.to_string())
            .and_then(|bytes| crypto::document_to_value(&bytes).map_err(|e| e.to_string()));
        match decoded {
            Ok(value) => *act = value,
            Err(e) => tracing::warn!(act = %key, "dynActs payload left encoded: {e}"),
        }
    }
}

/// Decodes a non-FlatBuffer asset into the bytes to write.
pub fn decode_local(asset: &EmbeddedAsset, decoding: &Decoding) -> Result<Vec<u8>, SyncError> {
    match decoding {
        Decoding::FlatBuffer { .. } => Err(SyncError::Other("FlatBuffer tables are decoded by flatc".into())),
        Decoding::Encrypted { signed } => {
            let plain = crypto::decrypt_payload(&asset.data, *signed)?;
            Ok(match crypto::document_to_json(&plain) {
                Ok(json) => json.into_bytes(),
                Err(_) => plain,
            })
        }
        Decoding::Plain { bson: true, signed } => {
            let decoded = crypto::strip_signature(&asset.data, *signed).and_then(crypto::document_to_json);
            Ok(decoded.map(String::into_bytes).unwrap_or_else(|_| asset.data.clone()))
        }
        Decoding::Plain { bson: false, .. } => {
            let compact = serde_json::from_slice::<Value>(&asset.data).ok().and_then(|v| serde_json::to_vec(&v).ok());
            Ok(compact.unwrap_or_else(|| asset.data.clone()))
        }
    }
}

pub struct GameDataJob {
    ctx: Arc<SyncContext>,
    bundles: Vec<String>,
}

impl GameDataJob {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx, bundles: Vec::new() }
    }

    async fn unpack_asset(&self, out_dir: &Path, asset: EmbeddedAsset) -> Result<(), SyncError> {
        let decoding = classify(&asset.container_path);
        let destination = out_dir.join(output_path(&asset, &decoding));

        let bytes = match &decoding {
            Decoding::FlatBuffer { schema } => {
                let body = crypto::strip_signature(&asset.data, true)?.to_vec();
                let mut table = self.ctx.flatc.decode(schema, body).await?;
                if *schema == "activity_table" {
                    expand_dyn_acts(&mut table);
                }
                serde_json::to_vec(&table)?
            }
            _ => {
                let decoding = decoding.clone();
                tokio::task::spawn_blocking(move || decode_local(&asset, &decoding)).await??
            }
        };

        let path = destination.clone();
        tokio::task::spawn_blocking(move || fsx::write_atomic(&path, &bytes).map_err(|e| SyncError::io(e, &path))).await??;
        tracing::debug!(path = %destination.display(), "gamedata written");
        Ok(())
    }
}

#[async_trait]
impl Job for GameDataJob {
    fn check(&mut self, changes: &[ChangeEntry]) -> Result<bool, SyncError> {
        self.bundles = if self.ctx.gamedata_dir_exists() {
            self.ctx.changed_bundles_for_prefixes(changes, &[GAMEDATA_PREFIX])?
        } else {
            self.ctx.bundles_for_prefixes(&[GAMEDATA_PREFIX])?
        };
        Ok(!self.bundles.is_empty())
    }

    async fn start(&mut self) -> Result<(), SyncError> {
        // a partial re-decode would mix versions, so every gamedata bundle is unpacked
        let bundles = self.ctx.bundles_for_prefixes(&[GAMEDATA_PREFIX])?;
        let resolved = self.ctx.resolver.resolve_many(&bundles).await?;
        let out_dir = self.ctx.layout.gamedata_dir(self.ctx.res_version());

        let mut written = 0usize;
        for (bundle, local) in resolved {
            let assets = container::embedded_assets(self.ctx.container.clone(), local).await?;
            for asset in assets.into_iter().filter(|a| a.class == AssetClass::TextAsset) {
                let container_path = asset.container_path.clone();
                self.unpack_asset(&out_dir, asset).await.map_err(|e| {
                    tracing::error!(bundle = %bundle, asset = %container_path, "gamedata decode failed");
                    e
                })?;
                written += 1;
            }
        }

        let link = self.ctx.layout.gamedata_root().join("latest");
        let target = PathBuf::from(format!("./{}", self.ctx.res_version()));
        fsx::point_latest(&link, &target).map_err(|e| SyncError::io(e, &link))?;
        tracing::info!(bundles = bundles.len(), files = written, "gamedata decoded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_asset(container_path: &str, name: &str) -> EmbeddedAsset {
        EmbeddedAsset { container_path: container_path.into(), name: name.into(), class: AssetClass::TextAsset, extension: None, data: Vec::new() }
    }

    #[test]
    fn decision_table() {
        assert_eq!(classify("dyn/gamedata/excel/item_table.bytes"), Decoding::FlatBuffer { schema: "item_table" });
        assert_eq!(classify("dyn/gamedata/levels/enemydata/enemy_database.bytes"), Decoding::FlatBuffer { schema: "enemy_database" });
        assert_eq!(classify("dyn/gamedata/levels/obt/main/level_main_01-01.bytes"), Decoding::FlatBuffer { schema: "prts___levels" });
        assert_eq!(classify("dyn/gamedata/excel/data_version.txt"), Decoding::Plain { bson: false, signed: true });
        assert_eq!(classify("dyn/gamedata/excel/roguelike_table.bytes"), Decoding::Encrypted { signed: true });
        assert_eq!(classify("dyn/gamedata/battle/buff_template_data.bytes"), Decoding::Plain { bson: true, signed: false });
        assert_eq!(classify("dyn/gamedata/[uc]lua/hotfix.lua.bytes"), Decoding::Encrypted { signed: true });
        assert_eq!(classify("dyn/gamedata/levels/levels_meta.json"), Decoding::Plain { bson: true, signed: true });
        assert_eq!(classify("dyn/gamedata/story/obt/main/x.txt"), Decoding::Plain { bson: false, signed: true });
    }

    #[test]
    fn output_paths() {
        let table = text_asset("dyn/gamedata/excel/item_table.bytes", "item_table");
        assert_eq!(output_path(&table, &classify(&table.container_path)), Path::new("excel/item_table.json"));

        let lua = text_asset("dyn/gamedata/[uc]lua/feature/hotfix.lua.bytes", "hotfix.lua");
        assert_eq!(output_path(&lua, &Decoding::Encrypted { signed: true }), Path::new("[uc]lua/feature/hotfix.lua"));
        assert_eq!(output_path(&lua, &Decoding::Plain { bson: false, signed: true }), Path::new("[uc]lua/feature/hotfix.lua"));

        let enc = text_asset("dyn/gamedata/excel/roguelike_table.bytes", "roguelike_table");
        assert_eq!(output_path(&enc, &Decoding::Encrypted { signed: true }), Path::new("excel/roguelike_table.json"));

        let txt = text_asset("dyn/gamedata/excel/data_version.txt", "data_version");
        assert_eq!(output_path(&txt, &classify(&txt.container_path)), Path::new("excel/data_version.txt"));
    }

    #[test]
    fn plain_json_is_compacted_and_text_kept() {
        let mut asset = text_asset("dyn/gamedata/story/a.json", "a");
        asset.data = b"{ \"b\" : 1,\n  \"a\": [1, 2] }".to_vec();
        assert_eq!(decode_local(&asset, &classify(&asset.container_path)).unwrap(), br#"{"b":1,"a":[1,2]}"#);

        asset.data = b"plain text".to_vec();
        assert_eq!(decode_local(&asset, &classify(&asset.container_path)).unwrap(), b"plain text");
    }

    #[test]
    fn dyn_acts_are_inlined() {
        let doc = bson::doc! { "type": "act1" };
        let mut raw = Vec::new();
        doc.to_writer(&mut raw).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);

        let mut table = serde_json::json!({"dynActs": {"a": {"base64": encoded}, "b": {"kept": true}, "c": {"base64": "!!"}}});
        expand_dyn_acts(&mut table);
        assert_eq!(table["dynActs"]["a"], serde_json::json!({"type": "act1"}));
        assert_eq!(table["dynActs"]["b"], serde_json::json!({"kept": true}));
        assert_eq!(table["dynActs"]["c"]["base64"], "!!");
    }
}
