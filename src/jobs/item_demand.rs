//! Per-item material demand across all operators, derived from the decoded excel tables.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{Job, SyncContext};
use crate::catalog::ChangeEntry;
use crate::error::SyncError;
use crate::fsx;

pub const EXCEL_PREFIX: &str = "gamedata/excel";
pub const OUTPUT_FILE: &str = "item_demand.json";
const AMIYA_GUARD: &str = "char_1001_amiya2";

/// Display names of the operator classes, appended to patch characters' names.
pub const PROFESSIONS: &[(&str, &str)] = &[
    ("PIONEER", "先锋"),
    ("WARRIOR", "近卫"),
    ("SNIPER", "狙击"),
    ("SUPPORT", "辅助"),
    ("CASTER", "术师"),
    ("SPECIAL", "特种"),
    ("MEDIC", "医疗"),
    ("TANK", "重装"),
];

fn profession_name(profession: &str) -> &str {
    PROFESSIONS.iter().find(|(key, _)| *key == profession).map(|(_, name)| *name).unwrap_or(profession)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CharDemand {
    pub rarity: i64,
    pub name: String,
    pub profession: String,
    pub elite: i64,
    pub skill: i64,
    pub uniequip: i64,
    pub mastery: Vec<i64>,
}

impl CharDemand {
    fn new(detail: &Value, skill_count: usize) -> Self {
        let rarity = match detail.get("rarity") {
            Some(Value::String(tier)) => tier.trim_start_matches("TIER_").parse().unwrap_or(0),
            Some(other) => other.as_i64().unwrap_or(0),
            None => 0,
        };
        Self {
            rarity,
            name: str_field(detail, "name").to_string(),
            profession: str_field(detail, "profession").to_string(),
            elite: 0,
            skill: 0,
            uniequip: 0,
            mastery: vec![0; skill_count],
        }
    }

    /// An operator without mastery slots never counts as empty.
    fn is_empty(&self) -> bool {
        self.elite == 0 && self.skill == 0 && self.uniequip == 0 && !self.mastery.is_empty() && self.mastery.iter().all(|m| *m == 0)
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default()
}

/// Item name to operator to demand, both levels in first-seen order.
#[derive(Debug, Default)]
pub struct ItemDemand {
    items: Vec<(String, Vec<(String, CharDemand)>)>,
    by_item: HashMap<String, usize>,
}

impl ItemDemand {
    fn entry(&mut self, item: &str, char_id: &str, detail: &Value, skill_count: usize) -> &mut CharDemand {
        let idx = match self.by_item.get(item) {
            Some(idx) => *idx,
            None => {
                self.items.push((item.to_string(), Vec::new()));
                self.by_item.insert(item.to_string(), self.items.len() - 1);
                self.items.len() - 1
            }
        };
        let chars = &mut self.items[idx].1;
        let pos = match chars.iter().position(|(id, _)| id == char_id) {
            Some(pos) => pos,
            None => {
                chars.push((char_id.to_string(), CharDemand::new(detail, skill_count)));
                chars.len() - 1
            }
        };
        &mut chars[pos].1
    }

    pub fn get(&self, item: &str, char_id: &str) -> Option<&CharDemand> {
        let idx = *self.by_item.get(item)?;
        self.items[idx].1.iter().find(|(id, _)| id == char_id).map(|(_, d)| d)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Drops all-zero operator entries. Items stay listed even when no operator is left.
    fn prune(&mut self) {
        for (_, chars) in &mut self.items {
            chars.retain(|(_, demand)| !demand.is_empty());
        }
    }

    pub fn to_value(&self) -> Result<Value, SyncError> {
        let mut out = serde_json::Map::new();
        for (item, chars) in &self.items {
            let mut per_char = serde_json::Map::new();
            for (char_id, demand) in chars {
                per_char.insert(char_id.clone(), serde_json::to_value(demand)?);
            }
            out.insert(item.clone(), Value::Object(per_char));
        }
        Ok(Value::Object(out))
    }
}

struct Tables<'a> {
    items: &'a serde_json::Map<String, Value>,
}

impl Tables<'_> {
    fn item_name<'b>(&'b self, id: &'b str) -> &'b str {
        self.items.get(id).and_then(|item| item.get("name")).and_then(Value::as_str).unwrap_or(id)
    }
}

/// Computes demand from `character_table`, `item_table`, `char_patch_table` and
/// `uniequip_table`.
///
/// Patch characters join the roster with their class appended to the name. Traps and tokens
/// are skipped. Amiya's alternate form never accrues promotion cost. Mastery cost is indexed by
/// position among skills that have mastery data. Only `MATERIAL` module costs count.
/// Operators whose demand for an item is all zero are dropped; the item itself stays.
pub fn compute(character_table: &Value, item_table: &Value, char_patch_table: &Value, uniequip_table: &Value) -> Result<ItemDemand, SyncError> {
    let mut characters = character_table
        .as_object()
        .cloned()
        .ok_or_else(|| SyncError::CorruptStream("character_table is not an object".into()))?;
    let items = item_table
        .get("items")
        .and_then(Value::as_object)
        .ok_or_else(|| SyncError::CorruptStream("item_table has no items".into()))?;
    let tables = Tables { items };

    if let Some(patches) = char_patch_table.get("patchChars").and_then(Value::as_object) {
        for (char_id, detail) in patches {
            let mut detail = detail.clone();
            let suffix = format!("({})", profession_name(str_field(&detail, "profession")));
            if let Some(Value::String(name)) = detail.get_mut("name") {
                name.push_str(&suffix);
            }
            characters.insert(char_id.clone(), detail);
        }
    }

    let mut demand = ItemDemand::default();
    for (char_id, detail) in &characters {
        let profession = str_field(detail, "profession");
        if profession == "TRAP" || profession == "TOKEN" {
            continue;
        }
        let skills = detail.get("skills");
        let skill_count = match skills {
            None => 3,
            Some(v) => v.as_array().map_or(0, Vec::len),
        };

        for phase in array(detail, "phases") {
            for cost in array(phase, "evolveCost") {
                let entry = demand.entry(tables.item_name(str_field(cost, "id")), char_id, detail, skill_count);
                if char_id == AMIYA_GUARD {
                    entry.elite = 0;
                    continue;
                }
                entry.elite += cost.get("count").and_then(Value::as_i64).unwrap_or(0);
            }
        }

        let skill_list = array(detail, "skills");
        if skill_list.is_empty() {
            continue;
        }

        for level_up in array(detail, "allSkillLvlup") {
            for cost in array(level_up, "lvlUpCost") {
                let entry = demand.entry(tables.item_name(str_field(cost, "id")), char_id, detail, skill_list.len());
                entry.skill += cost.get("count").and_then(Value::as_i64).unwrap_or(0);
            }
        }

        let mut index = 0usize;
        for skill in skill_list {
            let conditions = array(skill, "levelUpCostCond");
            if conditions.is_empty() {
                continue;
            }
            for condition in conditions {
                for cost in array(condition, "levelUpCost") {
                    let entry = demand.entry(tables.item_name(str_field(cost, "id")), char_id, detail, skill_list.len());
                    if let Some(slot) = entry.mastery.get_mut(index) {
                        *slot += cost.get("count").and_then(Value::as_i64).unwrap_or(0);
                    }
                }
            }
            index += 1;
        }
    }

    if let Some(equips) = uniequip_table.get("equipDict").and_then(Value::as_object) {
        for (equip_id, equip) in equips {
            let Some(cost_levels) = equip.get("itemCost").and_then(Value::as_object) else {
                continue;
            };
            let char_id = str_field(equip, "charId");
            let Some(detail) = characters.get(char_id) else {
                tracing::warn!(equip = %equip_id, char_id, "module for unknown operator");
                continue;
            };
            let skill_count = array(detail, "skills").len();
            for cost in cost_levels.values().filter_map(Value::as_array).flatten() {
                if str_field(cost, "type") != "MATERIAL" {
                    continue;
                }
                let entry = demand.entry(tables.item_name(str_field(cost, "id")), char_id, detail, skill_count);
                entry.uniequip += cost.get("count").and_then(Value::as_i64).unwrap_or(0);
            }
        }
    }

    demand.prune();
    Ok(demand)
}

pub struct ItemDemandJob {
    ctx: Arc<SyncContext>,
}

impl ItemDemandJob {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Job for ItemDemandJob {
    fn check(&mut self, changes: &[ChangeEntry]) -> Result<bool, SyncError> {
        Ok(!self.ctx.changed_bundles_for_prefixes(changes, &[EXCEL_PREFIX])?.is_empty())
    }

    async fn start(&mut self) -> Result<(), SyncError> {
        let ctx = self.ctx.clone();
        let (path, items) = tokio::task::spawn_blocking(move || {
            let demand = compute(
                &ctx.read_gamedata("excel/character_table.json")?,
                &ctx.read_gamedata("excel/item_table.json")?,
                &ctx.read_gamedata("excel/char_patch_table.json")?,
                &ctx.read_gamedata("excel/uniequip_table.json")?,
            )?;
            let path = ctx.layout.derived_dir().join(OUTPUT_FILE);
            let bytes = serde_json::to_vec(&demand.to_value()?)?;
            fsx::write_atomic(&path, &bytes).map_err(|e| SyncError::io(e, &path))?;
            Ok::<_, SyncError>((path, demand.item_count()))
        })
        .await??;
        tracing::info!(items, path = %path.display(), "item demand written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items() -> Value {
        json!({"items": {
            "30011": {"name": "源岩"},
            "3301": {"name": "技巧概要·卷1"},
            "mod_unlock_token": {"name": "模组数据块"},
            "4001": {"name": "龙门币"}
        }})
    }

    #[test]
    fn counts_every_cost_source() {
        let characters = json!({
            "char_002_amiya": {
                "name": "阿米娅", "rarity": "TIER_5", "profession": "CASTER",
                "phases": [{"evolveCost": null}, {"evolveCost": [{"id": "30011", "count": 3}]}],
                "skills": [
                    {"levelUpCostCond": []},
                    {"levelUpCostCond": [{"levelUpCost": [{"id": "30011", "count": 2}]}, {"levelUpCost": [{"id": "30011", "count": 1}]}]}
                ],
                "allSkillLvlup": [{"lvlUpCost": [{"id": "3301", "count": 4}]}, {"lvlUpCost": null}]
            },
            "trap_001": {"name": "trap", "rarity": "TIER_1", "profession": "TRAP", "phases": [{"evolveCost": [{"id": "30011", "count": 99}]}], "skills": []}
        });
        let uniequip = json!({"equipDict": {
            "uniequip_002_amiya": {"charId": "char_002_amiya", "itemCost": {"1": [{"id": "30011", "count": 5, "type": "MATERIAL"}, {"id": "4001", "count": 1000, "type": "GOLD"}]}}
        }});

        let demand = compute(&characters, &items(), &json!({"patchChars": {}}), &uniequip).unwrap();
        let rock = demand.get("源岩", "char_002_amiya").unwrap();
        assert_eq!(rock.rarity, 5);
        assert_eq!(rock.elite, 3);
        // the first skill has no mastery data, so the second one lands in slot 0
        assert_eq!(rock.mastery, vec![3, 0]);
        assert_eq!(rock.uniequip, 5);
        assert_eq!(demand.get("技巧概要·卷1", "char_002_amiya").unwrap().skill, 4);
        assert!(demand.get("龙门币", "char_002_amiya").is_none());
        assert!(demand.get("源岩", "trap_001").is_none());
    }

    #[test]
    fn patch_chars_get_class_suffix_and_amiya_guard_drops_elite() {
        let characters = json!({});
        let patches = json!({"patchChars": {
            "char_1001_amiya2": {
                "name": "阿米娅", "rarity": "TIER_5", "profession": "WARRIOR",
                "phases": [{"evolveCost": [{"id": "30011", "count": 3}]}],
                "skills": [{"levelUpCostCond": [{"levelUpCost": [{"id": "3301", "count": 1}]}]}],
                "allSkillLvlup": []
            }
        }});
        let demand = compute(&characters, &items(), &patches, &json!({"equipDict": {}})).unwrap();
        // elite forced to zero, so the rock entry is pruned but the item stays listed
        assert!(demand.get("源岩", "char_1001_amiya2").is_none());
        let manual = demand.get("技巧概要·卷1", "char_1001_amiya2").unwrap();
        assert_eq!(manual.name, "阿米娅(近卫)");
        assert_eq!(manual.mastery, vec![1]);
        assert_eq!(demand.item_count(), 2);
        assert_eq!(demand.to_value().unwrap()["源岩"], json!({}));
    }

    #[test]
    fn zero_demand_without_mastery_slots_is_kept() {
        let characters = json!({"char_2": {"name": "B", "rarity": 1, "profession": "MEDIC", "phases": [{"evolveCost": [{"id": "30011", "count": 0}]}], "skills": []}});
        let demand = compute(&characters, &items(), &json!({}), &json!({})).unwrap();
        let rock = demand.get("源岩", "char_2").unwrap();
        assert_eq!((rock.elite, rock.skill, rock.uniequip), (0, 0, 0));
        assert!(rock.mastery.is_empty());
    }

    #[test]
    fn output_shape() {
        let characters = json!({"char_1": {"name": "A", "rarity": 2, "profession": "TANK", "phases": [{"evolveCost": [{"id": "30011", "count": 1}]}], "skills": []}});
        let demand = compute(&characters, &items(), &json!({}), &json!({})).unwrap();
        assert_eq!(
            demand.to_value().unwrap(),
            json!({"源岩": {"char_1": {"rarity": 2, "name": "A", "profession": "TANK", "elite": 1, "skill": 0, "uniequip": 0, "mastery": []}}})
        );
    }
}
