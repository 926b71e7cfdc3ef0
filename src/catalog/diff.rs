use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{CatalogSnapshot, ContentHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One changed bundle between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChangeEntry {
    pub kind: ChangeKind,
    pub path: String,
}

impl ChangeEntry {
    pub fn new(kind: ChangeKind, path: impl Into<String>) -> Self {
        Self { kind, path: path.into() }
    }
}

fn unchanged(current: &ContentHash, previous: &ContentHash) -> bool {
    match (current, previous) {
        (ContentHash::Full(a), ContentHash::Full(b)) => a == b,
        // a placeholder never proves equality
        _ => false,
    }
}

/// Compares `current` against `previous` and lists every bundle that was created, updated or
/// deleted. With no `previous` every bundle in `current` is a `Create`.
///
/// Deletes and updates come first, in `previous` order, followed by creates in `current` order.
/// Each name appears at most once even if a snapshot lists it twice.
pub fn diff(current: &CatalogSnapshot, previous: Option<&CatalogSnapshot>) -> Vec<ChangeEntry> {
    let mut seen = HashSet::new();

    let Some(previous) = previous else {
        return current
            .ab_infos
            .iter()
            .filter(|info| seen.insert(info.name.as_str()))
            .map(|info| ChangeEntry::new(ChangeKind::Create, &info.name))
            .collect();
    };

    // first listing of a name wins
    let mut remaining: HashMap<&str, &ContentHash> = HashMap::with_capacity(current.ab_infos.len());
    for info in &current.ab_infos {
        remaining.entry(info.name.as_str()).or_insert(&info.content_hash);
    }
    let mut changes = Vec::new();

    for info in &previous.ab_infos {
        if !seen.insert(info.name.as_str()) {
            continue;
        }
        match remaining.remove(info.name.as_str()) {
            None => changes.push(ChangeEntry::new(ChangeKind::Delete, &info.name)),
            Some(hash) if !unchanged(hash, &info.content_hash) => changes.push(ChangeEntry::new(ChangeKind::Update, &info.name)),
            Some(_) => {}
        }
    }

    for info in &current.ab_infos {
        if remaining.remove(info.name.as_str()).is_some() {
            changes.push(ChangeEntry::new(ChangeKind::Create, &info.name));
        }
    }

    changes
}
