//! Classify a fresh scan against the persisted index.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::hash::{content_hash, normalize};
use super::index::IndexMap;

/// One tracked item of the corpus, discovered fresh on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    /// Normalized payload; the text that gets hashed and chunked.
    pub payload: String,
    pub content_hash: String,
}

impl Unit {
    /// Build a unit from raw content, normalizing before hashing.
    pub fn from_raw(id: impl Into<String>, raw: &str) -> Self {
        let payload = normalize(raw);
        let content_hash = content_hash(&payload);
        Self { id: id.into(), payload, content_hash }
    }
}

/// Units that need work this run. Unchanged units appear in none of the buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<Unit>,
    pub modified: Vec<Unit>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Compare `units` with `index`.
///
/// Unknown id goes to `added`, known id with a different hash to `modified`,
/// and any indexed id missing from the scan to `removed`. A duplicated id in
/// `units` is classified once, on its first occurrence.
pub fn resolve(units: Vec<Unit>, index: &IndexMap) -> ChangeSet {
    let mut change_set = ChangeSet::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(units.len());

    for unit in units {
        if !seen.insert(unit.id.clone()) {
            tracing::warn!(unit = %unit.id, "duplicate unit id in scan; keeping first");
            continue;
        }
        match index.get(&unit.id) {
            None => change_set.added.push(unit),
            Some(entry) if entry.content_hash != unit.content_hash => change_set.modified.push(unit),
            Some(_) => {}
        }
    }

    change_set.removed = index.keys().filter(|id| !seen.contains(*id)).cloned().collect();

    tracing::debug!(
        added = change_set.added.len(),
        modified = change_set.modified.len(),
        removed = change_set.removed.len(),
        unchanged = seen.len() - change_set.added.len() - change_set.modified.len(),
        "resolved change set"
    );

    change_set
}
