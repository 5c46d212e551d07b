//! Persisted `unit id -> {contentHash, indexedAt}` map.
//!
//! Loaded once at the start of a run and rewritten whole at the end. The file
//! is never appended to mid-run; a write goes to a sibling temp file first and
//! is renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

const INDEX_FILE_NAME: &str = "index.json";

/// Hash of the content last reconciled into the store for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn now(content_hash: impl Into<String>) -> Self {
        Self { content_hash: content_hash.into(), indexed_at: Utc::now() }
    }
}

/// In-memory view of the persisted index.
pub type IndexMap = BTreeMap<String, IndexEntry>;

/// Location of the persisted index file.
#[derive(Debug, Clone)]
pub struct PersistedCacheIndex {
    path: PathBuf,
}

impl PersistedCacheIndex {
    /// Index stored as `index.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self { path: dir.as_ref().join(INDEX_FILE_NAME) }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the index. A missing file is an empty index; an unreadable or
    /// malformed one is logged and also treated as empty, forcing a full
    /// re-index.
    pub async fn load(&self) -> IndexMap {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return IndexMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "index unreadable; starting from empty index");
                return IndexMap::new();
            }
        };

        match serde_json::from_slice::<IndexMap>(&bytes) {
            Ok(map) => {
                tracing::debug!(path = %self.path.display(), entries = map.len(), "loaded index");
                map
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "index corrupt; starting from empty index");
                IndexMap::new()
            }
        }
    }

    /// Overwrite the index file with `map`.
    pub async fn save(&self, map: &IndexMap) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(map)?;
        write_atomic(&self.path, &bytes).await?;
        tracing::debug!(path = %self.path.display(), entries = map.len(), "saved index");
        Ok(())
    }
}

/// Write through a temp file and rename, so readers never see a torn file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| Error::persist(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(|e| Error::persist(&tmp, e))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| Error::persist(path, e))?;
    Ok(())
}
