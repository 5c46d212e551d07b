//! Changelog artifact cache.
//!
//! One JSON file per package under the cache directory, mapping
//! `"<fromVersion>_<toVersion>"` to the retrieved changelog text. A package's
//! file is read into memory on first access and rewritten whole on every
//! `set`. Entries are written at most once per key and never evicted.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::Error;
use crate::store::{ReconcilableStore, Selector, StoreItem};
use crate::sync::index::write_atomic;

type PackageEntries = BTreeMap<String, String>;

/// One package's entries; `None` until its file has been read.
type PackageSlot = Arc<RwLock<Option<PackageEntries>>>;

/// Composite cache key. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub package: String,
    pub from_version: String,
    pub to_version: String,
}

impl CacheKey {
    pub fn new(package: impl Into<String>, from_version: impl Into<String>, to_version: impl Into<String>) -> Self {
        Self { package: package.into(), from_version: from_version.into(), to_version: to_version.into() }
    }

    /// Key inside the package file.
    pub fn entry_key(&self) -> String {
        format!("{}_{}", self.from_version, self.to_version)
    }
}

/// File stem for a package; anything outside `[A-Za-z0-9._-]` becomes `_`.
fn file_stem(package: &str) -> String {
    let stem: String = package
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') { format!("_{stem}") } else { stem }
}

/// Write-once changelog cache shared by concurrently running tasks.
///
/// Each package has its own lock, held across that package's file write
/// only. The map of slots is locked just long enough to find a slot.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
    packages: Arc<Mutex<HashMap<String, PackageSlot>>>,
}

impl ArtifactCache {
    /// Cache rooted at `dir`. Nothing is read until a package is first touched.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), packages: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn package_path(&self, package: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(package)))
    }

    async fn read_package_file(&self, package: &str) -> PackageEntries {
        let path = self.package_path(package);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return PackageEntries::new(),
            Err(e) => {
                tracing::warn!(package, path = %path.display(), error = %e, "changelog cache unreadable; treating as empty");
                return PackageEntries::new();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(package, path = %path.display(), error = %e, "changelog cache corrupt; treating as empty");
            PackageEntries::new()
        })
    }

    async fn slot(&self, package: &str) -> PackageSlot {
        self.packages.lock().await.entry(package.to_string()).or_default().clone()
    }

    /// The package's slot, with its file read into memory.
    async fn loaded(&self, package: &str) -> PackageSlot {
        let slot = self.slot(package).await;
        let missing = slot.read().await.is_none();
        if missing {
            let mut guard = slot.write().await;
            if guard.is_none() {
                *guard = Some(self.read_package_file(package).await);
            }
        }
        slot
    }

    async fn lookup(&self, package: &str, entry_key: &str) -> Option<String> {
        let slot = self.loaded(package).await;
        let guard = slot.read().await;
        guard.as_ref().and_then(|entries| entries.get(entry_key).cloned())
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.lookup(&key.package, &key.entry_key()).await.is_some()
    }

    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        self.lookup(&key.package, &key.entry_key()).await
    }

    /// Store `text` under `key` and rewrite the package file.
    ///
    /// Returns `Ok(false)` without touching disk if the key is already present.
    pub async fn set(&self, key: &CacheKey, text: &str) -> Result<bool, Error> {
        self.insert_entry(&key.package, key.entry_key(), text.to_string()).await
    }

    async fn insert_entry(&self, package: &str, entry_key: String, text: String) -> Result<bool, Error> {
        let slot = self.loaded(package).await;
        let mut guard = slot.write().await;
        let entries = guard.get_or_insert_with(PackageEntries::new);
        if entries.contains_key(&entry_key) {
            tracing::debug!(package, key = %entry_key, "changelog already cached; keeping first write");
            return Ok(false);
        }

        let mut updated = entries.clone();
        updated.insert(entry_key.clone(), text);
        let bytes = serde_json::to_vec(&updated)?;
        write_atomic(&self.package_path(package), &bytes).await?;
        *entries = updated;

        tracing::debug!(package, key = %entry_key, "cached changelog");
        Ok(true)
    }

    /// Drop a package's file and its in-memory copy.
    pub async fn purge(&self, package: &str) -> Result<bool, Error> {
        let slot = self.slot(package).await;
        let mut guard = slot.write().await;
        *guard = None;
        let path = self.package_path(package);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::persist(path, e)),
        }
    }

    /// Cached `(entry key, text)` pairs for a package, ordered by key.
    pub async fn entries(&self, package: &str) -> Vec<(String, String)> {
        let slot = self.loaded(package).await;
        let guard = slot.read().await;
        guard
            .as_ref()
            .map(|entries| entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

/// Items are changelog texts: `id` is the entry key, `metadata.unit_id` the package.
#[async_trait]
impl ReconcilableStore for ArtifactCache {
    async fn add(&self, items: Vec<StoreItem>) -> Result<usize, Error> {
        let mut stored = 0;
        for item in items {
            if self.insert_entry(&item.metadata.unit_id, item.id, item.text).await? {
                stored += 1;
            }
        }
        Ok(stored)
    }

    async fn delete(&self, selector: &Selector) -> Result<(), Error> {
        match selector {
            Selector::Unit(package) => {
                self.purge(package).await?;
            }
        }
        Ok(())
    }

    /// Each query text is a package name; returns its cached changelogs.
    async fn query(&self, texts: &[String], k: usize) -> Result<Vec<Vec<String>>, Error> {
        let mut documents = Vec::with_capacity(texts.len());
        for package in texts {
            let texts = self.entries(package).await.into_iter().take(k).map(|(_, text)| text).collect();
            documents.push(texts);
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ItemMetadata;

    #[test]
    fn test_entry_key() {
        assert_eq!(CacheKey::new("requests", "2.31.0", "2.32.3").entry_key(), "2.31.0_2.32.3");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("google-auth"), "google-auth");
        assert_eq!(file_stem("../etc/passwd"), ".._etc_passwd");
        assert_eq!(file_stem(".."), "_..");
        assert_eq!(file_stem(""), "_");
    }

    #[tokio::test]
    async fn test_set_get_contains() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let key = CacheKey::new("ruff", "0.4.0", "0.5.0");

        assert!(!cache.contains(&key).await);
        assert!(cache.get(&key).await.is_none());

        assert!(cache.set(&key, "## 0.5.0\nfaster").await.unwrap());
        assert!(cache.contains(&key).await);
        assert_eq!(cache.get(&key).await.as_deref(), Some("## 0.5.0\nfaster"));
    }

    #[tokio::test]
    async fn test_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let key = CacheKey::new("ruff", "0.4.0", "0.5.0");

        assert!(cache.set(&key, "first").await.unwrap());
        assert!(!cache.set(&key, "second").await.unwrap());
        assert_eq!(cache.get(&key).await.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_file_layout_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        cache.set(&CacheKey::new("faker", "1.0", "2.0"), "a").await.unwrap();
        cache.set(&CacheKey::new("faker", "2.0", "3.0"), "b").await.unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(dir.path().join("faker.json")).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"1.0_2.0": "a", "2.0_3.0": "b"}));

        let reopened = ArtifactCache::new(dir.path());
        assert_eq!(reopened.get(&CacheKey::new("faker", "2.0", "3.0")).await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_corrupt_package_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alembic.json"), b"[1, 2").unwrap();
        std::fs::write(dir.path().join("fastapi.json"), br#"{"0.1_0.2": "ok"}"#).unwrap();

        let cache = ArtifactCache::new(dir.path());
        assert!(!cache.contains(&CacheKey::new("alembic", "1", "2")).await);
        assert!(cache.contains(&CacheKey::new("fastapi", "0.1", "0.2")).await);

        assert!(cache.set(&CacheKey::new("alembic", "1", "2"), "fresh").await.unwrap());
        let reopened = ArtifactCache::new(dir.path());
        assert_eq!(reopened.get(&CacheKey::new("alembic", "1", "2")).await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_store_interface() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let item = StoreItem {
            id: "1.0_1.1".into(),
            text: "notes".into(),
            metadata: ItemMetadata { unit_id: "cachetools".into(), sequence: 0 },
        };
        assert_eq!(cache.add(vec![item.clone()]).await.unwrap(), 1);
        assert_eq!(cache.add(vec![item]).await.unwrap(), 0);

        let docs = cache.query(&["cachetools".to_string(), "other".to_string()], 10).await.unwrap();
        assert_eq!(docs, vec![vec!["notes".to_string()], Vec::new()]);

        cache.delete(&Selector::unit("cachetools")).await.unwrap();
        assert!(!dir.path().join("cachetools.json").exists());
        assert!(!cache.contains(&CacheKey::new("cachetools", "1.0", "1.1")).await);
    }

    #[tokio::test]
    async fn test_package_lock_does_not_block_other_packages() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let other = CacheKey::new("fastapi", "0.1", "0.2");
        cache.set(&other, "ok").await.unwrap();

        let busy = cache.loaded("requests").await;
        let _writer = busy.write().await;

        let read = tokio::time::timeout(std::time::Duration::from_secs(1), cache.get(&other)).await;
        assert_eq!(read.unwrap().as_deref(), Some("ok"));
        let write = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            cache.set(&CacheKey::new("ruff", "0.4", "0.5"), "notes"),
        )
        .await;
        assert!(write.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_purge_then_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let key = CacheKey::new("alembic", "1.12", "1.13");
        cache.set(&key, "old").await.unwrap();

        assert!(cache.purge("alembic").await.unwrap());
        assert!(!cache.purge("alembic").await.unwrap());
        assert!(!cache.contains(&key).await);
        assert!(cache.set(&key, "new").await.unwrap());
        assert_eq!(cache.get(&key).await.as_deref(), Some("new"));
    }
}
