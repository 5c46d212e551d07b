//! One scan → resolve → reconcile → save pass over a corpus.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::changeset::resolve;
use super::chunk::ChunkConfig;
use super::index::{IndexMap, PersistedCacheIndex};
use super::reconcile::Reconciler;
use super::scan::scan_corpus;
use crate::Error;
use crate::store::CodeIndex;

/// Switches for a single sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Ignore the persisted index; every scanned unit counts as added.
    pub clear_index: bool,
    /// Wipe the store before reconciling.
    pub clear_store: bool,
}

/// Counts and ids from one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
    pub unchanged: usize,
    pub chunks_written: usize,
}

impl SyncReport {
    pub fn changed(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Result of [`SyncEngine::sync`].
///
/// `report` is valid even when `persisted` is an error: the store was
/// reconciled, only the index file could not be written, so the affected
/// units will be picked up again next run.
#[derive(Debug)]
pub struct SyncRun {
    pub report: SyncReport,
    pub persisted: Result<(), Error>,
}

/// Keeps a [`CodeIndex`] in step with a source tree.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    root: PathBuf,
    extensions: Vec<String>,
    chunking: ChunkConfig,
    index: PersistedCacheIndex,
    store: CodeIndex,
}

impl SyncEngine {
    pub fn new(
        root: impl Into<PathBuf>, extensions: Vec<String>, chunking: ChunkConfig, index: PersistedCacheIndex,
        store: CodeIndex,
    ) -> Self {
        Self { root: root.into(), extensions, chunking, index, store }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &CodeIndex {
        &self.store
    }

    /// Units the store holds that neither the scan nor the index knows about.
    ///
    /// These are left behind when the index was lost or cleared while files
    /// were deleted. A listing failure only skips the cleanup.
    async fn orphaned_units(&self, scanned: &HashSet<String>, index: &IndexMap) -> Vec<String> {
        match self.store.unit_ids().await {
            Ok(ids) => ids.into_iter().filter(|id| !scanned.contains(id) && !index.contains_key(id)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list stored units; skipping orphan cleanup");
                Vec::new()
            }
        }
    }

    /// Run one pass.
    ///
    /// # Errors
    ///
    /// Fails only when the corpus cannot be scanned or `clear_store` cannot
    /// wipe the store. Per-unit failures end up in [`SyncReport::failed`].
    pub async fn sync(&self, options: SyncOptions) -> Result<SyncRun, Error> {
        let units = scan_corpus(&self.root, &self.extensions).await?;
        let scanned = units.len();

        if options.clear_store {
            let dropped = self.store.clear().await?;
            tracing::info!(dropped, "cleared chunk store");
        }

        let mut index = if options.clear_index {
            tracing::info!(path = %self.index.path().display(), "ignoring persisted index");
            IndexMap::new()
        } else {
            self.index.load().await
        };
        if options.clear_store && !options.clear_index {
            // Entries would otherwise claim content that is no longer stored.
            index.clear();
        }

        let scanned_ids: HashSet<String> = units.iter().map(|u| u.id.clone()).collect();
        let mut change_set = resolve(units, &index);
        change_set.removed.extend(self.orphaned_units(&scanned_ids, &index).await);
        change_set.removed.sort();
        let unchanged = scanned - change_set.added.len() - change_set.modified.len();
        tracing::info!(
            root = %self.root.display(),
            scanned,
            added = change_set.added.len(),
            modified = change_set.modified.len(),
            removed = change_set.removed.len(),
            "resolved change set"
        );

        let outcome = Reconciler::new(&self.store, self.chunking).apply(change_set, &mut index).await;
        let report = SyncReport {
            scanned,
            added: outcome.added,
            modified: outcome.modified,
            removed: outcome.removed,
            failed: outcome.failed,
            unchanged,
            chunks_written: outcome.chunks_written,
        };

        let persisted = self.index.save(&index).await;
        if let Err(e) = &persisted {
            tracing::error!(path = %self.index.path().display(), error = %e, "failed to persist index");
        }

        Ok(SyncRun { report, persisted })
    }
}
