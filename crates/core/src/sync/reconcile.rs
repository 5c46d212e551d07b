//! Drive a [`ReconcilableStore`] from a [`ChangeSet`].

use super::changeset::{ChangeSet, Unit};
use super::chunk::{ChunkConfig, chunk_unit};
use super::index::{IndexEntry, IndexMap};
use crate::Error;
use crate::store::{ReconcilableStore, Selector, StoreItem};

/// What one `apply` pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    /// Units whose store operation failed; their index entries were not touched.
    pub failed: Vec<String>,
    pub chunks_written: usize,
}

/// Applies change sets to one store, keeping the index in step.
pub struct Reconciler<'a, S: ReconcilableStore + ?Sized> {
    store: &'a S,
    chunking: ChunkConfig,
}

impl<'a, S: ReconcilableStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, chunking: ChunkConfig) -> Self {
        Self { store, chunking }
    }

    /// Removals first, then modifications, then additions. Modified and
    /// added units alike have their old items deleted before new ones go in.
    ///
    /// A unit's index entry changes only after its store operations succeed.
    /// Failures are logged and collected; the remaining units still run.
    pub async fn apply(&self, change_set: ChangeSet, index: &mut IndexMap) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for unit_id in change_set.removed {
            match self.remove(&unit_id).await {
                Ok(()) => {
                    index.remove(&unit_id);
                    outcome.removed.push(unit_id);
                }
                Err(e) => {
                    tracing::warn!(unit = %unit_id, error = %e, "failed to remove unit; will retry next run");
                    outcome.failed.push(unit_id);
                }
            }
        }

        for unit in change_set.modified {
            match self.replace(&unit).await {
                Ok(written) => {
                    outcome.chunks_written += written;
                    index.insert(unit.id.clone(), IndexEntry::now(&unit.content_hash));
                    outcome.modified.push(unit.id);
                }
                Err(e) => {
                    tracing::warn!(unit = %unit.id, error = %e, "failed to re-index unit; will retry next run");
                    outcome.failed.push(unit.id);
                }
            }
        }

        // Added units may still have items in the store when the index was lost.
        for unit in change_set.added {
            match self.replace(&unit).await {
                Ok(written) => {
                    outcome.chunks_written += written;
                    index.insert(unit.id.clone(), IndexEntry::now(&unit.content_hash));
                    outcome.added.push(unit.id);
                }
                Err(e) => {
                    tracing::warn!(unit = %unit.id, error = %e, "failed to index unit; will retry next run");
                    outcome.failed.push(unit.id);
                }
            }
        }

        tracing::debug!(
            added = outcome.added.len(),
            modified = outcome.modified.len(),
            removed = outcome.removed.len(),
            failed = outcome.failed.len(),
            "reconciled change set"
        );
        outcome
    }

    async fn remove(&self, unit_id: &str) -> Result<(), Error> {
        self.store
            .delete(&Selector::unit(unit_id))
            .await
            .map_err(|e| Error::Reconcile { unit_id: unit_id.to_string(), reason: e.to_string() })
    }

    /// Replace a unit's items. Returns the number of items the store kept.
    async fn replace(&self, unit: &Unit) -> Result<usize, Error> {
        self.remove(&unit.id).await?;
        let items: Vec<StoreItem> =
            chunk_unit(&unit.id, &unit.payload, self.chunking).into_iter().map(StoreItem::from).collect();
        self.store.add(items).await.map_err(|e| Error::Reconcile { unit_id: unit.id.clone(), reason: e.to_string() })
    }
}
