//! Stores reconciled against a change set.
//!
//! [`ReconcilableStore`] is the seam between the sync engine and whatever
//! holds derived content. Two implementations ship with the crate:
//!
//! - [`CodeIndex`]: SQLite-backed chunk store for a codebase
//! - [`crate::artifact::ArtifactCache`]: per-package changelog text

pub mod connection;
pub mod migrations;
pub mod chunks;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::sync::Chunk;

pub use connection::CodeIndex;

/// One record handed to [`ReconcilableStore::add`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreItem {
    /// Content-derived key; adding the same id twice for a unit is a no-op.
    pub id: String,
    pub text: String,
    pub metadata: ItemMetadata,
}

/// Attribution carried with every stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub unit_id: String,
    #[serde(default)]
    pub sequence: usize,
}

impl From<Chunk> for StoreItem {
    fn from(chunk: Chunk) -> Self {
        Self {
            id: chunk.chunk_hash,
            text: chunk.text,
            metadata: ItemMetadata { unit_id: chunk.unit_id, sequence: chunk.sequence },
        }
    }
}

/// Which items a delete applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every item attributed to this unit.
    Unit(String),
}

impl Selector {
    pub fn unit(unit_id: impl Into<String>) -> Self {
        Selector::Unit(unit_id.into())
    }
}

/// External content store driven by add/delete.
#[async_trait]
pub trait ReconcilableStore: Send + Sync {
    /// Upsert items. Re-adding an existing `(unit, id)` pair changes nothing.
    ///
    /// Returns how many items were newly stored.
    async fn add(&self, items: Vec<StoreItem>) -> Result<usize, Error>;

    /// Remove every item matching `selector`. Deleting nothing is not an error.
    async fn delete(&self, selector: &Selector) -> Result<(), Error>;

    /// Up to `k` documents per query text, best match first.
    async fn query(&self, texts: &[String], k: usize) -> Result<Vec<Vec<String>>, Error>;
}
