//! Incremental synchronization of a corpus into a [`crate::store::ReconcilableStore`].
//!
//! A run scans the corpus into [`Unit`]s, compares their content hashes with
//! the [`PersistedCacheIndex`], and reconciles only what changed:
//!
//! 1. [`scan_corpus`] reads and hashes every matching file
//! 2. [`resolve`] splits units into added, modified and removed
//! 3. [`Reconciler::apply`] chunks and writes changed units, deletes removed ones
//! 4. the index is saved whole
//!
//! [`SyncEngine`] strings these together for a [`crate::store::CodeIndex`].

pub mod changeset;
pub mod chunk;
pub mod engine;
pub mod hash;
pub mod index;
pub mod reconcile;
pub mod scan;

pub use changeset::{ChangeSet, Unit, resolve};
pub use chunk::{Chunk, ChunkConfig, chunk_text, chunk_unit};
pub use engine::{SyncEngine, SyncOptions, SyncReport, SyncRun};
pub use hash::{content_hash, normalize};
pub use index::{IndexEntry, IndexMap, PersistedCacheIndex};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use scan::{list_files, scan_corpus};
