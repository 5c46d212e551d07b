//! Core types and shared functionality for anjin.
//!
//! This crate provides:
//! - Incremental sync of a source tree into a chunk store ([`sync`], [`store`])
//! - The write-once changelog artifact cache ([`artifact`])
//! - The concurrent per-package changelog pipeline and its collaborator traits ([`pipeline`])
//! - Version ordering, the changelog source registry, and usage snippets
//! - Unified error types and configuration

pub mod artifact;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod snippets;
pub mod sources;
pub mod store;
pub mod sync;
pub mod version;

pub use artifact::{ArtifactCache, CacheKey};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use pipeline::{
    ChangelogRequest, ChangelogRetriever, Collaborators, CollaboratorError, PackageSpec, Pipeline, RetrievalResult,
    RetrievalStatus, RunReport, SnippetSource, Summarizer, SummaryRequest, TaskOutcome, TaskState, VersionLookup,
};
pub use sources::{ChangelogSources, SourceDescriptor, SourceKind};
pub use store::{CodeIndex, ReconcilableStore};
pub use sync::{SyncEngine, SyncOptions, SyncReport, SyncRun};
