//! Unified error types for anjin.
//!
//! Per-unit and per-package failures never surface through this type; they are
//! caught at the unit/task boundary and folded into reports. These errors are
//! what a caller sees when a whole step (open, load, save) cannot proceed.

use std::path::PathBuf;

use tokio_rusqlite::rusqlite;

/// Unified error types for the anjin core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., overlap not smaller than chunk size).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Filesystem failure outside of persisting state.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure.
    #[error("JSON_ERROR: {0}")]
    Json(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// External store rejected an add/delete while reconciling a unit.
    #[error("RECONCILE_FAILED: {unit_id}: {reason}")]
    Reconcile { unit_id: String, reason: String },

    /// Writing persisted state (index file, artifact cache file) failed.
    #[error("PERSIST_FAILED: {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persist { path: path.into(), source }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Reconcile { unit_id: "src/app.py".into(), reason: "store offline".into() };
        assert!(err.to_string().contains("RECONCILE_FAILED"));
        assert!(err.to_string().contains("src/app.py"));
    }

    #[test]
    fn test_persist_error_keeps_path() {
        let err = Error::persist("/tmp/index.json", std::io::Error::other("disk full"));
        let msg = err.to_string();
        assert!(msg.starts_with("PERSIST_FAILED"));
        assert!(msg.contains("/tmp/index.json"));
        assert!(msg.contains("disk full"));
    }
}
