//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite chunk database, applying required
//! pragmas (WAL mode), and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const CHUNK_DB_FILE_NAME: &str = "chunks.sqlite";

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Chunk store for a codebase.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct CodeIndex {
    pub(crate) conn: Connection,
}

impl CodeIndex {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open `chunks.sqlite` inside `dir`.
    pub async fn open_in_dir(dir: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open(dir.as_ref().join(CHUNK_DB_FILE_NAME)).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let index = CodeIndex::open_in_memory().await.unwrap();
        let version = index
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn test_open_in_dir_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        CodeIndex::open_in_dir(&target).await.unwrap();
        assert!(target.join("chunks.sqlite").exists());
    }
}
