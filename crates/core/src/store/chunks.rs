//! Chunk CRUD and lexical query for [`CodeIndex`].

use async_trait::async_trait;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::params_from_iter;

use super::connection::CodeIndex;
use super::{ReconcilableStore, Selector, StoreItem};
use crate::Error;

/// Lowercased query terms; single characters carry no signal.
fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn score(text: &str, terms: &[String]) -> usize {
    let lower = text.to_lowercase();
    terms.iter().map(|t| lower.matches(t.as_str()).count()).sum()
}

impl CodeIndex {
    /// Insert chunks in one transaction. Existing `(unit_id, chunk_hash)`
    /// rows are left as they are.
    pub async fn insert_items(&self, items: Vec<StoreItem>) -> Result<usize, Error> {
        let indexed_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO chunks (unit_id, chunk_hash, sequence, text, indexed_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        ON CONFLICT(unit_id, chunk_hash) DO NOTHING",
                    )?;
                    for item in &items {
                        inserted += stmt.execute(params![
                            &item.metadata.unit_id,
                            &item.id,
                            item.metadata.sequence as i64,
                            &item.text,
                            &indexed_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every chunk of a unit. Returns the number of deleted rows.
    pub async fn delete_unit(&self, unit_id: &str) -> Result<u64, Error> {
        let unit_id = unit_id.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM chunks WHERE unit_id = ?1", params![unit_id])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Chunk texts of a unit in sequence order.
    pub async fn unit_chunks(&self, unit_id: &str) -> Result<Vec<String>, Error> {
        let unit_id = unit_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT text FROM chunks WHERE unit_id = ?1 ORDER BY sequence ASC")?;
                let rows = stmt.query_map(params![unit_id], |row| row.get(0))?;
                Ok(rows.collect::<Result<Vec<String>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Distinct unit ids that have chunks, sorted.
    pub async fn unit_ids(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT DISTINCT unit_id FROM chunks ORDER BY unit_id")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<Result<Vec<String>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Total number of stored chunks.
    pub async fn chunk_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop every chunk. Returns the number of deleted rows.
    pub async fn clear(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM chunks", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Chunks containing any term of `text`, ranked by term occurrences.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<String>, Error> {
        let terms = query_terms(text);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let predicate = (1..=terms.len())
            .map(|i| format!("instr(lower(text), ?{i}) > 0"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!("SELECT text FROM chunks WHERE {predicate} ORDER BY unit_id, sequence");

        let bind = terms.clone();
        let candidates = self
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(bind.iter()), |row| row.get(0))?;
                Ok(rows.collect::<Result<Vec<String>, _>>()?)
            })
            .await
            .map_err(Error::from)?;

        let mut ranked: Vec<(usize, String)> = candidates.into_iter().map(|t| (score(&t, &terms), t)).collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(ranked.into_iter().take(k).map(|(_, t)| t).collect())
    }
}

#[async_trait]
impl ReconcilableStore for CodeIndex {
    async fn add(&self, items: Vec<StoreItem>) -> Result<usize, Error> {
        let attempted = items.len();
        let inserted = self.insert_items(items).await?;
        tracing::debug!(attempted, inserted, "added chunks");
        Ok(inserted)
    }

    async fn delete(&self, selector: &Selector) -> Result<(), Error> {
        match selector {
            Selector::Unit(unit_id) => {
                let deleted = self.delete_unit(unit_id).await?;
                tracing::debug!(unit = %unit_id, deleted, "deleted chunks");
            }
        }
        Ok(())
    }

    async fn query(&self, texts: &[String], k: usize) -> Result<Vec<Vec<String>>, Error> {
        let mut documents = Vec::with_capacity(texts.len());
        for text in texts {
            documents.push(self.search(text, k).await?);
        }
        Ok(documents)
    }
}
