//! `SQLite` vector store.
//!
//! One row per chunk with the embedding as a little-endian f32 blob.
//! Similarity search is a full scan with cosine scoring in process, which is
//! fine at corpus scale; the chunk id is the primary key so re-embedding a
//! chunk overwrites its row.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::embedding::cosine_similarity;
use crate::storage::traits::{VectorHit, VectorStore};
use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("vector store mutex was poisoned, recovering");
            poisoned.into_inner()
        },
    }
}

fn db_err(operation: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::failed(operation, e.to_string())
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// `SQLite`-backed vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl SqliteVectorStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>, dimensions: usize) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::failed("open_vector_store", e.to_string()))?;
        }
        let conn = Connection::open(&db_path).map_err(db_err("open_vector_store"))?;
        let store = Self {
            conn: Mutex::new(conn),
            dimensions,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open_vector_store"))?;
        let store = Self {
            conn: Mutex::new(conn),
            dimensions,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunk_embeddings (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                text TEXT NOT NULL,
                start_char INTEGER NOT NULL,
                end_char INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunk_embeddings_document
                ON chunk_embeddings(document_id);",
        )
        .map_err(db_err("initialize_vector_store"))
    }
}

impl VectorStore for SqliteVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn upsert(
        &self,
        chunk_id: &str,
        document_id: &str,
        text: &str,
        start_char: usize,
        end_char: usize,
        embedding: &[f32],
    ) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(Error::InvalidInput(format!(
                "embedding dimension {} does not match store dimension {}",
                embedding.len(),
                self.dimensions
            )));
        }
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO chunk_embeddings
                (chunk_id, document_id, text, start_char, end_char, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id, text = excluded.text,
                start_char = excluded.start_char, end_char = excluded.end_char,
                embedding = excluded.embedding, created_at = excluded.created_at",
            params![
                chunk_id,
                document_id,
                text,
                start_char as i64,
                end_char as i64,
                embedding_to_blob(embedding),
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err("vector_upsert"))?;
        Ok(())
    }

    fn remove_document(&self, document_id: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "DELETE FROM chunk_embeddings WHERE document_id = ?1",
            params![document_id],
        )
        .map_err(db_err("vector_remove_document"))
    }

    fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<VectorHit>> {
        let filter: Option<HashSet<&str>> =
            document_ids.map(|docs| docs.iter().map(String::as_str).collect());
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT chunk_id, document_id, text, embedding FROM chunk_embeddings")
            .map_err(db_err("vector_search"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(db_err("vector_search"))?;

        let mut hits = Vec::new();
        for row in rows {
            let (chunk_id, document_id, text, blob) = row.map_err(db_err("vector_search"))?;
            if let Some(ref allowed) = filter {
                if !allowed.contains(document_id.as_str()) {
                    continue;
                }
            }
            let stored = blob_to_embedding(&blob);
            hits.push(VectorHit {
                score: cosine_similarity(embedding, &stored),
                chunk_id,
                document_id,
                text,
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn len(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .map_err(db_err("vector_len"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reembedding_overwrites_instead_of_duplicating() {
        let store = SqliteVectorStore::in_memory(4).expect("open");
        store
            .upsert("c1", "d1", "first", 0, 5, &[1.0, 0.0, 0.0, 0.0])
            .expect("first");
        store
            .upsert("c1", "d1", "second", 0, 6, &[0.0, 1.0, 0.0, 0.0])
            .expect("second");
        assert_eq!(store.len().expect("len"), 1);
        let hits = store
            .search(&[0.0, 1.0, 0.0, 0.0], 10, None)
            .expect("search");
        assert_eq!(hits[0].text, "second");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dimension_mismatch_is_invalid_input() {
        let store = SqliteVectorStore::in_memory(4).expect("open");
        assert!(matches!(
            store.upsert("c1", "d1", "x", 0, 1, &[1.0]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn document_filter_restricts_results() {
        let store = SqliteVectorStore::in_memory(2).expect("open");
        store.upsert("a", "d1", "a", 0, 1, &[1.0, 0.0]).expect("a");
        store.upsert("b", "d2", "b", 0, 1, &[1.0, 0.0]).expect("b");
        let hits = store
            .search(&[1.0, 0.0], 10, Some(&["d2".to_string()]))
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "b");
    }
}
