//! `SQLite` relational store: documents and historical query records.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::models::{Document, DocumentStatus, QueryRecord};
use crate::storage::traits::DocumentStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("document store mutex was poisoned, recovering");
            poisoned.into_inner()
        },
    }
}

fn db_err(operation: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::failed(operation, e.to_string())
}

fn utc_from_text(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// `SQLite`-backed relational store.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::failed("open_document_store", e.to_string()))?;
        }
        let conn = Connection::open(&db_path).map_err(db_err("open_document_store"))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open_document_store"))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                content_hash TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                last_processed_at TEXT,
                error TEXT
            );
            CREATE TABLE IF NOT EXISTS queries (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0.0,
                payload TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queries_created
                ON queries(created_at DESC);",
        )
        .map_err(db_err("initialize_document_store"))
    }

    fn map_document(row: &Row<'_>) -> rusqlite::Result<Document> {
        let status: String = row.get("status")?;
        let last_processed: Option<String> = row.get("last_processed_at")?;
        Ok(Document {
            id: row.get("id")?,
            name: row.get("name")?,
            file_path: row.get("file_path")?,
            version: row.get::<_, i64>("version")? as u32,
            content_hash: row.get("content_hash")?,
            status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Pending),
            last_processed_at: last_processed.as_deref().map(utc_from_text),
            error: row.get("error")?,
        })
    }

    fn map_query(row: &Row<'_>) -> rusqlite::Result<QueryRecord> {
        let payload: Option<String> = row.get("payload")?;
        let created_at: String = row.get("created_at")?;
        Ok(QueryRecord {
            id: row.get("id")?,
            kind: row.get("kind")?,
            question: row.get("question")?,
            answer: row.get("answer")?,
            confidence: row.get("confidence")?,
            payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
            created_at: utc_from_text(&created_at),
        })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn put_document(&self, document: &Document) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO documents
                (id, name, file_path, version, content_hash, status,
                 last_processed_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, file_path = excluded.file_path,
                version = excluded.version, content_hash = excluded.content_hash,
                status = excluded.status,
                last_processed_at = excluded.last_processed_at,
                error = excluded.error",
            params![
                document.id,
                document.name,
                document.file_path,
                i64::from(document.version),
                document.content_hash,
                document.status.as_str(),
                document.last_processed_at.map(|t| t.to_rfc3339()),
                document.error,
            ],
        )
        .map_err(db_err("put_document"))?;
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM documents WHERE id = ?1",
            params![id],
            Self::map_document,
        )
        .optional()
        .map_err(db_err("get_document"))
    }

    fn list_documents(&self) -> Result<Vec<Document>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM documents ORDER BY last_processed_at DESC, id ASC")
            .map_err(db_err("list_documents"))?;
        let rows = stmt
            .query_map([], Self::map_document)
            .map_err(db_err("list_documents"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("list_documents"))
    }

    fn set_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let updated = conn
            .execute(
                "UPDATE documents SET status = ?2, error = ?3 WHERE id = ?1",
                params![id, status.as_str(), error],
            )
            .map_err(db_err("set_document_status"))?;
        if updated == 0 {
            return Err(Error::NotFound {
                resource: "document".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let deleted = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(db_err("delete_document"))?;
        Ok(deleted > 0)
    }

    fn record_query(&self, record: &QueryRecord) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO queries
                (id, kind, question, answer, confidence, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.kind,
                record.question,
                record.answer,
                f64::from(record.confidence),
                record
                    .payload
                    .as_ref()
                    .and_then(|p| serde_json::to_string(p).ok()),
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("record_query"))?;
        Ok(())
    }

    fn recent_queries(&self, limit: usize) -> Result<Vec<QueryRecord>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM queries ORDER BY created_at DESC LIMIT ?1")
            .map_err(db_err("recent_queries"))?;
        let rows = stmt
            .query_map(params![limit as i64], Self::map_query)
            .map_err(db_err("recent_queries"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("recent_queries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_round_trip() {
        let store = SqliteDocumentStore::in_memory().expect("open");
        let mut doc = Document::new("doc-1", "notes.md", "/tmp/notes.md");
        doc.content_hash = "abc".to_string();
        store.put_document(&doc).expect("put");
        let loaded = store.get_document("doc-1").expect("get").expect("exists");
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.status, DocumentStatus::Pending);

        store
            .set_document_status("doc-1", DocumentStatus::Failed, Some("boom"))
            .expect("status");
        let failed = store.get_document("doc-1").expect("get").expect("exists");
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        assert!(store.delete_document("doc-1").expect("delete"));
        assert!(!store.delete_document("doc-1").expect("delete again"));
    }

    #[test]
    fn query_history_is_recorded_newest_first() {
        let store = SqliteDocumentStore::in_memory().expect("open");
        for (i, kind) in ["local", "tog"].iter().enumerate() {
            store
                .record_query(&QueryRecord {
                    id: format!("q{i}"),
                    kind: (*kind).to_string(),
                    question: "who?".to_string(),
                    answer: "them".to_string(),
                    confidence: 0.8,
                    payload: None,
                    created_at: Utc::now() + chrono::Duration::seconds(i as i64),
                })
                .expect("record");
        }
        let recent = store.recent_queries(10).expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "q1");
    }
}
