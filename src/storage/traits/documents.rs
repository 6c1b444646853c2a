//! Relational store trait: documents and historical query records.

use crate::Result;
use crate::models::{Document, DocumentStatus, QueryRecord};

/// Trait for the relational backend.
pub trait DocumentStore: Send + Sync {
    /// Inserts or replaces a document row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_document(&self, document: &Document) -> Result<()>;

    /// Retrieves a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Lists all documents, newest version churn first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_documents(&self) -> Result<Vec<Document>>;

    /// Updates only the status (and optional error message) of a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is missing or the write fails.
    fn set_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Deletes a document row. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn delete_document(&self, id: &str) -> Result<bool>;

    /// Appends a historical query record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn record_query(&self, record: &QueryRecord) -> Result<()>;

    /// Most recent query records, capped at `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn recent_queries(&self, limit: usize) -> Result<Vec<QueryRecord>>;
}
