//! Vector store trait.
//!
//! One row per text unit, keyed by chunk id. Upserts are used during
//! incremental reindexing so a re-embedded chunk overwrites its row instead
//! of duplicating it.

use crate::Result;

/// A similarity search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Chunk id of the matching row.
    pub chunk_id: String,
    /// Owning document.
    pub document_id: String,
    /// Chunk text.
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Trait for embedding storage backends.
pub trait VectorStore: Send + Sync {
    /// The dimensionality of stored vectors.
    fn dimensions(&self) -> usize;

    /// Inserts or replaces the row for a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding dimension is wrong or the write
    /// fails.
    fn upsert(
        &self,
        chunk_id: &str,
        document_id: &str,
        text: &str,
        start_char: usize,
        end_char: usize,
        embedding: &[f32],
    ) -> Result<()>;

    /// Removes all rows of a document. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn remove_document(&self, document_id: &str) -> Result<usize>;

    /// Searches for the `limit` most similar rows, optionally restricted to
    /// the given documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<VectorHit>>;

    /// Number of stored rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn len(&self) -> Result<usize>;

    /// Whether the store is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
