//! # Graphlore
//!
//! Knowledge-graph construction and multi-hop question answering over
//! Markdown corpora.
//!
//! Graphlore indexes documents into an entity/relationship/claim graph with
//! hierarchical community summaries, then answers questions through three
//! engines: entity-anchored local search, map-reduce global search over
//! community summaries, and bounded multi-hop tree search with LLM-guided
//! pruning.
//!
//! ## Features
//!
//! - Token-aware chunking with configurable size and overlap
//! - LLM-driven joint entity/relationship/claim extraction with gleaning
//! - Fuzzy + LLM-assisted entity deduplication
//! - Hierarchical Leiden community detection with incremental updates
//! - Local, global (map-reduce), and multi-hop ToG query engines
//! - SQLite-backed graph, vector, and document stores behind traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use graphlore::indexing::IndexingPipeline;
//!
//! let pipeline = IndexingPipeline::new(config, stores, llm, embedder);
//! let report = pipeline.index_document("doc-001", "notes.md", markdown)?;
//! println!("{} chunks, {} entities", report.chunks, report.entities_extracted);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod community;
pub mod config;
pub mod embedding;
pub mod indexing;
pub mod llm;
pub mod models;
pub mod query;
pub mod storage;

// Re-exports for convenience
pub use config::GraphloreConfig;
pub use embedding::Embedder;
pub use llm::LlmProvider;
pub use models::{
    Claim, ClaimStatus, Community, Document, DocumentStatus, Entity, EntityId, EntityType,
    Relationship, TextUnit,
};
pub use storage::{DocumentStore, GraphStore, VectorStore};

/// Error type for graphlore operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Unknown document id, malformed query, invalid enum value |
/// | `Configuration` | Missing API key, unknown model, bad store path |
/// | `Transient` | LLM/embedder/store timeout, 5xx, rate-limit response |
/// | `Parse` | Malformed LLM output that cannot be recovered |
/// | `NotFound` | Lookup of a document, entity, or community that does not exist |
/// | `OperationFailed` | Database errors, filesystem I/O, non-transient backend faults |
///
/// Only `Transient` errors are retried; the retry budget lives in
/// [`llm::ResilientLlm`] and the embedder client.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided by the caller. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The system is misconfigured (missing credentials, unknown model).
    /// Never retried; surfaced immediately.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A backend failed in a way that is expected to heal (timeout, 5xx,
    /// rate limiting). Retried with exponential backoff up to the budget.
    #[error("transient failure in '{operation}': {cause}")]
    Transient {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An LLM response could not be parsed into the expected structure.
    /// The offending record is discarded; partial results are retained.
    #[error("parse failure in '{operation}': {cause}")]
    Parse {
        /// The operation whose output failed to parse.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A referenced resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// The resource kind (document, entity, community).
        resource: String,
        /// The identifier that missed.
        id: String,
    },

    /// An operation failed for a non-transient reason.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Whether the retry layer should attempt this operation again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Convenience constructor for transient backend failures.
    pub fn transient(operation: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            cause: cause.into(),
        }
    }

    /// Convenience constructor for non-transient operation failures.
    pub fn failed(operation: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.into(),
        }
    }
}

/// Result type alias for graphlore operations.
pub type Result<T> = std::result::Result<T, Error>;
