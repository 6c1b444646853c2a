//! Document lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Uploaded, not yet indexed.
    Pending,
    /// Indexing in progress.
    Processing,
    /// At least one chunk indexed successfully.
    Completed,
    /// Indexing failed before any chunk succeeded.
    Failed,
}

impl DocumentStatus {
    /// Parses a status string (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Canonical lower-case string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A processed source artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Externally assigned id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Original file path.
    pub file_path: String,
    /// Monotonic version, starting at 1.
    pub version: u32,
    /// SHA-256 hex of the normalized text.
    pub content_hash: String,
    /// Processing status.
    pub status: DocumentStatus,
    /// When indexing last finished (successfully or not).
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Last indexing error, if the document is failed.
    pub error: Option<String>,
}

impl Document {
    /// Creates a pending document at version 1.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            file_path: file_path.into(),
            version: 1,
            content_hash: String::new(),
            status: DocumentStatus::Pending,
            last_processed_at: None,
            error: None,
        }
    }
}

/// Aggregated outcome of an indexing run, per-chunk failures included.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingReport {
    /// Document processed.
    pub document_id: String,
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Chunks whose extraction failed (logged and skipped).
    pub chunks_failed: usize,
    /// Entities extracted before resolution.
    pub entities_extracted: usize,
    /// Duplicate entities merged by the resolver.
    pub entities_merged: usize,
    /// Relationships written.
    pub relationships: usize,
    /// Claims written.
    pub claims: usize,
    /// Communities re-detected after this run.
    pub communities_updated: usize,
    /// Final document status.
    pub status: Option<DocumentStatus>,
}

/// Outcome of a document re-upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UpdateOutcome {
    /// Content hash matched; no graph work was performed and the version is
    /// unchanged.
    Unchanged {
        /// Current document version.
        version: u32,
    },
    /// Content changed; the document was re-indexed.
    Reindexed {
        /// New document version.
        version: u32,
        /// Report for the reindexing run.
        report: IndexingReport,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("unknown"), None);
    }
}
