//! Indexer pipeline.
//!
//! Write path per document: chunk, embed, extract (with gleaning), resolve
//! duplicates, write graph data, re-detect communities, summarize. Chunks are
//! processed strictly in sequence under the shared LLM rate limiter; a
//! failing chunk is logged and skipped, and the document completes as long as
//! at least one chunk survives.
//!
//! [`IndexingPipeline::update_document`] is the incremental controller: a
//! content-hash short-circuit, a scoped graph cascade, reindex, incremental
//! community detection seeded by the affected neighborhood, and
//! resummarization of changed communities only.

pub mod chunker;
pub mod extractor;
pub mod resolver;
pub mod writer;

pub use chunker::{Chunker, count_tokens};
pub use extractor::{ChunkExtraction, Extractor};
pub use resolver::{Resolver, best_fuzzy_match, name_similarity};
pub use writer::GraphWriter;

use crate::community::{CommunityDetector, CommunitySummarizer};
use crate::config::GraphloreConfig;
use crate::embedding::Embedder;
use crate::llm::LlmProvider;
use crate::models::{
    Document, DocumentStatus, EntityId, IndexingReport, UpdateOutcome,
};
use crate::storage::{DocumentStore, GraphDeletionStats, GraphStore, VectorStore};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

/// Names offered to the extraction prompt as already-known entities.
const KNOWN_ENTITY_BUDGET: usize = 100;

/// SHA-256 hex of the normalized document text (CRLF folded to LF).
#[must_use]
pub fn content_hash(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// The indexer pipeline and incremental update controller.
pub struct IndexingPipeline {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    extractor: Extractor,
    resolver: Resolver,
    writer: GraphWriter,
    detector: CommunityDetector,
    summarizer: CommunitySummarizer,
}

impl IndexingPipeline {
    /// Wires the pipeline. `llm` is expected to already be wrapped in the
    /// shared rate-limit/retry layer so every stage draws from one budget.
    #[must_use]
    pub fn new(
        config: GraphloreConfig,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let chunker = Chunker::new(config.chunking.clone());
        let extractor = Extractor::new(Arc::clone(&llm), config.extraction.clone());
        let resolver = Resolver::new(
            config.resolution.clone(),
            config.resolution.llm_resolution.then(|| Arc::clone(&llm)),
        );
        let writer = GraphWriter::new(Arc::clone(&graph));
        let detector = CommunityDetector::new(config.community.clone());
        let summarizer = CommunitySummarizer::new(Arc::clone(&llm));
        Self {
            graph,
            vectors,
            documents,
            embedder,
            chunker,
            extractor,
            resolver,
            writer,
            detector,
            summarizer,
        }
    }

    /// Indexes a new document (or the first version of one).
    ///
    /// # Errors
    ///
    /// Returns an error on store failures; per-chunk extraction failures are
    /// absorbed into the report.
    pub fn index_document(
        &self,
        document_id: &str,
        name: &str,
        file_path: &str,
        text: &str,
    ) -> Result<IndexingReport> {
        let mut document = match self.documents.get_document(document_id)? {
            Some(existing) => existing,
            None => Document::new(document_id, name, file_path),
        };
        document.status = DocumentStatus::Processing;
        self.documents.put_document(&document)?;

        let outcome = self.index_content(document_id, text);
        self.finish_document(&mut document, text, outcome, true)
    }

    /// Re-uploads a document: hash short-circuit, cascade, reindex,
    /// incremental community detection, scoped resummarization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown document id, and store
    /// errors otherwise.
    pub fn update_document(&self, document_id: &str, text: &str) -> Result<UpdateOutcome> {
        self.update_inner(document_id, text, false)
    }

    /// Reprocesses a document from its stored file path. `force_full` skips
    /// the content-hash short-circuit.
    ///
    /// # Errors
    ///
    /// Returns an error if the document or its file is missing.
    pub fn reprocess_document(&self, document_id: &str, force_full: bool) -> Result<UpdateOutcome> {
        let document = self.require_document(document_id)?;
        let text = std::fs::read_to_string(&document.file_path).map_err(|e| {
            Error::failed(
                "reprocess_document",
                format!("cannot read {}: {e}", document.file_path),
            )
        })?;
        self.update_inner(document_id, &text, force_full)
    }

    /// Deletes a document: graph cascade, vector rows, relational row, and a
    /// prune of any community left empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown document id.
    pub fn delete_document(&self, document_id: &str) -> Result<GraphDeletionStats> {
        self.require_document(document_id)?;
        let stats = self.writer.delete_document_graph_data(document_id)?;
        self.vectors.remove_document(document_id)?;
        self.documents.delete_document(document_id)?;
        let pruned = self.graph.prune_empty_communities()?;
        tracing::info!(
            document = document_id,
            ?stats,
            pruned,
            "document deleted"
        );
        Ok(stats)
    }

    /// Triggers full community detection plus summarization of communities
    /// without a report yet. Exposed for the maintenance surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn detect_and_summarize(&self) -> Result<usize> {
        let detection = self.detector.run_full(self.graph.as_ref())?;
        self.summarize_unsummarized()?;
        Ok(detection.communities)
    }

    /// Summarizes every community that has no report yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn summarize_unsummarized(&self) -> Result<usize> {
        let targets: Vec<(i64, u32)> = self
            .graph
            .list_communities(None)?
            .into_iter()
            .filter(|c| c.summary_timestamp.is_none())
            .map(|c| (c.id, c.level))
            .collect();
        let stats = self.summarizer.summarize_targets(self.graph.as_ref(), &targets)?;
        Ok(stats.summarized)
    }

    fn update_inner(
        &self,
        document_id: &str,
        text: &str,
        force_full: bool,
    ) -> Result<UpdateOutcome> {
        let mut document = self.require_document(document_id)?;

        let new_hash = content_hash(text);
        if !force_full && new_hash == document.content_hash {
            tracing::info!(document = document_id, "content unchanged, skipping reindex");
            return Ok(UpdateOutcome::Unchanged {
                version: document.version,
            });
        }

        document.status = DocumentStatus::Processing;
        document.version += 1;
        self.documents.put_document(&document)?;

        // Communities touched by this document before the cascade; their
        // former members seed incremental detection.
        let prior_entities = self.graph.entities_mentioned_by(document_id)?;
        let affected_communities = self.graph.communities_of_entities(&prior_entities)?;
        let mut seed: HashSet<EntityId> = HashSet::new();
        for (community_id, level) in &affected_communities {
            for member in self
                .graph
                .community_members(*community_id, *level, 10_000)?
            {
                seed.insert(member.id);
            }
        }

        self.writer.delete_document_graph_data(document_id)?;
        self.vectors.remove_document(document_id)?;

        let outcome = self.index_content(document_id, text);
        let touched = outcome.as_ref().map(|(_, t)| t.clone()).unwrap_or_default();
        let report = self.finish_document(&mut document, text, outcome, false)?;

        // Seed = union of former community members still present and the
        // entities this reindex created or updated.
        seed.extend(touched);
        let mut seed: Vec<EntityId> = seed.into_iter().collect();
        let mut still_present = Vec::with_capacity(seed.len());
        seed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for id in seed {
            if self.graph.get_entity(&id)?.is_some() {
                still_present.push(id);
            }
        }
        self.detector
            .run_incremental(self.graph.as_ref(), &still_present)?;

        let changed = self.graph.communities_of_entities(&still_present)?;
        self.summarizer
            .summarize_targets(self.graph.as_ref(), &changed)?;

        Ok(UpdateOutcome::Reindexed {
            version: document.version,
            report,
        })
    }

    /// Chunk → embed → extract → write, then resolve duplicates. Returns the
    /// report core and the entity ids this run touched.
    fn index_content(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<(IndexingReport, Vec<EntityId>)> {
        let mut report = IndexingReport {
            document_id: document_id.to_string(),
            ..IndexingReport::default()
        };

        let chunks = self.chunker.chunk(document_id, text);
        report.chunks = chunks.len();

        let mut known: Vec<String> = self
            .graph
            .list_entities(KNOWN_ENTITY_BUDGET, None)?
            .into_iter()
            .map(|e| e.name)
            .collect();
        let mut known_set: HashSet<String> =
            known.iter().map(|n| n.to_lowercase()).collect();
        let mut touched: Vec<EntityId> = Vec::new();

        for chunk in &chunks {
            match self.embedder.embed(&chunk.text) {
                Ok(embedding) => self.vectors.upsert(
                    &chunk.id,
                    document_id,
                    &chunk.text,
                    chunk.start_char,
                    chunk.end_char,
                    &embedding,
                )?,
                Err(e) => {
                    tracing::warn!(chunk = %chunk.id, error = %e, "embedding failed, continuing");
                },
            }

            let extraction = match self.extractor.extract(chunk, &known) {
                Ok(extraction) => extraction,
                Err(e) => {
                    tracing::warn!(chunk = %chunk.id, error = %e, "chunk extraction failed, skipping");
                    report.chunks_failed += 1;
                    continue;
                },
            };

            for entity in &extraction.entities {
                if known_set.insert(entity.name.to_lowercase()) {
                    known.push(entity.name.clone());
                }
            }

            let stats = self.writer.write_chunk(chunk, &extraction)?;
            report.entities_extracted += stats.entities;
            report.relationships += stats.relationships;
            report.claims += stats.claims;
            touched.extend(stats.touched);
        }

        touched.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        touched.dedup();

        let resolution = self.resolver.resolve(self.graph.as_ref(), &touched)?;
        report.entities_merged = resolution.merged();
        // Drop ids the resolver merged away.
        let mut surviving = Vec::with_capacity(touched.len());
        for id in touched {
            if self.graph.get_entity(&id)?.is_some() {
                surviving.push(id);
            }
        }
        Ok((report, surviving))
    }

    /// Applies the run outcome to the document row. `full_detection` runs
    /// whole-graph community maintenance (the initial-index path); the update
    /// path runs incremental detection itself.
    fn finish_document(
        &self,
        document: &mut Document,
        text: &str,
        outcome: Result<(IndexingReport, Vec<EntityId>)>,
        full_detection: bool,
    ) -> Result<IndexingReport> {
        match outcome {
            Ok((mut report, touched)) => {
                let failed = report.chunks > 0 && report.chunks_failed == report.chunks;
                document.status = if failed {
                    DocumentStatus::Failed
                } else {
                    DocumentStatus::Completed
                };
                document.error = failed.then(|| "all chunks failed extraction".to_string());
                document.content_hash = content_hash(text);
                document.last_processed_at = Some(chrono::Utc::now());
                self.documents.put_document(document)?;

                if full_detection && !failed && !touched.is_empty() {
                    let detection = self.detector.run_full(self.graph.as_ref())?;
                    report.communities_updated = detection.communities;
                    self.summarize_unsummarized()?;
                }
                report.status = Some(document.status);
                Ok(report)
            },
            Err(e) => {
                document.status = DocumentStatus::Failed;
                document.error = Some(e.to_string());
                document.last_processed_at = Some(chrono::Utc::now());
                self.documents.put_document(document)?;
                Err(e)
            },
        }
    }

    fn require_document(&self, document_id: &str) -> Result<Document> {
        self.documents
            .get_document(document_id)?
            .ok_or_else(|| Error::NotFound {
                resource: "document".to_string(),
                id: document_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_normalizes_line_endings() {
        assert_eq!(content_hash("a\r\nb"), content_hash("a\nb"));
        assert_ne!(content_hash("a"), content_hash("b"));
        assert_eq!(content_hash("x").len(), 64);
    }
}
