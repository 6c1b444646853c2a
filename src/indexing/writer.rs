//! Graph writer: idempotent persistence of extraction output.
//!
//! Translates a chunk's [`ChunkExtraction`] into store upserts: entity nodes
//! with mention edges, typed relationship edges (labels validated before they
//! reach the store), and claim nodes with their subject/object/source links.
//! A relationship or claim whose endpoints never materialized as entities is
//! skipped and logged, not guessed at.

use super::extractor::ChunkExtraction;
use crate::Result;
use crate::models::{
    Claim, Entity, EntityId, EntityMention, EntityType, Relationship, TextUnit,
    normalize_relation_type,
};
use crate::storage::{GraphDeletionStats, GraphStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Counters for one chunk's write.
#[derive(Debug, Clone, Default)]
pub struct ChunkWriteStats {
    /// Entities upserted.
    pub entities: usize,
    /// Relationships upserted.
    pub relationships: usize,
    /// Claims upserted.
    pub claims: usize,
    /// Relationships skipped (invalid label or missing endpoint).
    pub relationships_skipped: usize,
    /// Claims skipped (missing subject entity).
    pub claims_skipped: usize,
    /// Ids of entities touched by this chunk, for the resolver.
    pub touched: Vec<EntityId>,
}

/// Writer service over a shared graph store.
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
}

impl GraphWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Persists one chunk and its extraction output.
    ///
    /// # Errors
    ///
    /// Returns an error when a store write fails; per-record skips are
    /// counted, not raised.
    pub fn write_chunk(
        &self,
        chunk: &TextUnit,
        extraction: &ChunkExtraction,
    ) -> Result<ChunkWriteStats> {
        let mut stats = ChunkWriteStats::default();
        self.store.put_text_unit(chunk)?;

        // Entities first; relationships and claims resolve names against them.
        let mut by_name: HashMap<String, EntityId> = HashMap::new();
        for extracted in &extraction.entities {
            let entity = Entity::new(
                &extracted.name,
                EntityType::parse(&extracted.entity_type),
                &extracted.description,
                extracted.confidence,
            );
            let stored = self.store.upsert_entity(&entity)?;
            self.store.create_mention(&EntityMention {
                entity_id: stored.id.clone(),
                textunit_id: chunk.id.clone(),
            })?;
            by_name.insert(extracted.name.trim().to_lowercase(), stored.id.clone());
            stats.touched.push(stored.id);
            stats.entities += 1;
        }

        for rel in &extraction.relationships {
            let Some(rel_type) = normalize_relation_type(&rel.rel_type) else {
                tracing::warn!(chunk = %chunk.id, rel_type = %rel.rel_type, "invalid relation label");
                stats.relationships_skipped += 1;
                continue;
            };
            let source = self.lookup(&by_name, &rel.source)?;
            let target = self.lookup(&by_name, &rel.target)?;
            let (Some(source), Some(target)) = (source, target) else {
                tracing::debug!(
                    chunk = %chunk.id,
                    source = %rel.source,
                    target = %rel.target,
                    "relationship endpoint not in graph, skipping"
                );
                stats.relationships_skipped += 1;
                continue;
            };
            let mut relationship = Relationship::new(
                source,
                target,
                rel_type,
                &rel.description,
                rel.confidence(),
            );
            relationship.weight = rel.weight.max(1);
            self.store.upsert_relationship(&relationship)?;
            stats.relationships += 1;
        }

        for claim in &extraction.claims {
            let Some(subject_id) = self.lookup(&by_name, &claim.subject)? else {
                tracing::debug!(chunk = %chunk.id, subject = %claim.subject, "claim subject not in graph, skipping");
                stats.claims_skipped += 1;
                continue;
            };
            let object_id = match &claim.object {
                Some(object) => self.lookup(&by_name, object)?,
                None => None,
            };
            let record = Claim::new(
                &claim.subject,
                claim.object.clone(),
                &claim.claim_type,
                claim.status,
                &claim.description,
                &claim.source_text,
            )
            .with_dates(claim.start_date, claim.end_date);
            self.store
                .upsert_claim(&record, &subject_id, object_id.as_ref(), &chunk.id)?;
            stats.claims += 1;
        }

        Ok(stats)
    }

    /// Cascade-deletes a document's graph footprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the store deletion fails.
    pub fn delete_document_graph_data(&self, document_id: &str) -> Result<GraphDeletionStats> {
        self.store.delete_document_graph_data(document_id)
    }

    /// Resolves a name against this chunk's entities, then the whole graph.
    fn lookup(
        &self,
        by_name: &HashMap<String, EntityId>,
        name: &str,
    ) -> Result<Option<EntityId>> {
        let folded = name.trim().to_lowercase();
        if let Some(id) = by_name.get(&folded) {
            return Ok(Some(id.clone()));
        }
        Ok(self
            .store
            .find_entity_by_name(name, None)?
            .map(|entity| entity.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::extractor::{ExtractedClaim, ExtractedEntity, ExtractedRelationship};
    use crate::models::ClaimStatus;
    use crate::storage::{ClaimFilter, InMemoryGraphStore};

    fn chunk() -> TextUnit {
        TextUnit {
            id: "doc_chunk_0".to_string(),
            document_id: "doc".to_string(),
            text: "Apple was founded by Steve Jobs in Cupertino.".to_string(),
            start_char: 0,
            end_char: 45,
        }
    }

    fn extraction() -> ChunkExtraction {
        ChunkExtraction {
            entities: vec![
                ExtractedEntity {
                    name: "Apple".to_string(),
                    entity_type: "ORGANIZATION".to_string(),
                    description: "Technology company".to_string(),
                    confidence: 0.9,
                },
                ExtractedEntity {
                    name: "Steve Jobs".to_string(),
                    entity_type: "PERSON".to_string(),
                    description: "Co-founder".to_string(),
                    confidence: 0.95,
                },
            ],
            relationships: vec![ExtractedRelationship {
                source: "Steve Jobs".to_string(),
                target: "Apple".to_string(),
                rel_type: "founded".to_string(),
                description: "Founded the company".to_string(),
                strength: 9.0,
                weight: 1,
            }],
            claims: vec![ExtractedClaim {
                subject: "Apple".to_string(),
                object: None,
                claim_type: "FOUNDING".to_string(),
                status: ClaimStatus::True,
                start_date: None,
                end_date: None,
                description: "Apple was founded".to_string(),
                source_text: "Apple was founded by Steve Jobs.".to_string(),
            }],
            discarded_records: 0,
            gleaning_passes: 0,
        }
    }

    #[test]
    fn writes_entities_relationships_and_claims() {
        let store = Arc::new(InMemoryGraphStore::new());
        let writer = GraphWriter::new(Arc::clone(&store) as Arc<dyn GraphStore>);
        let stats = writer.write_chunk(&chunk(), &extraction()).expect("write");
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.relationships, 1);
        assert_eq!(stats.claims, 1);
        assert_eq!(stats.relationships_skipped, 0);

        let graph = store.stats().expect("stats");
        assert_eq!(graph.entities, 2);
        assert_eq!(graph.relationships, 1);
        assert_eq!(graph.mentions, 2);

        // The relation label was normalized on the way in.
        let apple = store
            .find_entity_by_name("Apple", None)
            .expect("find")
            .expect("exists");
        let rels = store.relationships_of(&apple.id).expect("rels");
        assert_eq!(rels[0].rel_type, "FOUNDED");

        let claims = store
            .query_claims(&ClaimFilter::default())
            .expect("claims");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].subject, "APPLE");
    }

    #[test]
    fn unknown_endpoints_are_skipped_not_fabricated() {
        let store = Arc::new(InMemoryGraphStore::new());
        let writer = GraphWriter::new(Arc::clone(&store) as Arc<dyn GraphStore>);
        let mut ex = extraction();
        ex.relationships.push(ExtractedRelationship {
            source: "Steve Jobs".to_string(),
            target: "NeXT".to_string(),
            rel_type: "FOUNDED".to_string(),
            description: String::new(),
            strength: 8.0,
            weight: 1,
        });
        let stats = writer.write_chunk(&chunk(), &ex).expect("write");
        assert_eq!(stats.relationships, 1);
        assert_eq!(stats.relationships_skipped, 1);
        assert_eq!(store.stats().expect("stats").entities, 2);
    }

    #[test]
    fn rewriting_the_same_chunk_is_idempotent_for_edges() {
        let store = Arc::new(InMemoryGraphStore::new());
        let writer = GraphWriter::new(Arc::clone(&store) as Arc<dyn GraphStore>);
        writer.write_chunk(&chunk(), &extraction()).expect("first");
        writer.write_chunk(&chunk(), &extraction()).expect("second");
        let graph = store.stats().expect("stats");
        assert_eq!(graph.entities, 2);
        assert_eq!(graph.relationships, 1);
        assert_eq!(graph.mentions, 2);
        // Mention counts and weights accumulate; the node/edge sets do not.
        let apple = store
            .find_entity_by_name("Apple", None)
            .expect("find")
            .expect("exists");
        assert_eq!(apple.mention_count, 2);
        let rels = store.relationships_of(&apple.id).expect("rels");
        assert_eq!(rels[0].weight, 2);
    }
}
