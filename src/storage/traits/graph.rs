//! Graph store trait for the property graph.
//!
//! # Implementor Notes
//!
//! - Methods use `&self` to enable sharing via `Arc<dyn GraphStore>`; use
//!   interior mutability (`Mutex<Connection>`, `RwLock` maps) for state.
//! - Upserts must be individually atomic and idempotent: MERGE semantics with
//!   max-confidence / accumulated-weight combination, never duplicate rows.
//! - Relationship types arrive pre-validated
//!   ([`crate::models::normalize_relation_type`]); backends may defensively
//!   re-check before interpolating a type anywhere.
//! - Deleting an entity cascades to its relationships and mentions.

use crate::Result;
use crate::models::{
    Claim, ClaimStatus, Community, CommunityReport, Entity, EntityId, EntityMention, EntityType,
    TextUnit,
};
use serde::{Deserialize, Serialize};

/// Counters returned by [`GraphStore::delete_document_graph_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDeletionStats {
    /// Text units removed.
    pub textunits_deleted: usize,
    /// Entities removed because all their mentions were in this document.
    pub entities_deleted: usize,
    /// Entities that lost some mentions but survived.
    pub entities_affected: usize,
    /// Claims removed because all their source text units were removed.
    pub claims_deleted: usize,
}

/// Snapshot counts over the whole graph.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GraphStats {
    /// Entity nodes.
    pub entities: usize,
    /// Relationship edges.
    pub relationships: usize,
    /// Text units.
    pub text_units: usize,
    /// Mention edges.
    pub mentions: usize,
    /// Claim nodes.
    pub claims: usize,
    /// Community nodes across all levels.
    pub communities: usize,
}

/// Filter for claim queries. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    /// Case-insensitive subject name.
    pub subject: Option<String>,
    /// Claim category.
    pub claim_type: Option<String>,
    /// Truth status tag.
    pub status: Option<ClaimStatus>,
    /// Maximum rows returned (0 means backend default).
    pub limit: usize,
}

/// One candidate produced by a relation expansion.
#[derive(Debug, Clone)]
pub struct RelationTarget {
    /// Name of the frontier entity the edge starts from.
    pub source_name: String,
    /// The candidate target entity.
    pub target: Entity,
    /// Confidence of the connecting relationship.
    pub confidence: f32,
    /// Description of the connecting relationship.
    pub description: String,
}

/// Trait for property-graph backends.
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Entities
    // ========================================================================

    /// Upserts an entity, merging by case-insensitive `(name, type)` (alias
    /// matches included). On match: `mention_count` accumulates, `confidence`
    /// takes the maximum, the first non-empty description is kept, aliases
    /// union. Returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn upsert_entity(&self, entity: &Entity) -> Result<Entity>;

    /// Replaces an entity row verbatim (no merge combination). Used by the
    /// resolver to write back merge results.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity does not exist or the write fails.
    fn put_entity(&self, entity: &Entity) -> Result<()>;

    /// Retrieves an entity by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>>;

    /// Finds an entity by case-insensitive name or alias, optionally
    /// restricted to a type.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn find_entity_by_name(
        &self,
        name: &str,
        entity_type: Option<&EntityType>,
    ) -> Result<Option<Entity>>;

    /// Lists entities ordered by `mention_count` descending, optionally
    /// restricted to entities mentioned by the given documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_entities(&self, limit: usize, document_ids: Option<&[String]>) -> Result<Vec<Entity>>;

    /// Deletes an entity, cascading to its relationships, mentions, and
    /// community memberships. Returns whether the entity existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn delete_entity(&self, id: &EntityId) -> Result<bool>;

    /// Merges duplicate entities into a primary entity.
    ///
    /// Combines per the merge contract: summed `mention_count`, maximum
    /// confidence, duplicates' names appended to aliases, descriptions
    /// unioned; every inbound/outbound edge (relationships, mentions, claim
    /// links, community memberships) is re-pointed to the primary, merging
    /// relationship duplicates by `(neighbor, type)` with max confidence and
    /// accumulated weight. Duplicates are deleted last, so a failure part-way
    /// leaves their graph data intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the primary or any duplicate is missing, or the
    /// write fails.
    fn merge_entities(
        &self,
        primary: &EntityId,
        duplicates: &[EntityId],
        canonical_name: Option<&str>,
    ) -> Result<Entity>;

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Upserts a relationship, merging by `(source, target, type)`: maximum
    /// confidence, accumulated weight.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is missing or the write fails.
    fn upsert_relationship(&self, relationship: &crate::models::Relationship) -> Result<()>;

    /// All relationships incident to an entity (both directions).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn relationships_of(&self, id: &EntityId) -> Result<Vec<crate::models::Relationship>>;

    /// Relationships whose both endpoints are in `ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn relationships_among(&self, ids: &[EntityId]) -> Result<Vec<crate::models::Relationship>>;

    /// Relation types incident to the given entities with `confidence` above
    /// the floor, ordered by frequency descending, capped at `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn relation_types_for(
        &self,
        ids: &[EntityId],
        min_confidence: f32,
        limit: usize,
    ) -> Result<Vec<(String, u64)>>;

    /// Target entities of edges `(source, rel_type, ?)` where source is one
    /// of `source_ids`, ordered by relation confidence then target mention
    /// count, capped at `limit`. The document filter restricts targets to
    /// entities mentioned by those documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn relation_targets(
        &self,
        source_ids: &[EntityId],
        rel_type: &str,
        document_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<RelationTarget>>;

    // ========================================================================
    // Text units and mentions
    // ========================================================================

    /// Upserts a text unit by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_text_unit(&self, unit: &TextUnit) -> Result<()>;

    /// Retrieves a text unit by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_text_unit(&self, id: &str) -> Result<Option<TextUnit>>;

    /// Creates a mention edge if absent. Returns whether it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is missing or the write fails.
    fn create_mention(&self, mention: &EntityMention) -> Result<bool>;

    /// Text units mentioning an entity, capped at `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn mention_texts(&self, id: &EntityId, limit: usize) -> Result<Vec<TextUnit>>;

    /// Ids of entities mentioned by a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn entities_mentioned_by(&self, document_id: &str) -> Result<Vec<EntityId>>;

    // ========================================================================
    // Claims
    // ========================================================================

    /// Upserts a claim by deterministic id (occurrence count accumulates) and
    /// links it to its subject entity, optional object entity, and source
    /// text unit.
    ///
    /// # Errors
    ///
    /// Returns an error if linked rows are missing or the write fails.
    fn upsert_claim(
        &self,
        claim: &Claim,
        subject_id: &EntityId,
        object_id: Option<&EntityId>,
        textunit_id: &str,
    ) -> Result<()>;

    /// Queries claims with optional filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>>;

    /// Text unit ids a claim is sourced from.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn claim_sources(&self, claim_id: &str) -> Result<Vec<String>>;

    // ========================================================================
    // Document cascade
    // ========================================================================

    /// Deletes a document's text units, claims sourced only from them,
    /// orphaned entities, and decrements mention counts on surviving
    /// entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn delete_document_graph_data(&self, document_id: &str) -> Result<GraphDeletionStats>;

    // ========================================================================
    // Communities
    // ========================================================================

    /// Creates or updates a community node keyed by `(id, level)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert_community(&self, community: &Community) -> Result<()>;

    /// Removes community membership edges: all of them, or only those of the
    /// given entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn clear_community_memberships(&self, entity_ids: Option<&[EntityId]>) -> Result<()>;

    /// Adds a membership edge `(entity) -> (community, level)`; idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is missing or the write fails.
    fn add_community_member(
        &self,
        community_id: i64,
        level: u32,
        entity_id: &EntityId,
        confidence: f32,
    ) -> Result<()>;

    /// Deletes community nodes with no membership edges. Returns how many
    /// were pruned.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn prune_empty_communities(&self) -> Result<usize>;

    /// Lists communities, optionally at a single level, ordered by level then
    /// id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_communities(&self, level: Option<u32>) -> Result<Vec<Community>>;

    /// Retrieves one community.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_community(&self, id: i64, level: u32) -> Result<Option<Community>>;

    /// Member entities of a community, ordered by mention count descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn community_members(&self, id: i64, level: u32, limit: usize) -> Result<Vec<Entity>>;

    /// `(community_id, level)` pairs any of the given entities belong to.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn communities_of_entities(&self, ids: &[EntityId]) -> Result<Vec<(i64, u32)>>;

    /// Persists a summarizer report onto a community node and stamps
    /// `summary_timestamp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the community is missing or the write fails.
    fn update_community_report(&self, id: i64, level: u32, report: &CommunityReport)
    -> Result<()>;

    /// Distinct 1-hop neighbors of the given entities (inputs included).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn neighbor_ids(&self, ids: &[EntityId]) -> Result<Vec<EntityId>>;

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Snapshot counts over the whole graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn stats(&self) -> Result<GraphStats>;
}
