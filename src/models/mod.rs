//! Data model types.
//!
//! Node and edge types for the property graph (§ graph), document lifecycle
//! types (§ document), community clustering types (§ community), and query
//! engine payloads (§ query).

pub mod community;
pub mod document;
pub mod graph;
pub mod query;

pub use community::{Community, CommunityReport, Finding, Significance};
pub use document::{Document, DocumentStatus, IndexingReport, UpdateOutcome};
pub use graph::{
    Claim, ClaimStatus, Entity, EntityId, EntityMention, EntityType, Relationship, TextUnit,
    normalize_relation_type,
};
pub use query::{
    ClaimsQueryResult, GlobalMode, GlobalQueryResult, LocalQueryResult, PruningMethod, QueryRecord,
    QueryStatus, ReasoningStep, StepStatus, TogConfig, TogResult, Triplet,
};
