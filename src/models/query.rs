//! Query engine payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::graph::Claim;

/// Outcome status attached to query responses.
///
/// Queries never return empty answers silently: a query that matches no
/// entities reports [`QueryStatus::NoEntitiesFound`] with a generic message
/// instead of invoking the answer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// The engine produced an answer.
    Answered,
    /// No graph entities matched the question.
    NoEntitiesFound,
    /// The engine fell back to a partial answer after a failure.
    Partial,
}

/// A cited source backing a local answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Entity the evidence is anchored on.
    pub entity_name: String,
    /// Text unit the evidence came from, when known.
    pub chunk_id: Option<String>,
}

/// Result of a local (entity-anchored) query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalQueryResult {
    /// Outcome status.
    pub status: QueryStatus,
    /// Generated answer.
    pub answer: String,
    /// Context string assembled from the neighborhoods.
    pub context: String,
    /// Source citations.
    pub citations: Vec<Citation>,
    /// Answer confidence in [0, 1].
    pub confidence: f32,
    /// Names of entities the query was anchored on.
    pub entities_found: Vec<String>,
}

/// How a global query was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalMode {
    /// Map-reduce over community summary batches.
    MapReduce,
    /// Single LLM call over the top community summaries.
    SingleShot,
}

/// Result of a global (community-level) query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalQueryResult {
    /// Outcome status.
    pub status: QueryStatus,
    /// Synthesized answer.
    pub answer: String,
    /// Key insights surfaced by the reduce phase.
    pub key_insights: Vec<String>,
    /// Communities the answer rests on.
    pub supporting_communities: Vec<i64>,
    /// Confidence score in [0, 1].
    pub confidence_score: f32,
    /// Map batches executed (0 in single-shot mode).
    pub num_batches: usize,
    /// Communities considered.
    pub num_communities: usize,
    /// Execution mode.
    pub mode: GlobalMode,
}

/// Result of a claims query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsQueryResult {
    /// Optional synthesized answer (present when a question was asked).
    pub answer: Option<String>,
    /// Matching claims.
    pub claims: Vec<Claim>,
}

/// Pruning backend used to score relations and entities during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruningMethod {
    /// LLM-scored with reasoning. Highest quality, highest latency.
    Llm,
    /// BM25-Okapi lexical scoring.
    Bm25,
    /// Dense embedding cosine similarity.
    SentenceBert,
}

/// Configuration of a ToG traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TogConfig {
    /// Relations retained per depth.
    pub search_width: usize,
    /// Maximum hops.
    pub search_depth: usize,
    /// Entities carried to the next depth.
    pub num_retain_entity: usize,
    /// Pruning backend.
    pub pruning_method: PruningMethod,
    /// Whether the sufficiency gate runs after each depth.
    pub enable_sufficiency_check: bool,
    /// Temperature for exploration calls (grounding, scoring).
    pub exploration_temperature: f32,
    /// Temperature for the final reasoning call.
    pub reasoning_temperature: f32,
}

impl Default for TogConfig {
    fn default() -> Self {
        Self {
            search_width: 3,
            search_depth: 3,
            num_retain_entity: 5,
            pruning_method: PruningMethod::Llm,
            enable_sufficiency_check: true,
            exploration_temperature: 0.4,
            reasoning_temperature: 0.0,
        }
    }
}

/// A `(subject, relation, object)` record produced during traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triplet {
    /// Source entity name.
    pub subject: String,
    /// Relation type.
    pub relation: String,
    /// Target entity name.
    pub object: String,
    /// Relation confidence.
    pub confidence: f32,
    /// Where in the traversal this was found (e.g. `depth_2`).
    pub source: String,
}

impl Triplet {
    /// Dedup key ignoring confidence and provenance.
    #[must_use]
    pub fn key(&self) -> (String, String, String) {
        (
            self.subject.clone(),
            self.relation.clone(),
            self.object.clone(),
        )
    }
}

/// What happened at one traversal depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The frontier expanded normally.
    Expanded,
    /// The sufficiency gate stopped the traversal here.
    Sufficient,
    /// No relations or candidates were found at this depth.
    Exhausted,
    /// The step failed and was skipped.
    Failed,
}

/// One per-depth step of the reasoning path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Depth, 1-based.
    pub depth: usize,
    /// Frontier entity names at the start of this depth.
    pub frontier: Vec<String>,
    /// Relations retained by pruning.
    pub selected_relations: Vec<String>,
    /// Triplets recorded at this depth.
    pub new_triplets: Vec<Triplet>,
    /// Outcome of the step.
    pub status: StepStatus,
    /// Failure or exhaustion detail.
    pub detail: Option<String>,
}

/// Result of a ToG query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TogResult {
    /// Outcome status.
    pub status: QueryStatus,
    /// Synthesized answer.
    pub answer: String,
    /// Answer confidence in [0, 1].
    pub confidence: f32,
    /// Model's summary of its reasoning.
    pub reasoning_summary: Option<String>,
    /// Topic entities the traversal started from.
    pub topic_entities: Vec<String>,
    /// Ordered per-depth steps.
    pub reasoning_path: Vec<ReasoningStep>,
    /// All triplets recorded during traversal.
    pub retrieved_triplets: Vec<Triplet>,
}

/// A persisted historical query record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    /// UUID of the record.
    pub id: String,
    /// Engine kind (`local`, `global`, `tog`, `claims`).
    pub kind: String,
    /// The question asked.
    pub question: String,
    /// The answer returned.
    pub answer: String,
    /// Confidence reported by the engine.
    pub confidence: f32,
    /// Serialized engine-specific payload (reasoning path, triplets, config).
    pub payload: Option<serde_json::Value>,
    /// When the query ran.
    pub created_at: DateTime<Utc>,
}
