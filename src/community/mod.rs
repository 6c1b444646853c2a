//! Community detection and summarization.
//!
//! [`CommunityDetector`] clusters the entity subgraph with hierarchical
//! Leiden (local moving with connected-component refinement, then super-graph
//! aggregation per level) and writes `(entity) -> (community, level)`
//! memberships. [`CommunitySummarizer`] generates an LLM report per
//! community, leaves first so parent reports can reference child summaries.

mod detector;
mod summarizer;

pub use detector::{CommunityDetector, DetectionStats};
pub use summarizer::{CommunitySummarizer, SummaryStats};
