//! Storage backend traits.

mod documents;
mod graph;
mod vector;

pub use documents::DocumentStore;
pub use graph::{ClaimFilter, GraphDeletionStats, GraphStats, GraphStore, RelationTarget};
pub use vector::{VectorHit, VectorStore};
