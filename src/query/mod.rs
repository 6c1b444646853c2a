//! Query engines.
//!
//! [`QueryService`] fronts the three engines (local, global, ToG) plus the
//! claims filter, records every answered query into the relational history
//! table, and exposes the graph statistics surface. Engines are stateless
//! across requests; each call sees a read-consistent view of the stores.

mod claims;
mod global;
mod local;
pub mod tog;

pub use claims::ClaimsQueryEngine;
pub use global::GlobalQueryEngine;
pub use local::LocalQueryEngine;
pub use tog::{Pruner, ScoredItem, TogEngine};

use crate::config::GraphloreConfig;
use crate::embedding::Embedder;
use crate::llm::LlmProvider;
use crate::models::{
    ClaimsQueryResult, GlobalQueryResult, LocalQueryResult, QueryRecord, TogConfig, TogResult,
};
use crate::storage::{ClaimFilter, DocumentStore, GraphStats, GraphStore};
use crate::Result;
use std::sync::Arc;

/// Facade over the query engines.
pub struct QueryService {
    graph: Arc<dyn GraphStore>,
    documents: Arc<dyn DocumentStore>,
    local: LocalQueryEngine,
    global: GlobalQueryEngine,
    claims: ClaimsQueryEngine,
    tog: TogEngine,
}

impl QueryService {
    /// Wires the engines over shared backends. `llm` should carry the shared
    /// rate-limit/retry wrapper.
    #[must_use]
    pub fn new(
        config: &GraphloreConfig,
        graph: Arc<dyn GraphStore>,
        documents: Arc<dyn DocumentStore>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let local = LocalQueryEngine::new(Arc::clone(&graph), Arc::clone(&llm));
        let global = GlobalQueryEngine::new(
            Arc::clone(&graph),
            Arc::clone(&llm),
            config.global_query.clone(),
        );
        let claims = ClaimsQueryEngine::new(Arc::clone(&graph), Arc::clone(&llm));
        let tog = TogEngine::new(Arc::clone(&graph), llm, embedder);
        Self {
            graph,
            documents,
            local,
            global,
            claims,
            tog,
        }
    }

    /// Entity-anchored local query.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failures.
    pub fn local_query(
        &self,
        query: &str,
        hop_limit: usize,
        document_ids: Option<&[String]>,
    ) -> Result<LocalQueryResult> {
        let result = self.local.run(query, hop_limit, document_ids)?;
        self.record("local", query, &result.answer, result.confidence, None);
        Ok(result)
    }

    /// Corpus-level global query.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failures.
    pub fn global_query(
        &self,
        query: &str,
        use_mapreduce: Option<bool>,
        batch_size: Option<usize>,
    ) -> Result<GlobalQueryResult> {
        let result = self.global.run(query, use_mapreduce, batch_size)?;
        self.record(
            "global",
            query,
            &result.answer,
            result.confidence_score,
            None,
        );
        Ok(result)
    }

    /// Multi-hop ToG query. The full reasoning path, triplets, and config are
    /// serialized into the history record.
    #[must_use]
    pub fn tog_query(
        &self,
        query: &str,
        config: &TogConfig,
        document_ids: Option<&[String]>,
    ) -> TogResult {
        let result = self.tog.run(query, config, document_ids);
        let payload = serde_json::json!({
            "reasoning_path": result.reasoning_path,
            "retrieved_triplets": result.retrieved_triplets,
            "tog_config": config,
        });
        self.record("tog", query, &result.answer, result.confidence, Some(payload));
        result
    }

    /// Claims filter query with optional answer synthesis.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failures.
    pub fn claims_query(
        &self,
        question: Option<&str>,
        filter: &ClaimFilter,
    ) -> Result<ClaimsQueryResult> {
        let result = self.claims.run(question, filter)?;
        if let (Some(question), Some(answer)) = (question, &result.answer) {
            self.record("claims", question, answer, 0.0, None);
        }
        Ok(result)
    }

    /// Graph statistics for the maintenance surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn stats(&self) -> Result<GraphStats> {
        self.graph.stats()
    }

    /// Recent query history.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn history(&self, limit: usize) -> Result<Vec<QueryRecord>> {
        self.documents.recent_queries(limit)
    }

    /// Best-effort history append; a failed write never fails the query.
    fn record(
        &self,
        kind: &str,
        question: &str,
        answer: &str,
        confidence: f32,
        payload: Option<serde_json::Value>,
    ) {
        let record = QueryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            confidence,
            payload,
            created_at: chrono::Utc::now(),
        };
        if let Err(e) = self.documents.record_query(&record) {
            tracing::warn!(error = %e, "failed to record query history");
        }
    }
}
