//! Shared test doubles for the integration suites.

#![allow(dead_code)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use graphlore::config::GraphloreConfig;
use graphlore::embedding::{Embedder, HashEmbedder};
use graphlore::indexing::IndexingPipeline;
use graphlore::llm::{CompletionOptions, LlmProvider};
use graphlore::query::QueryService;
use graphlore::storage::{
    DocumentStore, GraphStore, InMemoryGraphStore, SqliteDocumentStore, SqliteVectorStore,
    VectorStore,
};
use graphlore::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Embedding dimension used by the suites (small keeps scans fast).
pub const TEST_DIMS: usize = 64;

/// LLM double that routes on a substring of the system prompt.
///
/// Each route holds a queue of responses popped in order; when the queue
/// runs dry the route's sticky fallback (if any) answers instead. Every call
/// is logged so tests can assert which stages ran.
#[derive(Default)]
pub struct RoutedLlm {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<String>>,
}

struct Route {
    marker: &'static str,
    queue: VecDeque<String>,
    sticky: Option<String>,
}

impl RoutedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues one response for calls whose system prompt contains `marker`.
    pub fn route(self: Arc<Self>, marker: &'static str, response: &str) -> Arc<Self> {
        {
            let mut routes = self.routes.lock().expect("lock");
            match routes.iter_mut().find(|r| r.marker == marker) {
                Some(route) => route.queue.push_back(response.to_string()),
                None => routes.push(Route {
                    marker,
                    queue: VecDeque::from([response.to_string()]),
                    sticky: None,
                }),
            }
        }
        self
    }

    /// Sets a repeatable fallback response for `marker`.
    pub fn route_sticky(self: Arc<Self>, marker: &'static str, response: &str) -> Arc<Self> {
        {
            let mut routes = self.routes.lock().expect("lock");
            match routes.iter_mut().find(|r| r.marker == marker) {
                Some(route) => route.sticky = Some(response.to_string()),
                None => routes.push(Route {
                    marker,
                    queue: VecDeque::new(),
                    sticky: Some(response.to_string()),
                }),
            }
        }
        self
    }

    /// How many calls hit routes whose marker contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }
}

impl LlmProvider for RoutedLlm {
    fn name(&self) -> &'static str {
        "routed"
    }

    fn complete_with_options(
        &self,
        system: &str,
        _user: &str,
        _options: &CompletionOptions,
    ) -> Result<String> {
        let mut routes = self.routes.lock().expect("lock");
        let route = routes
            .iter_mut()
            .find(|r| system.contains(r.marker))
            .ok_or_else(|| Error::failed("routed_llm", format!("no route for: {system}")))?;
        self.calls.lock().expect("lock").push(route.marker.to_string());
        route
            .queue
            .pop_front()
            .or_else(|| route.sticky.clone())
            .ok_or_else(|| Error::failed("routed_llm", format!("route drained: {}", route.marker)))
    }
}

/// Embedder wrapper that counts calls.
pub struct CountingEmbedder {
    inner: HashEmbedder,
    pub calls: Mutex<usize>,
}

impl CountingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashEmbedder::new(TEST_DIMS),
            calls: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().expect("lock")
    }
}

impl Default for CountingEmbedder {
    fn default() -> Self {
        Self {
            inner: HashEmbedder::new(TEST_DIMS),
            calls: Mutex::new(0),
        }
    }
}

impl Embedder for CountingEmbedder {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        *self.calls.lock().expect("lock") += 1;
        self.inner.embed(text)
    }
}

/// A fully wired test harness: in-memory stores, routed LLM, counting
/// embedder, LLM entity resolution off (scripted runs stay deterministic).
pub struct Harness {
    pub graph: Arc<InMemoryGraphStore>,
    pub documents: Arc<SqliteDocumentStore>,
    pub llm: Arc<RoutedLlm>,
    pub embedder: Arc<CountingEmbedder>,
    pub pipeline: IndexingPipeline,
    pub queries: QueryService,
}

impl Harness {
    pub fn new(llm: Arc<RoutedLlm>) -> Self {
        let mut config = GraphloreConfig::default();
        config.extraction.max_gleanings = 0;
        config.resolution.llm_resolution = false;
        config.embedding.dimensions = TEST_DIMS;

        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors =
            Arc::new(SqliteVectorStore::in_memory(TEST_DIMS).expect("vector store"));
        let documents = Arc::new(SqliteDocumentStore::in_memory().expect("document store"));
        let embedder = CountingEmbedder::new();

        let pipeline = IndexingPipeline::new(
            config.clone(),
            Arc::clone(&graph) as Arc<dyn GraphStore>,
            Arc::clone(&vectors) as Arc<dyn VectorStore>,
            Arc::clone(&documents) as Arc<dyn DocumentStore>,
            Arc::clone(&llm) as Arc<dyn LlmProvider>,
            Arc::clone(&embedder) as Arc<dyn Embedder>,
        );
        let queries = QueryService::new(
            &config,
            Arc::clone(&graph) as Arc<dyn GraphStore>,
            Arc::clone(&documents) as Arc<dyn DocumentStore>,
            Arc::clone(&llm) as Arc<dyn LlmProvider>,
            Arc::clone(&embedder) as Arc<dyn Embedder>,
        );

        Self {
            graph,
            documents,
            llm,
            embedder,
            pipeline,
            queries,
        }
    }
}

/// Marker substrings for the shared prompt set.
pub mod markers {
    pub const EXTRACTION: &str = "information extraction engine";
    pub const COMMUNITY_REPORT: &str = "analyst report";
    pub const QUERY_ENTITIES: &str = "knowledge-graph lookup";
    pub const LOCAL_ANSWER: &str = "using ONLY the knowledge-graph context";
    pub const GLOBAL_MAP: &str = "assess which communities";
    pub const GLOBAL_REDUCE: &str = "synthesize intermediate community findings";
    pub const GLOBAL_SINGLE: &str = "corpus-level question from community summaries";
    pub const TOPIC_GROUNDING: &str = "multi-hop graph traversal should start";
    pub const RELATION_SCORING: &str = "Score how useful each relation";
    pub const ENTITY_SCORING: &str = "Score how likely each candidate entity";
    pub const SUFFICIENCY: &str = "enough information to answer";
    pub const TOG_ANSWER: &str = "reasoning path traced through a knowledge graph";
    pub const CLAIMS_ANSWER: &str = "using ONLY the recorded claims";
}

/// A generic community report reply.
pub const GENERIC_REPORT: &str = r#"{"title": "Cluster", "summary": "A cluster of related entities.", "rating": 5.0, "significance": "MEDIUM", "themes": ["general"], "findings": []}"#;
