//! Global query engine: map-reduce over community summaries.
//!
//! Map-reduce auto-triggers when enough summarized communities exist;
//! otherwise (or when disabled) the engine answers in a single call over the
//! top summaries. A failed map batch is logged and dropped; the reduce runs
//! over whatever survived.

use crate::config::GlobalQueryConfig;
use crate::llm::{CompletionOptions, LlmProvider, extract_json, prompts};
use crate::models::{Community, GlobalMode, GlobalQueryResult, QueryStatus};
use crate::storage::GraphStore;
use crate::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct MapOutput {
    #[serde(default)]
    relevant_communities: Vec<i64>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    confidence: String,
}

#[derive(Debug, Deserialize)]
struct ReduceOutput {
    answer: String,
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    supporting_communities: Vec<i64>,
    #[serde(default)]
    confidence_score: f32,
    #[serde(default)]
    limitations: Option<String>,
}

/// Global query engine.
pub struct GlobalQueryEngine {
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmProvider>,
    config: GlobalQueryConfig,
}

impl GlobalQueryEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        graph: Arc<dyn GraphStore>,
        llm: Arc<dyn LlmProvider>,
        config: GlobalQueryConfig,
    ) -> Self {
        Self { graph, llm, config }
    }

    /// Answers a corpus-level question.
    ///
    /// `use_mapreduce` forces the mode; when unset, map-reduce auto-triggers
    /// at the configured community threshold.
    ///
    /// # Errors
    ///
    /// Returns an error on store failures or when every synthesis call fails.
    pub fn run(
        &self,
        query: &str,
        use_mapreduce: Option<bool>,
        batch_size: Option<usize>,
    ) -> Result<GlobalQueryResult> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("empty query".to_string()));
        }

        let communities: Vec<Community> = self
            .graph
            .list_communities(None)?
            .into_iter()
            .filter(|c| c.summary.as_ref().is_some_and(|s| !s.is_empty()))
            .collect();
        let num_communities = communities.len();
        if communities.is_empty() {
            return Ok(GlobalQueryResult {
                status: QueryStatus::NoEntitiesFound,
                answer: "No summarized communities exist yet; index documents first.".to_string(),
                key_insights: Vec::new(),
                supporting_communities: Vec::new(),
                confidence_score: 0.0,
                num_batches: 0,
                num_communities: 0,
                mode: GlobalMode::SingleShot,
            });
        }

        let mapreduce = self.config.enable_mapreduce
            && use_mapreduce.unwrap_or(num_communities >= self.config.mapreduce_threshold);
        if mapreduce {
            let batch_size = batch_size.unwrap_or(self.config.batch_size).max(1);
            self.map_reduce(query, &communities, batch_size)
        } else {
            self.single_shot(query, communities)
        }
    }

    fn render_batch(communities: &[Community]) -> String {
        communities
            .iter()
            .map(|c| {
                format!(
                    "- id {} (size {}, themes: {}): {}",
                    c.id,
                    c.member_count,
                    c.themes_csv(),
                    c.summary.as_deref().unwrap_or_default(),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn map_reduce(
        &self,
        query: &str,
        communities: &[Community],
        batch_size: usize,
    ) -> Result<GlobalQueryResult> {
        let mut map_outputs: Vec<MapOutput> = Vec::new();
        let mut num_batches = 0usize;
        for batch in communities.chunks(batch_size) {
            num_batches += 1;
            let user = prompts::global_map_user(query, &Self::render_batch(batch));
            let outcome = self
                .llm
                .complete_with_options(
                    prompts::GLOBAL_MAP_SYSTEM,
                    &user,
                    &CompletionOptions::default(),
                )
                .and_then(|response| {
                    serde_json::from_str::<MapOutput>(extract_json(&response)).map_err(|e| {
                        Error::Parse {
                            operation: "global_map".to_string(),
                            cause: e.to_string(),
                        }
                    })
                });
            match outcome {
                Ok(output) => map_outputs.push(output),
                Err(e) => {
                    tracing::warn!(batch = num_batches, error = %e, "map batch failed, dropping");
                },
            }
        }

        if map_outputs.is_empty() {
            return Err(Error::failed("global_query", "every map batch failed"));
        }

        let rendered: String = map_outputs
            .iter()
            .map(|m| {
                format!(
                    "- communities {:?} ({}): {}\n  key points: {}",
                    m.relevant_communities,
                    m.confidence,
                    m.summary,
                    m.key_points.join("; "),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let response = self.llm.complete_with_options(
            prompts::GLOBAL_REDUCE_SYSTEM,
            &prompts::global_reduce_user(query, &rendered),
            &CompletionOptions::default().with_max_tokens(2048),
        )?;
        let reduced: ReduceOutput =
            serde_json::from_str(extract_json(&response)).map_err(|e| Error::Parse {
                operation: "global_reduce".to_string(),
                cause: e.to_string(),
            })?;

        if let Some(limitations) = &reduced.limitations {
            tracing::debug!(%limitations, "reduce reported limitations");
        }
        Ok(GlobalQueryResult {
            status: QueryStatus::Answered,
            answer: reduced.answer,
            key_insights: reduced.key_insights,
            supporting_communities: reduced.supporting_communities,
            confidence_score: reduced.confidence_score.clamp(0.0, 1.0),
            num_batches,
            num_communities: communities.len(),
            mode: GlobalMode::MapReduce,
        })
    }

    fn single_shot(
        &self,
        query: &str,
        mut communities: Vec<Community>,
    ) -> Result<GlobalQueryResult> {
        let num_communities = communities.len();
        // Strongest communities first, bounded to the fallback budget.
        communities.sort_by(|a, b| {
            b.rating
                .unwrap_or(0.0)
                .partial_cmp(&a.rating.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.member_count.cmp(&a.member_count))
        });
        communities.truncate(self.config.fallback_top_k);

        let user = prompts::global_map_user(query, &Self::render_batch(&communities));
        let response = self.llm.complete_with_options(
            prompts::GLOBAL_SINGLE_SHOT_SYSTEM,
            &user,
            &CompletionOptions::default().with_max_tokens(2048),
        )?;
        let reduced: ReduceOutput =
            serde_json::from_str(extract_json(&response)).map_err(|e| Error::Parse {
                operation: "global_single_shot".to_string(),
                cause: e.to_string(),
            })?;

        Ok(GlobalQueryResult {
            status: QueryStatus::Answered,
            answer: reduced.answer,
            key_insights: reduced.key_insights,
            supporting_communities: reduced.supporting_communities,
            confidence_score: reduced.confidence_score.clamp(0.0, 1.0),
            num_batches: 0,
            num_communities,
            mode: GlobalMode::SingleShot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryGraphStore;
    use std::sync::Mutex;

    struct CountingLlm {
        responses: Mutex<Vec<String>>,
        calls: Mutex<usize>,
    }

    impl CountingLlm {
        fn new(responses: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                calls: Mutex::new(0),
            })
        }
    }

    impl LlmProvider for CountingLlm {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn complete_with_options(
            &self,
            _system: &str,
            _user: &str,
            _options: &CompletionOptions,
        ) -> Result<String> {
            *self.calls.lock().expect("lock") += 1;
            self.responses
                .lock()
                .expect("lock")
                .pop()
                .ok_or_else(|| Error::failed("counting_llm", "no more responses"))
        }
    }

    fn store_with_communities(count: i64) -> Arc<InMemoryGraphStore> {
        let store = Arc::new(InMemoryGraphStore::new());
        for id in 0..count {
            let mut community = Community::new(id, 0, 3);
            community.summary = Some(format!("Cluster {id} covers topic {id}."));
            community.rating = Some(5.0);
            store.upsert_community(&community).expect("community");
        }
        store
    }

    const MAP: &str = r#"{"relevant_communities": [0], "summary": "relevant",
        "key_points": ["point"], "confidence": "high"}"#;
    const REDUCE: &str = r#"{"answer": "Synthesized answer.",
        "key_insights": ["insight"], "supporting_communities": [0, 3],
        "confidence_score": 0.85, "limitations": "sparse data"}"#;

    #[test]
    fn auto_triggers_map_reduce_above_threshold() {
        let store = store_with_communities(25);
        // 25 communities at batch size 10: 3 map calls + 1 reduce.
        let mut responses = vec![MAP.to_string(), MAP.to_string(), MAP.to_string()];
        responses.push(REDUCE.to_string());
        let llm = CountingLlm::new(responses);
        let engine = GlobalQueryEngine::new(store, Arc::clone(&llm) as Arc<dyn LlmProvider>, GlobalQueryConfig::default());
        let result = engine.run("What topics exist?", None, None).expect("run");
        assert_eq!(result.mode, GlobalMode::MapReduce);
        assert_eq!(result.num_batches, 3);
        assert_eq!(result.num_communities, 25);
        assert_eq!(result.supporting_communities, vec![0, 3]);
        assert_eq!(*llm.calls.lock().expect("lock"), 4);
    }

    #[test]
    fn below_threshold_falls_back_to_single_shot() {
        let store = store_with_communities(5);
        let llm = CountingLlm::new(vec![REDUCE.to_string()]);
        let engine = GlobalQueryEngine::new(store, Arc::clone(&llm) as Arc<dyn LlmProvider>, GlobalQueryConfig::default());
        let result = engine.run("What topics exist?", None, None).expect("run");
        assert_eq!(result.mode, GlobalMode::SingleShot);
        assert_eq!(result.num_batches, 0);
        assert_eq!(*llm.calls.lock().expect("lock"), 1);
    }

    #[test]
    fn explicit_request_forces_map_reduce_below_threshold() {
        let store = store_with_communities(5);
        let llm = CountingLlm::new(vec![MAP.to_string(), REDUCE.to_string()]);
        let engine = GlobalQueryEngine::new(store, llm, GlobalQueryConfig::default());
        let result = engine
            .run("What topics exist?", Some(true), None)
            .expect("run");
        assert_eq!(result.mode, GlobalMode::MapReduce);
        assert_eq!(result.num_batches, 1);
    }

    #[test]
    fn failed_map_batches_are_dropped_not_fatal() {
        let store = store_with_communities(25);
        let llm = CountingLlm::new(vec![
            "garbage".to_string(),
            MAP.to_string(),
            MAP.to_string(),
            REDUCE.to_string(),
        ]);
        let engine = GlobalQueryEngine::new(store, llm, GlobalQueryConfig::default());
        let result = engine.run("What topics exist?", None, None).expect("run");
        assert_eq!(result.num_batches, 3);
        assert_eq!(result.answer, "Synthesized answer.");
    }

    #[test]
    fn no_summarized_communities_reports_without_llm() {
        let store = Arc::new(InMemoryGraphStore::new());
        let llm = CountingLlm::new(Vec::new());
        let engine = GlobalQueryEngine::new(store, Arc::clone(&llm) as Arc<dyn LlmProvider>, GlobalQueryConfig::default());
        let result = engine.run("Anything?", None, None).expect("run");
        assert_eq!(result.status, QueryStatus::NoEntitiesFound);
        assert_eq!(*llm.calls.lock().expect("lock"), 0);
    }
}
