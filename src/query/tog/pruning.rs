//! Pruning backends for traversal scoring.
//!
//! Every pruner implements the same contract: score a list of items (relation
//! types or candidate entity names) against the query, in [0, 1]. The LLM
//! pruner is the quality reference; BM25 and the embedding pruner trade
//! quality for latency and work offline.

use crate::embedding::{Embedder, cosine_similarity};
use crate::llm::{CompletionOptions, LlmProvider, extract_json};
use crate::models::PruningMethod;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A scored item.
#[derive(Debug, Clone)]
pub struct ScoredItem {
    /// The item that was scored.
    pub item: String,
    /// Relevance score in [0, 1].
    pub score: f32,
    /// Scorer's reasoning, when available.
    pub reasoning: Option<String>,
}

/// Trait for traversal scorers.
pub trait Pruner: Send + Sync {
    /// Scores `items` against `query`. `context` carries traversal state
    /// (frontier entities, explored relations) for scorers that can use it.
    ///
    /// Returns one entry per input item; items the scorer failed to mention
    /// come back with score 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn score(&self, query: &str, items: &[String], context: &str) -> Result<Vec<ScoredItem>>;
}

/// Builds the configured pruner.
#[must_use]
pub fn build_pruner(
    method: PruningMethod,
    llm: &Arc<dyn LlmProvider>,
    embedder: &Arc<dyn Embedder>,
    system_prompt: &'static str,
    temperature: f32,
) -> Arc<dyn Pruner> {
    match method {
        PruningMethod::Llm => Arc::new(LlmPruner {
            llm: Arc::clone(llm),
            system_prompt,
            temperature,
        }),
        PruningMethod::Bm25 => Arc::new(Bm25Pruner),
        PruningMethod::SentenceBert => Arc::new(EmbeddingPruner {
            embedder: Arc::clone(embedder),
        }),
    }
}

// ============================================================================
// LLM pruner
// ============================================================================

#[derive(Debug, Deserialize)]
struct ScoresPayload {
    #[serde(default)]
    scores: Vec<ScoreRow>,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    item: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    reasoning: Option<String>,
}

/// LLM-backed scorer. Highest quality, one completion per call.
pub struct LlmPruner {
    llm: Arc<dyn LlmProvider>,
    system_prompt: &'static str,
    temperature: f32,
}

impl Pruner for LlmPruner {
    fn score(&self, query: &str, items: &[String], context: &str) -> Result<Vec<ScoredItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let listing = items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n");
        let user = if context.is_empty() {
            format!("Question: {query}\n\nItems:\n{listing}")
        } else {
            format!("Question: {query}\n\n{context}\n\nItems:\n{listing}")
        };
        let response = self.llm.complete_with_options(
            self.system_prompt,
            &user,
            &CompletionOptions::with_temperature(self.temperature),
        )?;
        let payload: ScoresPayload =
            serde_json::from_str(extract_json(&response)).map_err(|e| Error::Parse {
                operation: "pruner_scores".to_string(),
                cause: e.to_string(),
            })?;

        let mut by_item: HashMap<String, (f32, Option<String>)> = payload
            .scores
            .into_iter()
            .map(|row| {
                (
                    row.item.trim().to_lowercase(),
                    (row.score.clamp(0.0, 1.0), row.reasoning),
                )
            })
            .collect();
        Ok(items
            .iter()
            .map(|item| {
                let (score, reasoning) = by_item
                    .remove(&item.trim().to_lowercase())
                    .unwrap_or((0.0, None));
                ScoredItem {
                    item: item.clone(),
                    score,
                    reasoning,
                }
            })
            .collect())
    }
}

// ============================================================================
// BM25 pruner
// ============================================================================

/// BM25-Okapi over the item list, normalized by the best score.
pub struct Bm25Pruner;

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.replace('_', " ")
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl Pruner for Bm25Pruner {
    fn score(&self, query: &str, items: &[String], _context: &str) -> Result<Vec<ScoredItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let docs: Vec<Vec<String>> = items.iter().map(|i| tokenize(i)).collect();
        let n = docs.len() as f64;
        let avg_len = docs.iter().map(Vec::len).sum::<usize>() as f64 / n;

        // Document frequency per query term.
        let query_terms = tokenize(query);
        let mut df: HashMap<&str, f64> = HashMap::new();
        for term in &query_terms {
            let count = docs
                .iter()
                .filter(|doc| doc.iter().any(|t| t == term))
                .count() as f64;
            df.insert(term.as_str(), count);
        }

        let mut raw: Vec<f64> = Vec::with_capacity(docs.len());
        for doc in &docs {
            let doc_len = doc.len() as f64;
            let mut score = 0.0;
            for term in &query_terms {
                let tf = doc.iter().filter(|t| *t == term).count() as f64;
                if tf == 0.0 {
                    continue;
                }
                let n_q = df.get(term.as_str()).copied().unwrap_or(0.0);
                let idf = ((n - n_q + 0.5) / (n_q + 0.5) + 1.0).ln();
                let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len.max(1.0));
                score += idf * (tf * (BM25_K1 + 1.0)) / denom;
            }
            raw.push(score);
        }

        let max = raw.iter().copied().fold(0.0_f64, f64::max);
        #[allow(clippy::cast_possible_truncation)]
        let normalized = raw
            .into_iter()
            .map(|score| if max > 0.0 { (score / max) as f32 } else { 0.0 });
        Ok(items
            .iter()
            .zip(normalized)
            .map(|(item, score)| ScoredItem {
                item: item.clone(),
                score,
                reasoning: None,
            })
            .collect())
    }
}

// ============================================================================
// Embedding pruner
// ============================================================================

/// Dense scorer: cosine similarity between query and item embeddings.
pub struct EmbeddingPruner {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingPruner {
    /// Creates an embedding pruner.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

impl Pruner for EmbeddingPruner {
    fn score(&self, query: &str, items: &[String], _context: &str) -> Result<Vec<ScoredItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed(query)?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let readable = item.replace('_', " ");
            let score = match self.embedder.embed(&readable) {
                Ok(vec) => cosine_similarity(&query_vec, &vec).clamp(0.0, 1.0),
                Err(_) => 0.0,
            };
            out.push(ScoredItem {
                item: item.clone(),
                score,
                reasoning: None,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    #[test]
    fn bm25_prefers_items_sharing_query_terms() {
        let pruner = Bm25Pruner;
        let items = vec![
            "WORKS_AT".to_string(),
            "HEADQUARTERED_IN".to_string(),
            "FOUNDED".to_string(),
        ];
        let scores = pruner
            .score("where is the company headquartered", &items, "")
            .expect("score");
        assert_eq!(scores.len(), 3);
        let best = scores
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).expect("ordered"))
            .expect("non-empty");
        assert_eq!(best.item, "HEADQUARTERED_IN");
        assert!((best.score - 1.0).abs() < 1e-6, "normalized by max");
    }

    #[test]
    fn bm25_all_zero_when_nothing_matches() {
        let pruner = Bm25Pruner;
        let items = vec!["ALPHA".to_string(), "BETA".to_string()];
        let scores = pruner.score("unrelated query", &items, "").expect("score");
        assert!(scores.iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn embedding_pruner_scores_are_bounded() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
        let pruner = EmbeddingPruner::new(embedder);
        let items = vec!["works at".to_string(), "lives in".to_string()];
        let scores = pruner.score("who works at acme", &items, "").expect("score");
        assert_eq!(scores.len(), 2);
        for s in &scores {
            assert!((0.0..=1.0).contains(&s.score));
        }
        assert!(scores[0].score > scores[1].score);
    }

    #[test]
    fn llm_pruner_fills_missing_items_with_zero() {
        struct OneScoreLlm;
        impl LlmProvider for OneScoreLlm {
            fn name(&self) -> &'static str {
                "one"
            }
            fn complete_with_options(
                &self,
                _s: &str,
                _u: &str,
                _o: &CompletionOptions,
            ) -> Result<String> {
                Ok(r#"{"scores": [{"item": "KNOWN", "score": 0.9, "reasoning": "match"}]}"#
                    .to_string())
            }
        }
        let pruner = LlmPruner {
            llm: Arc::new(OneScoreLlm),
            system_prompt: "score",
            temperature: 0.0,
        };
        let scores = pruner
            .score("q", &["KNOWN".to_string(), "UNKNOWN".to_string()], "")
            .expect("score");
        assert!((scores[0].score - 0.9).abs() < 1e-6);
        assert_eq!(scores[1].score, 0.0);
    }
}
