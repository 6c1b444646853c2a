//! Local query engine: entity-anchored neighborhood retrieval.
//!
//! Extracts candidate entity names from the question, anchors them in the
//! graph (exact match first, then the resolver's fuzzy matcher), fetches a
//! 1-2 hop neighborhood per anchor, and answers over the assembled context.
//! A question that matches no entities returns `no_entities_found` without
//! spending an answer call.

use crate::indexing::best_fuzzy_match;
use crate::llm::{CompletionOptions, LlmProvider, extract_json, prompts};
use crate::models::query::Citation;
use crate::models::{Entity, LocalQueryResult, QueryStatus};
use crate::storage::GraphStore;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Entities pulled when the question names none.
const FALLBACK_TOP_K: usize = 10;
/// Mention snippets per anchored entity.
const SNIPPETS_PER_ENTITY: usize = 3;
/// Fuzzy threshold when anchoring query names (looser than the resolver's
/// merge threshold).
const FUZZY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Deserialize)]
struct EntityList {
    #[serde(default)]
    entities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LocalAnswer {
    answer: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    cited_entities: Vec<String>,
}

/// Local query engine.
pub struct LocalQueryEngine {
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmProvider>,
}

impl LocalQueryEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(graph: Arc<dyn GraphStore>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { graph, llm }
    }

    /// Answers an entity-anchored question.
    ///
    /// # Errors
    ///
    /// Returns an error on store failures or when the answer call fails.
    pub fn run(
        &self,
        query: &str,
        hop_limit: usize,
        document_ids: Option<&[String]>,
    ) -> Result<LocalQueryResult> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("empty query".to_string()));
        }
        let hops = hop_limit.clamp(1, 2);

        let anchors = self.anchor_entities(query, document_ids)?;
        if anchors.is_empty() {
            return Ok(LocalQueryResult {
                status: QueryStatus::NoEntitiesFound,
                answer: "No entities in the graph match this question.".to_string(),
                context: String::new(),
                citations: Vec::new(),
                confidence: 0.0,
                entities_found: Vec::new(),
            });
        }

        let (context, citations) = self.build_context(&anchors, hops)?;
        let response = self.llm.complete_with_options(
            prompts::LOCAL_ANSWER_SYSTEM,
            &prompts::local_answer_user(query, &context),
            &CompletionOptions::default().with_max_tokens(1024),
        )?;
        let answer: LocalAnswer =
            serde_json::from_str(extract_json(&response)).map_err(|e| Error::Parse {
                operation: "local_answer".to_string(),
                cause: e.to_string(),
            })?;

        // Keep citations the model actually used, falling back to all anchors.
        let cited: Vec<Citation> = if answer.cited_entities.is_empty() {
            citations
        } else {
            let cited_set: HashSet<String> = answer
                .cited_entities
                .iter()
                .map(|n| n.trim().to_lowercase())
                .collect();
            let filtered: Vec<Citation> = citations
                .iter()
                .filter(|c| cited_set.contains(&c.entity_name.trim().to_lowercase()))
                .cloned()
                .collect();
            if filtered.is_empty() { citations } else { filtered }
        };

        Ok(LocalQueryResult {
            status: QueryStatus::Answered,
            answer: answer.answer,
            context,
            citations: cited,
            confidence: answer.confidence.clamp(0.0, 1.0),
            entities_found: anchors.into_iter().map(|e| e.name).collect(),
        })
    }

    /// Extracts names from the question and anchors them in the graph.
    fn anchor_entities(
        &self,
        query: &str,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<Entity>> {
        let names = match self.llm.complete_with_options(
            prompts::QUERY_ENTITY_SYSTEM,
            query,
            &CompletionOptions::default(),
        ) {
            Ok(response) => serde_json::from_str::<EntityList>(extract_json(&response))
                .map(|list| list.entities)
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "query entity extraction failed");
                Vec::new()
            },
        };

        if names.is_empty() {
            // Fall back to the most-mentioned entities within the filter.
            return self.graph.list_entities(FALLBACK_TOP_K, document_ids);
        }

        let mut all: Option<Vec<Entity>> = None;
        let mut anchors: Vec<Entity> = Vec::new();
        for name in names {
            if let Some(entity) = self.graph.find_entity_by_name(&name, None)? {
                anchors.push(entity);
                continue;
            }
            // Fuzzy pass over all entity names, loaded once.
            if all.is_none() {
                all = Some(self.graph.list_entities(100_000, document_ids)?);
            }
            let candidates = all.as_deref().unwrap_or_default();
            if let Some(entity) = best_fuzzy_match(&name, candidates, FUZZY_THRESHOLD) {
                anchors.push(entity.clone());
            }
        }
        let mut seen = HashSet::new();
        anchors.retain(|e| seen.insert(e.id.clone()));
        Ok(anchors)
    }

    /// Assembles the neighborhood context and its citations.
    fn build_context(
        &self,
        anchors: &[Entity],
        hops: usize,
    ) -> Result<(String, Vec<Citation>)> {
        let mut sections: Vec<String> = Vec::new();
        let mut citations: Vec<Citation> = Vec::new();

        for anchor in anchors {
            let mut lines = vec![format!(
                "## {} ({})\n{}",
                anchor.name, anchor.entity_type, anchor.description
            )];

            let mut layer: Vec<Entity> = vec![anchor.clone()];
            let mut visited: HashSet<_> = [anchor.id.clone()].into_iter().collect();
            for hop in 1..=hops {
                let mut next_layer: Vec<Entity> = Vec::new();
                for entity in &layer {
                    for rel in self.graph.relationships_of(&entity.id)? {
                        let (neighbor_id, direction) = if rel.source_id == entity.id {
                            (rel.target_id.clone(), "->")
                        } else {
                            (rel.source_id.clone(), "<-")
                        };
                        let Some(neighbor) = self.graph.get_entity(&neighbor_id)? else {
                            continue;
                        };
                        lines.push(format!(
                            "- {} {direction} [{} ({:.2})] {} ({}): {}",
                            entity.name,
                            rel.rel_type,
                            rel.confidence,
                            neighbor.name,
                            neighbor.entity_type,
                            neighbor.description,
                        ));
                        if visited.insert(neighbor_id) && hop < hops {
                            next_layer.push(neighbor);
                        }
                    }
                }
                layer = next_layer;
            }

            let mut chunk_id = None;
            for unit in self.graph.mention_texts(&anchor.id, SNIPPETS_PER_ENTITY)? {
                lines.push(format!("> {}", unit.text));
                chunk_id.get_or_insert(unit.id);
            }
            citations.push(Citation {
                entity_name: anchor.name.clone(),
                chunk_id,
            });
            sections.push(lines.join("\n"));
        }

        Ok((sections.join("\n\n"), citations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityMention, EntityType, Relationship, TextUnit};
    use crate::storage::InMemoryGraphStore;
    use std::sync::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| (*s).to_string()).collect()),
            })
        }
    }

    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn complete_with_options(
            &self,
            _system: &str,
            _user: &str,
            _options: &CompletionOptions,
        ) -> Result<String> {
            self.responses
                .lock()
                .expect("lock")
                .pop()
                .ok_or_else(|| Error::failed("scripted_llm", "no more responses"))
        }
    }

    fn founding_graph() -> Arc<InMemoryGraphStore> {
        let store = Arc::new(InMemoryGraphStore::new());
        store
            .put_text_unit(&TextUnit {
                id: "doc_chunk_0".to_string(),
                document_id: "doc".to_string(),
                text: "Apple was founded by Steve Jobs in Cupertino.".to_string(),
                start_char: 0,
                end_char: 45,
            })
            .expect("tu");
        let apple = store
            .upsert_entity(&Entity::new("Apple", EntityType::Organization, "Tech company", 0.9))
            .expect("apple");
        let jobs = store
            .upsert_entity(&Entity::new("Steve Jobs", EntityType::Person, "Co-founder", 0.95))
            .expect("jobs");
        for id in [&apple.id, &jobs.id] {
            store
                .create_mention(&EntityMention {
                    entity_id: id.clone(),
                    textunit_id: "doc_chunk_0".to_string(),
                })
                .expect("mention");
        }
        store
            .upsert_relationship(&Relationship::new(
                jobs.id,
                apple.id,
                "FOUNDED",
                "Founded the company",
                0.9,
            ))
            .expect("rel");
        store
    }

    #[test]
    fn answers_with_citations_for_anchored_entities() {
        let store = founding_graph();
        let llm = ScriptedLlm::new(&[
            r#"{"entities": ["Apple"]}"#,
            r#"{"answer": "Apple was founded by Steve Jobs.", "confidence": 0.92,
                "cited_entities": ["Apple", "Steve Jobs"]}"#,
        ]);
        let engine = LocalQueryEngine::new(store, llm);
        let result = engine.run("Who founded Apple?", 1, None).expect("run");
        assert_eq!(result.status, QueryStatus::Answered);
        assert!(result.answer.contains("Steve Jobs"));
        assert!(result.entities_found.contains(&"Apple".to_string()));
        assert!(!result.citations.is_empty());
        assert_eq!(result.citations[0].chunk_id.as_deref(), Some("doc_chunk_0"));
        assert!(result.context.contains("FOUNDED"));
    }

    #[test]
    fn no_matching_entities_skips_the_answer_call() {
        let store = Arc::new(InMemoryGraphStore::new());
        // Only the entity-extraction response is scripted; an answer call
        // would exhaust the script and fail the test.
        let llm = ScriptedLlm::new(&[r#"{"entities": ["Nonexistent"]}"#]);
        let engine = LocalQueryEngine::new(store, llm);
        let result = engine.run("Who is Nonexistent?", 1, None).expect("run");
        assert_eq!(result.status, QueryStatus::NoEntitiesFound);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn fuzzy_anchoring_recovers_near_miss_names() {
        let store = founding_graph();
        let llm = ScriptedLlm::new(&[
            r#"{"entities": ["Steven Jobs"]}"#,
            r#"{"answer": "Steve Jobs co-founded Apple.", "confidence": 0.8, "cited_entities": []}"#,
        ]);
        let engine = LocalQueryEngine::new(store, llm);
        let result = engine.run("What did Steven Jobs do?", 1, None).expect("run");
        assert_eq!(result.status, QueryStatus::Answered);
        assert_eq!(result.entities_found, vec!["Steve Jobs".to_string()]);
    }
}
