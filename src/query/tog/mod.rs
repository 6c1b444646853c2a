//! ToG multi-hop reasoning engine.
//!
//! Bounded tree search over the entity graph: ground topic entities, then at
//! each depth discover candidate relations, prune them to the search width,
//! expand each retained relation to its best target entity, and gate on
//! sufficiency. Work is bounded by `search_depth`, `search_width`, and
//! `num_retain_entity`; every per-step failure is logged, recorded on the
//! reasoning path, and survived.

pub mod pruning;

pub use pruning::{Bm25Pruner, EmbeddingPruner, LlmPruner, Pruner, ScoredItem, build_pruner};

use crate::Result;
use crate::embedding::Embedder;
use crate::indexing::best_fuzzy_match;
use crate::llm::{CompletionOptions, LlmProvider, extract_json, prompts};
use crate::models::{
    Entity, EntityId, QueryStatus, ReasoningStep, StepStatus, TogConfig, TogResult, Triplet,
};
use crate::storage::GraphStore;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Entity names fetched for topic grounding.
const GROUNDING_CANDIDATES: usize = 1000;
/// Confidence floor for relation discovery.
const RELATION_CONFIDENCE_FLOOR: f32 = 0.3;
/// Relation types considered per depth.
const RELATION_DISCOVERY_LIMIT: usize = 50;
/// Candidate targets considered per retained relation.
const CANDIDATES_PER_RELATION: usize = 20;
/// Source snippets included in answer synthesis.
const ANSWER_SNIPPETS: usize = 5;
/// Fuzzy threshold for grounding fallback.
const GROUNDING_FUZZY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Deserialize)]
struct EntityList {
    #[serde(default)]
    entities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SufficiencyVerdict {
    #[serde(default)]
    sufficient: bool,
}

#[derive(Debug, Deserialize)]
struct SynthesizedAnswer {
    answer: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning_summary: Option<String>,
}

/// The ToG engine.
pub struct TogEngine {
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
}

impl TogEngine {
    /// Creates an engine over shared backends.
    #[must_use]
    pub fn new(
        graph: Arc<dyn GraphStore>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            graph,
            llm,
            embedder,
        }
    }

    /// Answers a multi-hop question. Never fails outright: a top-level error
    /// degrades to a partial result carrying whatever path was traced.
    #[must_use]
    pub fn run(
        &self,
        query: &str,
        config: &TogConfig,
        document_ids: Option<&[String]>,
    ) -> TogResult {
        match self.run_inner(query, config, document_ids) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "tog run failed, returning partial result");
                TogResult {
                    status: QueryStatus::Partial,
                    answer: "Insufficient information to answer the question.".to_string(),
                    confidence: 0.1,
                    reasoning_summary: None,
                    topic_entities: Vec::new(),
                    reasoning_path: Vec::new(),
                    retrieved_triplets: Vec::new(),
                }
            },
        }
    }

    fn run_inner(
        &self,
        query: &str,
        config: &TogConfig,
        document_ids: Option<&[String]>,
    ) -> Result<TogResult> {
        let topic_entities = self.ground_topic_entities(query, config, document_ids)?;
        if topic_entities.is_empty() {
            return Ok(TogResult {
                status: QueryStatus::NoEntitiesFound,
                answer: "No entities in the graph match this question.".to_string(),
                confidence: 0.0,
                reasoning_summary: None,
                topic_entities: Vec::new(),
                reasoning_path: Vec::new(),
                retrieved_triplets: Vec::new(),
            });
        }
        let topic_names: Vec<String> = topic_entities.iter().map(|e| e.name.clone()).collect();

        let mut explored_entities: HashSet<EntityId> =
            topic_entities.iter().map(|e| e.id.clone()).collect();
        let mut explored_relations: HashSet<String> = HashSet::new();
        let mut triplet_keys: HashSet<(String, String, String)> = HashSet::new();
        let mut triplets: Vec<Triplet> = Vec::new();
        let mut path: Vec<ReasoningStep> = Vec::new();
        let mut frontier: Vec<Entity> = topic_entities;

        for depth in 1..=config.search_depth {
            let step = self.explore_depth(
                query,
                config,
                document_ids,
                depth,
                &frontier,
                &mut explored_entities,
                &mut explored_relations,
                &mut triplet_keys,
                &mut triplets,
            );
            match step {
                Ok((mut step, new_frontier)) => {
                    let stop = matches!(step.status, StepStatus::Sufficient | StepStatus::Exhausted);
                    if !stop {
                        let mut next = new_frontier;
                        next.truncate(config.num_retain_entity);
                        if next.is_empty() {
                            step.status = StepStatus::Exhausted;
                            path.push(step);
                            break;
                        }
                        frontier = next;
                    }
                    path.push(step);
                    if stop {
                        break;
                    }
                },
                Err(e) => {
                    tracing::warn!(depth, error = %e, "depth exploration failed, continuing");
                    path.push(ReasoningStep {
                        depth,
                        frontier: frontier.iter().map(|e| e.name.clone()).collect(),
                        selected_relations: Vec::new(),
                        new_triplets: Vec::new(),
                        status: StepStatus::Failed,
                        detail: Some(e.to_string()),
                    });
                },
            }
        }

        self.synthesize(query, config, &topic_names, &explored_entities, path, triplets)
    }

    /// Grounds topic entities: LLM selection over the most-mentioned entity
    /// names, with a fuzzy fallback over question tokens.
    fn ground_topic_entities(
        &self,
        query: &str,
        config: &TogConfig,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<Entity>> {
        let candidates = self.graph.list_entities(GROUNDING_CANDIDATES, document_ids)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let listing = candidates
            .iter()
            .map(|e| format!("- {} ({})", e.name, e.entity_type))
            .collect::<Vec<_>>()
            .join("\n");
        let mut grounded: Vec<Entity> = Vec::new();
        let mut missed = false;

        match self.llm.complete_with_options(
            prompts::TOPIC_GROUNDING_SYSTEM,
            &prompts::topic_grounding_user(query, &listing),
            &CompletionOptions::with_temperature(config.exploration_temperature),
        ) {
            Ok(response) => {
                let parsed: EntityList =
                    serde_json::from_str(extract_json(&response)).unwrap_or(EntityList {
                        entities: Vec::new(),
                    });
                for name in parsed.entities {
                    let folded = name.trim().to_lowercase();
                    match candidates.iter().find(|e| {
                        e.name.trim().to_lowercase() == folded
                            || e.aliases.iter().any(|a| a.trim().to_lowercase() == folded)
                    }) {
                        Some(entity) => grounded.push(entity.clone()),
                        None => missed = true,
                    }
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "topic grounding call failed, using fuzzy fallback");
                missed = true;
            },
        }

        // Fallback: fuzzy-match question tokens against the candidate list.
        if grounded.is_empty() || missed {
            for token in question_tokens(query) {
                if let Some(entity) =
                    best_fuzzy_match(&token, &candidates, GROUNDING_FUZZY_THRESHOLD)
                {
                    grounded.push(entity.clone());
                }
            }
        }

        let mut seen: HashSet<EntityId> = HashSet::new();
        grounded.retain(|e| seen.insert(e.id.clone()));
        grounded.truncate(config.num_retain_entity.max(1));
        Ok(grounded)
    }

    /// One depth of exploration. Returns the recorded step and the next
    /// frontier (empty when the step stops the traversal).
    #[allow(clippy::too_many_arguments)]
    fn explore_depth(
        &self,
        query: &str,
        config: &TogConfig,
        document_ids: Option<&[String]>,
        depth: usize,
        frontier: &[Entity],
        explored_entities: &mut HashSet<EntityId>,
        explored_relations: &mut HashSet<String>,
        triplet_keys: &mut HashSet<(String, String, String)>,
        triplets: &mut Vec<Triplet>,
    ) -> Result<(ReasoningStep, Vec<Entity>)> {
        let frontier_ids: Vec<EntityId> = frontier.iter().map(|e| e.id.clone()).collect();
        let frontier_names: Vec<String> = frontier.iter().map(|e| e.name.clone()).collect();

        // a. Relation discovery.
        let mut relations: Vec<String> = self
            .graph
            .relation_types_for(
                &frontier_ids,
                RELATION_CONFIDENCE_FLOOR,
                RELATION_DISCOVERY_LIMIT,
            )?
            .into_iter()
            .map(|(rel_type, _)| rel_type)
            .filter(|rel_type| !explored_relations.contains(rel_type))
            .collect();
        if relations.is_empty() {
            return Ok((
                ReasoningStep {
                    depth,
                    frontier: frontier_names,
                    selected_relations: Vec::new(),
                    new_triplets: Vec::new(),
                    status: StepStatus::Exhausted,
                    detail: Some("no unexplored relations".to_string()),
                },
                Vec::new(),
            ));
        }

        // b. Relation scoring: retain the top W.
        let relation_pruner = build_pruner(
            config.pruning_method,
            &self.llm,
            &self.embedder,
            prompts::RELATION_SCORING_SYSTEM,
            config.exploration_temperature,
        );
        let context = format!(
            "Frontier entities: {}\nRelations already explored: {}",
            frontier_names.join(", "),
            explored_relations
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        );
        let mut scored = relation_pruner.score(query, &relations, &context)?;
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item.cmp(&b.item))
        });
        scored.truncate(config.search_width);
        let selected: Vec<String> = scored.into_iter().map(|s| s.item).collect();
        relations = selected.clone();

        // c/d. Entity expansion and triplet recording.
        let entity_pruner = build_pruner(
            config.pruning_method,
            &self.llm,
            &self.embedder,
            prompts::ENTITY_SCORING_SYSTEM,
            config.exploration_temperature,
        );
        let mut new_frontier: Vec<Entity> = Vec::new();
        let mut step_triplets: Vec<Triplet> = Vec::new();
        for rel_type in &relations {
            let candidates = self.graph.relation_targets(
                &frontier_ids,
                rel_type,
                document_ids,
                CANDIDATES_PER_RELATION,
            )?;
            let fresh: Vec<&crate::storage::RelationTarget> = candidates
                .iter()
                .filter(|c| !explored_entities.contains(&c.target.id))
                .collect();
            if fresh.is_empty() {
                continue;
            }

            // Skip the scoring call when the choice is forced.
            let chosen = if fresh.len() == 1 {
                fresh[0]
            } else {
                let names: Vec<String> = fresh.iter().map(|c| c.target.name.clone()).collect();
                match entity_pruner.score(
                    query,
                    &names,
                    &format!("Relation being followed: {rel_type}"),
                ) {
                    Ok(mut scores) => {
                        scores.sort_by(|a, b| {
                            b.score
                                .partial_cmp(&a.score)
                                .unwrap_or(std::cmp::Ordering::Equal)
                                .then_with(|| a.item.cmp(&b.item))
                        });
                        let best = scores.first().map(|s| s.item.clone()).unwrap_or_default();
                        fresh
                            .iter()
                            .find(|c| c.target.name == best)
                            .copied()
                            .unwrap_or(fresh[0])
                    },
                    Err(e) => {
                        tracing::warn!(relation = %rel_type, error = %e, "entity scoring failed, taking top candidate");
                        fresh[0]
                    },
                }
            };

            let triplet = Triplet {
                subject: chosen.source_name.clone(),
                relation: rel_type.clone(),
                object: chosen.target.name.clone(),
                confidence: chosen.confidence,
                source: format!("depth_{depth}"),
            };
            if triplet_keys.insert(triplet.key()) {
                triplets.push(triplet.clone());
                step_triplets.push(triplet);
            }
            explored_entities.insert(chosen.target.id.clone());
            new_frontier.push(chosen.target.clone());
        }

        for rel_type in &relations {
            explored_relations.insert(rel_type.clone());
        }

        if step_triplets.is_empty() {
            return Ok((
                ReasoningStep {
                    depth,
                    frontier: frontier_names,
                    selected_relations: selected,
                    new_triplets: Vec::new(),
                    status: StepStatus::Exhausted,
                    detail: Some("no expandable candidates".to_string()),
                },
                Vec::new(),
            ));
        }

        // e. Sufficiency gate.
        let mut status = StepStatus::Expanded;
        if config.enable_sufficiency_check && self.is_sufficient(query, triplets) {
            status = StepStatus::Sufficient;
        }

        Ok((
            ReasoningStep {
                depth,
                frontier: frontier_names,
                selected_relations: selected,
                new_triplets: step_triplets,
                status,
                detail: None,
            },
            new_frontier,
        ))
    }

    /// Sufficiency gate; failures count as "not sufficient".
    fn is_sufficient(&self, query: &str, triplets: &[Triplet]) -> bool {
        let rendered = render_triplets(triplets);
        match self.llm.complete_with_options(
            prompts::SUFFICIENCY_SYSTEM,
            &prompts::sufficiency_user(query, &rendered),
            &CompletionOptions::default(),
        ) {
            Ok(response) => serde_json::from_str::<SufficiencyVerdict>(extract_json(&response))
                .map(|v| v.sufficient)
                .unwrap_or(false),
            Err(e) => {
                tracing::warn!(error = %e, "sufficiency check failed, continuing exploration");
                false
            },
        }
    }

    /// Final answer synthesis from the reasoning path and source snippets.
    fn synthesize(
        &self,
        query: &str,
        config: &TogConfig,
        topic_names: &[String],
        explored_entities: &HashSet<EntityId>,
        path: Vec<ReasoningStep>,
        triplets: Vec<Triplet>,
    ) -> Result<TogResult> {
        let rendered_path = self.render_path(&path)?;
        let mut snippets: Vec<String> = Vec::new();
        let mut ordered: Vec<&EntityId> = explored_entities.iter().collect();
        ordered.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        'outer: for id in ordered {
            for unit in self.graph.mention_texts(id, 1)? {
                snippets.push(format!("> {}", unit.text));
                if snippets.len() >= ANSWER_SNIPPETS {
                    break 'outer;
                }
            }
        }

        let response = self.llm.complete_with_options(
            prompts::TOG_ANSWER_SYSTEM,
            &prompts::tog_answer_user(query, &rendered_path, &snippets.join("\n")),
            &CompletionOptions::with_temperature(config.reasoning_temperature),
        );

        match response
            .and_then(|r| {
                serde_json::from_str::<SynthesizedAnswer>(extract_json(&r)).map_err(|e| {
                    crate::Error::Parse {
                        operation: "tog_answer".to_string(),
                        cause: e.to_string(),
                    }
                })
            }) {
            Ok(answer) => Ok(TogResult {
                status: QueryStatus::Answered,
                answer: answer.answer,
                confidence: answer.confidence.clamp(0.0, 1.0),
                reasoning_summary: answer.reasoning_summary,
                topic_entities: topic_names.to_vec(),
                reasoning_path: path,
                retrieved_triplets: triplets,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "answer synthesis failed, returning partial result");
                Ok(TogResult {
                    status: QueryStatus::Partial,
                    answer: "Insufficient information to answer the question.".to_string(),
                    confidence: 0.1,
                    reasoning_summary: None,
                    topic_entities: topic_names.to_vec(),
                    reasoning_path: path,
                    retrieved_triplets: triplets,
                })
            },
        }
    }

    /// Renders `source (desc) --[rel]--> target (desc)` lines.
    fn render_path(&self, path: &[ReasoningStep]) -> Result<String> {
        let mut lines = Vec::new();
        for step in path {
            for triplet in &step.new_triplets {
                let describe = |name: &str| -> Result<String> {
                    Ok(self
                        .graph
                        .find_entity_by_name(name, None)?
                        .map(|e| truncate(&e.description, 80))
                        .filter(|d| !d.is_empty())
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default())
                };
                lines.push(format!(
                    "{}{} --[{}]--> {}{}",
                    triplet.subject,
                    describe(&triplet.subject)?,
                    triplet.relation,
                    triplet.object,
                    describe(&triplet.object)?,
                ));
            }
        }
        Ok(lines.join("\n"))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect::<String>() + "…"
    }
}

fn render_triplets(triplets: &[Triplet]) -> String {
    triplets
        .iter()
        .map(|t| format!("({}, {}, {})", t.subject, t.relation, t.object))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Candidate tokens from the question for fuzzy grounding: words and
/// adjacent word pairs, longest first.
fn question_tokens(query: &str) -> Vec<String> {
    let words: Vec<&str> = query
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| w.len() > 2)
        .collect();
    let mut tokens: Vec<String> = Vec::new();
    for pair in words.windows(2) {
        tokens.push(pair.join(" "));
    }
    tokens.extend(words.iter().map(|w| (*w).to_string()));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_tokens_include_words_and_pairs() {
        let tokens = question_tokens("Where does Alice Smith work?");
        assert!(tokens.contains(&"Alice Smith".to_string()));
        assert!(tokens.contains(&"Alice".to_string()));
        assert!(!tokens.contains(&"is".to_string()));
    }

    #[test]
    fn truncate_preserves_short_strings() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd…");
    }
}
