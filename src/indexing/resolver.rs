//! Entity resolution: fuzzy + LLM-assisted deduplication.
//!
//! Three-tier check over same-type entity pairs, invoked after a document's
//! extraction completes:
//!
//! 1. Name similarity below the floor: not a duplicate, skip.
//! 2. Similarity at or above the auto-merge threshold: merge immediately.
//! 3. In between: ask the LLM to disambiguate; merge only on a confident
//!    same-entity verdict.
//!
//! The merge itself is the store's transactional
//! [`crate::storage::GraphStore::merge_entities`].

use crate::config::ResolutionConfig;
use crate::llm::{CompletionOptions, LlmProvider, extract_json, prompts};
use crate::models::{Entity, EntityId};
use crate::Result;
use crate::storage::GraphStore;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Name similarity in [0, 1] over case-folded, whitespace-trimmed names.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::sorensen_dice(&a.trim().to_lowercase(), &b.trim().to_lowercase())
}

/// Best fuzzy match for `name` among `candidates`, if any clears the
/// threshold.
#[must_use]
pub fn best_fuzzy_match<'a>(
    name: &str,
    candidates: &'a [Entity],
    threshold: f64,
) -> Option<&'a Entity> {
    let mut best: Option<(&Entity, f64)> = None;
    for candidate in candidates {
        let score = candidate
            .aliases
            .iter()
            .map(|a| name_similarity(name, a))
            .fold(name_similarity(name, &candidate.name), f64::max);
        if score >= threshold && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(entity, _)| entity)
}

/// Outcome counters for one resolution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    /// Same-type pairs that cleared the similarity floor.
    pub pairs_considered: usize,
    /// Merges from the auto-merge tier.
    pub auto_merged: usize,
    /// Merges approved by the LLM tier.
    pub llm_merged: usize,
}

impl ResolutionStats {
    /// Total entities merged away.
    #[must_use]
    pub const fn merged(&self) -> usize {
        self.auto_merged + self.llm_merged
    }
}

#[derive(Debug, Deserialize)]
struct ResolutionVerdict {
    are_same: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    suggested_canonical_name: Option<String>,
}

/// Entity resolution service.
pub struct Resolver {
    config: ResolutionConfig,
    llm: Option<Arc<dyn LlmProvider>>,
}

impl Resolver {
    /// Creates a resolver. Pass `None` to disable the LLM tier regardless of
    /// configuration.
    #[must_use]
    pub fn new(config: ResolutionConfig, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { config, llm }
    }

    /// Resolves duplicates among `touched` entities against the whole graph.
    ///
    /// `touched` is typically the set of entity ids a document's extraction
    /// just created or updated; each is compared against all same-type
    /// entities in the store.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails; LLM failures demote the
    /// pair to "not merged" and are logged.
    pub fn resolve(&self, store: &dyn GraphStore, touched: &[EntityId]) -> Result<ResolutionStats> {
        let mut stats = ResolutionStats::default();
        if !self.config.enabled || touched.is_empty() {
            return Ok(stats);
        }

        let all = store.list_entities(100_000, None)?;
        let touched_set: HashSet<&EntityId> = touched.iter().collect();
        let mut absorbed: HashSet<EntityId> = HashSet::new();

        for id in touched {
            if absorbed.contains(id) {
                continue;
            }
            let Some(entity) = store.get_entity(id)? else {
                continue; // already merged away by an earlier pair
            };

            for candidate in &all {
                if candidate.id == *id
                    || absorbed.contains(&candidate.id)
                    || candidate.entity_type != entity.entity_type
                {
                    continue;
                }
                // Process each unordered pair once when both sides are new.
                if touched_set.contains(&candidate.id) && candidate.id.as_str() < id.as_str() {
                    continue;
                }
                let Some(current) = store.get_entity(id)? else {
                    break;
                };
                let similarity = name_similarity(&current.name, &candidate.name);
                if similarity < self.config.similarity_threshold {
                    continue;
                }
                stats.pairs_considered += 1;

                if similarity >= self.config.auto_merge_threshold {
                    self.merge_pair(store, &current, candidate, None)?;
                    absorbed.insert(candidate.id.clone());
                    stats.auto_merged += 1;
                    continue;
                }

                if self.config.llm_resolution {
                    if let Some(verdict) = self.disambiguate(&current, candidate) {
                        if verdict.are_same && verdict.confidence >= self.config.llm_merge_threshold
                        {
                            self.merge_pair(
                                store,
                                &current,
                                candidate,
                                verdict.suggested_canonical_name.as_deref(),
                            )?;
                            absorbed.insert(candidate.id.clone());
                            stats.llm_merged += 1;
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Merges the lower-mention entity into the higher-mention one.
    fn merge_pair(
        &self,
        store: &dyn GraphStore,
        a: &Entity,
        b: &Entity,
        canonical_name: Option<&str>,
    ) -> Result<()> {
        let (primary, duplicate) = if b.mention_count > a.mention_count {
            (b, a)
        } else {
            (a, b)
        };
        tracing::info!(
            primary = %primary.name,
            duplicate = %duplicate.name,
            "merging duplicate entities"
        );
        store.merge_entities(
            &primary.id,
            std::slice::from_ref(&duplicate.id),
            canonical_name,
        )?;
        Ok(())
    }

    /// LLM disambiguation; any failure yields `None`.
    fn disambiguate(&self, a: &Entity, b: &Entity) -> Option<ResolutionVerdict> {
        let llm = self.llm.as_ref()?;
        let user = prompts::entity_resolution_user(
            &a.name,
            &a.description,
            &b.name,
            &b.description,
            a.entity_type.as_str(),
        );
        let response = match llm.complete_with_options(
            prompts::ENTITY_RESOLUTION_SYSTEM,
            &user,
            &CompletionOptions::default(),
        ) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "entity disambiguation call failed");
                return None;
            },
        };
        match serde_json::from_str::<ResolutionVerdict>(extract_json(&response)) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable disambiguation verdict");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::EntityType;
    use crate::storage::InMemoryGraphStore;
    use std::sync::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
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
        ) -> crate::Result<String> {
            self.responses
                .lock()
                .expect("lock")
                .pop()
                .ok_or_else(|| Error::failed("scripted_llm", "no more responses"))
        }
    }

    fn seeded_store(names: &[(&str, EntityType)]) -> (InMemoryGraphStore, Vec<EntityId>) {
        let store = InMemoryGraphStore::new();
        let ids = names
            .iter()
            .map(|(name, t)| {
                store
                    .upsert_entity(&Entity::new(*name, t.clone(), "", 0.9))
                    .expect("upsert")
                    .id
            })
            .collect();
        (store, ids)
    }

    #[test]
    fn similarity_is_symmetric_and_case_insensitive() {
        assert!((name_similarity("Apple", "apple") - 1.0).abs() < f64::EPSILON);
        let a = name_similarity("Apple Inc", "Apple Incorporated");
        let b = name_similarity("Apple Incorporated", "Apple Inc");
        assert!((a - b).abs() < f64::EPSILON);
        assert!(a > 0.5);
    }

    #[test]
    fn near_identical_names_auto_merge() {
        let (store, ids) = seeded_store(&[
            ("Apple Incorporated", EntityType::Organization),
            ("Apple Incorporated.", EntityType::Organization),
        ]);
        let sim = name_similarity("Apple Incorporated", "Apple Incorporated.");
        assert!(sim >= 0.95, "fixture drifted: {sim}");
        let resolver = Resolver::new(
            ResolutionConfig {
                llm_resolution: false,
                ..ResolutionConfig::default()
            },
            None,
        );
        let stats = resolver.resolve(&store, &ids).expect("resolve");
        assert_eq!(stats.auto_merged, 1);
        assert_eq!(store.stats().expect("stats").entities, 1);
    }

    #[test]
    fn different_types_never_pair() {
        let (store, ids) = seeded_store(&[
            ("Washington", EntityType::Person),
            ("Washington", EntityType::Location),
        ]);
        let resolver = Resolver::new(ResolutionConfig::default(), None);
        let stats = resolver.resolve(&store, &ids).expect("resolve");
        assert_eq!(stats.pairs_considered, 0);
        assert_eq!(store.stats().expect("stats").entities, 2);
    }

    #[test]
    fn llm_tier_merges_on_confident_verdict() {
        let (store, ids) = seeded_store(&[
            ("Big Blue Company", EntityType::Organization),
            ("Big Blue Comp", EntityType::Organization),
        ]);
        // Similarity lands between the floor and auto-merge threshold.
        let sim = name_similarity("Big Blue Company", "Big Blue Comp");
        assert!(sim >= 0.85 && sim < 0.95, "fixture drifted: {sim}");

        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(vec![
                r#"{"are_same": true, "confidence": 0.97, "suggested_canonical_name": "Big Blue"}"#
                    .to_string(),
            ]),
        });
        let resolver = Resolver::new(ResolutionConfig::default(), Some(llm));
        let stats = resolver.resolve(&store, &ids).expect("resolve");
        assert_eq!(stats.llm_merged, 1);
        let survivor = store
            .find_entity_by_name("Big Blue", Some(&EntityType::Organization))
            .expect("find")
            .expect("exists");
        assert_eq!(survivor.mention_count, 2);
    }

    #[test]
    fn unconfident_llm_verdict_keeps_both() {
        let (store, ids) = seeded_store(&[
            ("Big Blue Company", EntityType::Organization),
            ("Big Blue Comp", EntityType::Organization),
        ]);
        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(vec![
                r#"{"are_same": true, "confidence": 0.4}"#.to_string(),
            ]),
        });
        let resolver = Resolver::new(ResolutionConfig::default(), Some(llm));
        let stats = resolver.resolve(&store, &ids).expect("resolve");
        assert_eq!(stats.merged(), 0);
        assert_eq!(store.stats().expect("stats").entities, 2);
    }

    #[test]
    fn disabled_resolution_is_a_no_op() {
        let (store, ids) = seeded_store(&[
            ("Apple Incorporated", EntityType::Organization),
            ("Apple Incorporated.", EntityType::Organization),
        ]);
        let resolver = Resolver::new(
            ResolutionConfig {
                enabled: false,
                ..ResolutionConfig::default()
            },
            None,
        );
        let stats = resolver.resolve(&store, &ids).expect("resolve");
        assert_eq!(stats.pairs_considered, 0);
        assert_eq!(store.stats().expect("stats").entities, 2);
    }
}
