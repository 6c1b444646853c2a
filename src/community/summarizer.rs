//! LLM community report generation.
//!
//! Builds a context block per community (top members, internal
//! relationships, child summaries, optional source snippets) and asks the
//! LLM for a structured report. Individual failures are logged and skipped;
//! the run continues.

use crate::llm::{CompletionOptions, LlmProvider, extract_json, prompts};
use crate::models::{Community, CommunityReport};
use crate::storage::GraphStore;
use crate::{Error, Result};
use std::sync::Arc;

/// Members included in a report context.
const MAX_MEMBERS: usize = 20;
/// Internal relationships included in a report context.
const MAX_RELATIONSHIPS: usize = 30;
/// Source snippets included in a report context.
const MAX_SNIPPETS: usize = 3;

/// Counters for one summarization run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryStats {
    /// Reports written.
    pub summarized: usize,
    /// Communities skipped after a failure.
    pub failed: usize,
}

/// Community summarization service.
pub struct CommunitySummarizer {
    llm: Arc<dyn LlmProvider>,
    include_snippets: bool,
}

impl CommunitySummarizer {
    /// Creates a summarizer.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            include_snippets: true,
        }
    }

    /// Disables source-text snippets in report contexts.
    #[must_use]
    pub const fn without_snippets(mut self) -> Self {
        self.include_snippets = false;
        self
    }

    /// Summarizes every community, leaves first, so parent reports can quote
    /// child summaries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; per-community LLM failures are
    /// counted and skipped.
    pub fn summarize_all(&self, store: &dyn GraphStore) -> Result<SummaryStats> {
        let mut communities = store.list_communities(None)?;
        communities.sort_by_key(|c| c.level);
        self.summarize_list(store, &communities)
    }

    /// Summarizes only the given `(id, level)` communities, leaves first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn summarize_targets(
        &self,
        store: &dyn GraphStore,
        targets: &[(i64, u32)],
    ) -> Result<SummaryStats> {
        let mut communities = Vec::new();
        for (id, level) in targets {
            if let Some(community) = store.get_community(*id, *level)? {
                communities.push(community);
            }
        }
        communities.sort_by_key(|c| c.level);
        self.summarize_list(store, &communities)
    }

    fn summarize_list(
        &self,
        store: &dyn GraphStore,
        communities: &[Community],
    ) -> Result<SummaryStats> {
        let mut stats = SummaryStats::default();
        for community in communities {
            match self.summarize_one(store, community) {
                Ok(()) => stats.summarized += 1,
                Err(e) => {
                    tracing::warn!(
                        community = community.id,
                        level = community.level,
                        error = %e,
                        "community summarization failed, skipping"
                    );
                    stats.failed += 1;
                },
            }
        }
        Ok(stats)
    }

    fn summarize_one(&self, store: &dyn GraphStore, community: &Community) -> Result<()> {
        let members = store.community_members(community.id, community.level, MAX_MEMBERS)?;
        if members.is_empty() {
            return Err(Error::failed(
                "summarize_community",
                "community has no members",
            ));
        }

        let member_lines: Vec<String> = members
            .iter()
            .map(|m| {
                format!(
                    "- {} ({}): {} [{} mentions]",
                    m.name,
                    m.entity_type,
                    m.description,
                    m.mention_count
                )
            })
            .collect();

        let member_ids: Vec<_> = members.iter().map(|m| m.id.clone()).collect();
        let mut relationships = store.relationships_among(&member_ids)?;
        relationships.sort_by(|a, b| b.weight.cmp(&a.weight));
        relationships.truncate(MAX_RELATIONSHIPS);
        let by_id: std::collections::HashMap<_, _> =
            members.iter().map(|m| (m.id.clone(), m.name.clone())).collect();
        let relationship_lines: Vec<String> = relationships
            .iter()
            .map(|r| {
                format!(
                    "- {} -[{}]-> {}: {}",
                    by_id.get(&r.source_id).cloned().unwrap_or_default(),
                    r.rel_type,
                    by_id.get(&r.target_id).cloned().unwrap_or_default(),
                    r.description
                )
            })
            .collect();

        // Child summaries let parent reports roll up the hierarchy.
        let mut child_lines: Vec<String> = Vec::new();
        if community.level > 0 {
            for child in store.list_communities(Some(community.level - 1))? {
                if child.parent_id == Some(community.id) {
                    if let Some(summary) = &child.summary {
                        child_lines.push(format!("- Community {}: {summary}", child.id));
                    }
                }
            }
        }

        let mut snippet_lines: Vec<String> = Vec::new();
        if self.include_snippets {
            if let Some(top) = members.first() {
                for unit in store.mention_texts(&top.id, MAX_SNIPPETS)? {
                    snippet_lines.push(format!("> {}", unit.text));
                }
            }
        }

        let user = prompts::community_report_user(
            &member_lines.join("\n"),
            &relationship_lines.join("\n"),
            &child_lines.join("\n"),
            &snippet_lines.join("\n"),
        );
        let response = self.llm.complete_with_options(
            prompts::COMMUNITY_REPORT_SYSTEM,
            &user,
            &CompletionOptions::with_temperature(0.2).with_max_tokens(2048),
        )?;
        let report: CommunityReport =
            serde_json::from_str(extract_json(&response)).map_err(|e| Error::Parse {
                operation: "community_report".to_string(),
                cause: e.to_string(),
            })?;

        store.update_community_report(community.id, community.level, &report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, EntityType, Relationship};
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
        ) -> Result<String> {
            self.responses
                .lock()
                .expect("lock")
                .pop()
                .ok_or_else(|| Error::failed("scripted_llm", "no more responses"))
        }
    }

    fn seeded_store() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        let a = store
            .upsert_entity(&Entity::new("Acme", EntityType::Organization, "Widgets", 0.9))
            .expect("a");
        let b = store
            .upsert_entity(&Entity::new("Alice", EntityType::Person, "Engineer", 0.9))
            .expect("b");
        store
            .upsert_relationship(&Relationship::new(
                b.id.clone(),
                a.id.clone(),
                "WORKS_AT",
                "employment",
                0.9,
            ))
            .expect("rel");
        store
            .upsert_community(&Community::new(0, 0, 2))
            .expect("community");
        store.add_community_member(0, 0, &a.id, 0.95).expect("m1");
        store.add_community_member(0, 0, &b.id, 0.95).expect("m2");
        store
    }

    const REPORT: &str = r#"{"title": "Acme employment cluster",
        "summary": "Alice works at Acme.",
        "rating": 6.5, "significance": "MEDIUM",
        "themes": ["employment"],
        "findings": [{"summary": "Acme employs Alice", "explanation": "stated", "rating": 6.0}]}"#;

    #[test]
    fn report_is_persisted_on_the_community() {
        let store = seeded_store();
        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(vec![REPORT.to_string()]),
        });
        let summarizer = CommunitySummarizer::new(llm);
        let stats = summarizer.summarize_all(&store).expect("run");
        assert_eq!(stats.summarized, 1);
        assert_eq!(stats.failed, 0);

        let community = store.get_community(0, 0).expect("get").expect("exists");
        assert_eq!(community.title.as_deref(), Some("Acme employment cluster"));
        assert_eq!(community.themes, vec!["employment".to_string()]);
        assert_eq!(community.themes_csv(), "employment");
        assert!(community.summary_timestamp.is_some());
        assert!((community.rating.expect("rating") - 6.5).abs() < 1e-6);
    }

    #[test]
    fn failures_skip_the_community_and_continue() {
        let store = seeded_store();
        store
            .upsert_community(&Community::new(1, 0, 1))
            .expect("second community");
        let alice = store
            .find_entity_by_name("Alice", None)
            .expect("find")
            .expect("exists");
        store.add_community_member(1, 0, &alice.id, 0.95).expect("m");

        // First call returns garbage, second a valid report.
        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(vec![REPORT.to_string(), "not json at all".to_string()]),
        });
        let summarizer = CommunitySummarizer::new(llm);
        let stats = summarizer.summarize_all(&store).expect("run");
        assert_eq!(stats.summarized, 1);
        assert_eq!(stats.failed, 1);
    }
}
