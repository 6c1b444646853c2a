//! Local and global query engine integration tests.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{GENERIC_REPORT, Harness, RoutedLlm, markers};
use graphlore::models::{Community, GlobalMode, QueryStatus};
use graphlore::storage::GraphStore;

const FOUNDING_DOC: &str = "Apple was founded by Steve Jobs in Cupertino.";

const FOUNDING_EXTRACTION: &str = "\
ENTITY|Apple|ORGANIZATION|Technology company|0.9
ENTITY|Steve Jobs|PERSON|Co-founder of Apple|0.95
ENTITY|Cupertino|LOCATION|City in California|0.85
RELATIONSHIP|Steve Jobs|Apple|FOUNDED|Founded the company|9
RELATIONSHIP|Apple|Cupertino|LOCATED_IN|Headquarters location|8
<COMPLETE>";

#[test]
fn local_query_answers_with_entity_and_chunk_citations() {
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, FOUNDING_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT)
        .route(markers::QUERY_ENTITIES, r#"{"entities": ["Apple"]}"#)
        .route(
            markers::LOCAL_ANSWER,
            r#"{"answer": "Apple was founded by Steve Jobs.", "confidence": 0.9,
                "cited_entities": ["Apple", "Steve Jobs"]}"#,
        );
    let harness = Harness::new(llm);
    harness
        .pipeline
        .index_document("doc1", "founding.md", "/founding.md", FOUNDING_DOC)
        .expect("index");

    let result = harness
        .queries
        .local_query("Who founded Apple?", 1, None)
        .expect("query");

    assert_eq!(result.status, QueryStatus::Answered);
    assert!(result.answer.contains("Steve Jobs"));
    assert!(result.entities_found.contains(&"Apple".to_string()));
    assert!(
        result
            .citations
            .iter()
            .any(|c| c.entity_name == "Apple" && c.chunk_id.as_deref() == Some("doc1_chunk_0"))
    );
    // The context carries the anchored neighborhood.
    assert!(result.context.contains("FOUNDED"));
    assert!(result.context.contains("Steve Jobs"));

    // The query landed in the history table.
    let history = harness.queries.history(10).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, "local");
}

#[test]
fn local_query_with_no_anchors_never_calls_the_answer_model() {
    let llm = RoutedLlm::new().route(markers::QUERY_ENTITIES, r#"{"entities": []}"#);
    let harness = Harness::new(llm);

    let result = harness
        .queries
        .local_query("Who founded Nothingville?", 1, None)
        .expect("query");
    assert_eq!(result.status, QueryStatus::NoEntitiesFound);
    assert_eq!(harness.llm.calls_matching("knowledge-graph context"), 0);
}

fn seed_summarized_communities(harness: &Harness, count: i64) {
    for id in 0..count {
        let mut community = Community::new(id, 0, 3);
        community.summary = Some(format!("Cluster {id} is about topic {id}."));
        community.themes = vec![format!("topic-{id}")];
        community.rating = Some(5.0);
        harness.graph.upsert_community(&community).expect("community");
    }
}

const MAP_REPLY: &str = r#"{"relevant_communities": [1, 2], "summary": "Topics one and two matter.",
    "key_points": ["one", "two"], "confidence": "high"}"#;
const REDUCE_REPLY: &str = r#"{"answer": "The corpus covers topics one and two.",
    "key_insights": ["topic one dominates"], "supporting_communities": [1, 2],
    "confidence_score": 0.8, "limitations": "summaries only"}"#;

#[test]
fn global_query_auto_triggers_map_reduce_at_25_communities() {
    let llm = RoutedLlm::new()
        .route_sticky(markers::GLOBAL_MAP, MAP_REPLY)
        .route(markers::GLOBAL_REDUCE, REDUCE_REPLY);
    let harness = Harness::new(llm);
    seed_summarized_communities(&harness, 25);

    let result = harness
        .queries
        .global_query("What does the corpus cover?", None, None)
        .expect("query");

    assert_eq!(result.mode, GlobalMode::MapReduce);
    assert_eq!(result.num_communities, 25);
    assert_eq!(result.num_batches, 25_usize.div_ceil(10));
    assert_eq!(result.supporting_communities, vec![1, 2]);
    assert_eq!(harness.llm.calls_matching("assess which communities"), 3);
    assert_eq!(
        harness.llm.calls_matching("synthesize intermediate"),
        1,
        "one reduce call after the map batches"
    );
}

#[test]
fn global_query_below_threshold_uses_single_shot() {
    let llm = RoutedLlm::new().route(
        markers::GLOBAL_SINGLE,
        r#"{"answer": "Small corpus answer.", "key_insights": [],
            "supporting_communities": [0], "confidence_score": 0.6}"#,
    );
    let harness = Harness::new(llm);
    seed_summarized_communities(&harness, 4);

    let result = harness
        .queries
        .global_query("What does the corpus cover?", None, None)
        .expect("query");
    assert_eq!(result.mode, GlobalMode::SingleShot);
    assert_eq!(result.num_batches, 0);
    assert_eq!(harness.llm.calls_matching("assess which communities"), 0);
}
