//! ToG reasoning engine integration tests.
//!
//! Builds the two-hop Alice → Acme → Berlin graph and drives the traversal
//! with a scripted LLM, checking the retrieved triplets, the bounded-work
//! guarantees, the sufficiency gate, and the depth-zero edge case.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{GENERIC_REPORT, Harness, RoutedLlm, markers};
use graphlore::models::{PruningMethod, QueryStatus, StepStatus, TogConfig};

const WORK_DOC: &str = "Alice works at Acme.\n\nAcme is headquartered in Berlin.";

const WORK_EXTRACTION: &str = "\
ENTITY|Alice|PERSON|An employee|0.9
ENTITY|Acme|ORGANIZATION|An industrial company|0.9
ENTITY|Berlin|LOCATION|Capital of Germany|0.9
RELATIONSHIP|Alice|Acme|WORKS_AT|Employment|9
RELATIONSHIP|Acme|Berlin|HEADQUARTERED_IN|Company seat|9
<COMPLETE>";

fn indexed_harness(llm: std::sync::Arc<RoutedLlm>) -> Harness {
    let harness = Harness::new(llm);
    harness
        .pipeline
        .index_document("doc1", "work.md", "/work.md", WORK_DOC)
        .expect("index");
    harness
}

fn two_hop_config() -> TogConfig {
    TogConfig {
        search_width: 2,
        search_depth: 2,
        pruning_method: PruningMethod::Bm25,
        enable_sufficiency_check: true,
        ..TogConfig::default()
    }
}

#[test]
fn two_hop_traversal_reaches_berlin() {
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, WORK_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT)
        .route(markers::TOPIC_GROUNDING, r#"{"entities": ["Alice"]}"#)
        .route(markers::SUFFICIENCY, r#"{"sufficient": false}"#)
        .route(markers::SUFFICIENCY, r#"{"sufficient": true}"#)
        .route(
            markers::TOG_ANSWER,
            r#"{"answer": "Alice works at Acme, which is headquartered in Berlin.",
                "confidence": 0.9,
                "reasoning_summary": "Followed employment then headquarters."}"#,
        );
    let harness = indexed_harness(llm);

    let result = harness.queries.tog_query(
        "Where does Alice's employer have its headquarters?",
        &two_hop_config(),
        None,
    );

    assert_eq!(result.status, QueryStatus::Answered);
    assert!(result.answer.contains("Berlin"));
    assert_eq!(result.topic_entities, vec!["Alice".to_string()]);

    let keys: Vec<(String, String, String)> = result
        .retrieved_triplets
        .iter()
        .map(graphlore::models::Triplet::key)
        .collect();
    assert!(keys.contains(&(
        "Alice".to_string(),
        "WORKS_AT".to_string(),
        "Acme".to_string()
    )));
    assert!(keys.contains(&(
        "Acme".to_string(),
        "HEADQUARTERED_IN".to_string(),
        "Berlin".to_string()
    )));

    // Depth two ended at the sufficiency gate.
    assert_eq!(result.reasoning_path.len(), 2);
    assert_eq!(result.reasoning_path[1].status, StepStatus::Sufficient);
    assert_eq!(result.retrieved_triplets[0].source, "depth_1");
    assert_eq!(result.retrieved_triplets[1].source, "depth_2");
}

#[test]
fn sufficiency_true_stops_exploration_early() {
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, WORK_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT)
        .route(markers::TOPIC_GROUNDING, r#"{"entities": ["Alice"]}"#)
        .route(markers::SUFFICIENCY, r#"{"sufficient": true}"#)
        .route(
            markers::TOG_ANSWER,
            r#"{"answer": "Alice works at Acme.", "confidence": 0.8,
                "reasoning_summary": "One hop sufficed."}"#,
        );
    let harness = indexed_harness(llm);

    let config = TogConfig {
        search_depth: 3,
        ..two_hop_config()
    };
    let result = harness
        .queries
        .tog_query("Where does Alice work?", &config, None);

    assert_eq!(result.reasoning_path.len(), 1, "no depth after sufficiency");
    assert_eq!(result.reasoning_path[0].status, StepStatus::Sufficient);
    assert_eq!(result.retrieved_triplets.len(), 1);
    assert_eq!(harness.llm.calls_matching("enough information"), 1);
}

#[test]
fn bounded_work_holds_for_the_llm_pruner() {
    // Relation + entity scoring through the LLM pruner; generous scripted
    // scores keep every call deterministic.
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, WORK_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT)
        .route(markers::TOPIC_GROUNDING, r#"{"entities": ["Alice"]}"#)
        .route_sticky(
            markers::RELATION_SCORING,
            r#"{"scores": [{"item": "WORKS_AT", "score": 0.9},
                           {"item": "HEADQUARTERED_IN", "score": 0.8}]}"#,
        )
        .route_sticky(markers::SUFFICIENCY, r#"{"sufficient": false}"#)
        .route(
            markers::TOG_ANSWER,
            r#"{"answer": "Berlin.", "confidence": 0.7, "reasoning_summary": "Two hops."}"#,
        );
    let harness = indexed_harness(llm);

    let config = TogConfig {
        search_width: 2,
        search_depth: 3,
        num_retain_entity: 5,
        pruning_method: PruningMethod::Llm,
        enable_sufficiency_check: true,
        ..TogConfig::default()
    };
    let result = harness
        .queries
        .tog_query("Where is Alice's employer headquartered?", &config, None);

    // Bounds: one grounding call, at most D relation-scoring calls, at most
    // D * W entity-scoring calls, at most D sufficiency calls, one answer.
    assert!(harness.llm.calls_matching("traversal should start") <= 2);
    assert!(harness.llm.calls_matching("each relation") <= config.search_depth);
    assert!(
        harness.llm.calls_matching("candidate entity")
            <= config.search_depth * config.search_width
    );
    assert!(harness.llm.calls_matching("enough information") <= config.search_depth);
    assert_eq!(harness.llm.calls_matching("reasoning path traced"), 1);

    // Entity bound: |explored| <= 1 + D * R, triplet bound: <= D * W.
    assert!(
        result.retrieved_triplets.len() <= config.search_depth * config.search_width,
        "triplet bound"
    );
}

#[test]
fn depth_zero_grounds_topics_and_records_nothing() {
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, WORK_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT)
        .route(markers::TOPIC_GROUNDING, r#"{"entities": ["Alice"]}"#)
        .route(
            markers::TOG_ANSWER,
            r#"{"answer": "Only the topic entity is known.", "confidence": 0.3,
                "reasoning_summary": "No traversal ran."}"#,
        );
    let harness = indexed_harness(llm);

    let config = TogConfig {
        search_depth: 0,
        ..two_hop_config()
    };
    let result = harness
        .queries
        .tog_query("Where does Alice work?", &config, None);
    assert_eq!(result.topic_entities, vec!["Alice".to_string()]);
    assert!(result.retrieved_triplets.is_empty());
    assert!(result.reasoning_path.is_empty());
}

#[test]
fn empty_graph_reports_no_entities_found() {
    let llm = RoutedLlm::new();
    let harness = Harness::new(llm);
    let result = harness
        .queries
        .tog_query("Anything?", &TogConfig::default(), None);
    assert_eq!(result.status, QueryStatus::NoEntitiesFound);
    assert!(result.retrieved_triplets.is_empty());
}

#[test]
fn grounding_falls_back_to_fuzzy_matching() {
    // The grounding reply names an entity that is not in the graph; the
    // engine falls back to fuzzy-matching question tokens.
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, WORK_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT)
        .route(markers::TOPIC_GROUNDING, r#"{"entities": ["Bob"]}"#)
        .route_sticky(markers::SUFFICIENCY, r#"{"sufficient": false}"#)
        .route(
            markers::TOG_ANSWER,
            r#"{"answer": "Alice works at Acme.", "confidence": 0.6,
                "reasoning_summary": "Fuzzy grounding."}"#,
        );
    let harness = indexed_harness(llm);

    let result = harness
        .queries
        .tog_query("Where does Alice work?", &two_hop_config(), None);
    assert!(result.topic_entities.contains(&"Alice".to_string()));
}
