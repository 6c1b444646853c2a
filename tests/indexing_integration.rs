//! Indexing pipeline integration tests.
//!
//! Drives the full write path (chunk → embed → extract → resolve → write →
//! communities) with a scripted LLM and asserts the resulting graph shape,
//! the dedup-by-casing behavior, claim wiring, and the incremental
//! content-hash short-circuit.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{GENERIC_REPORT, Harness, RoutedLlm, markers};
use graphlore::models::{ClaimStatus, DocumentStatus, UpdateOutcome};
use graphlore::storage::{ClaimFilter, DocumentStore, GraphStore};

const FOUNDING_DOC: &str = "Apple was founded by Steve Jobs in Cupertino.";

const FOUNDING_EXTRACTION: &str = "\
ENTITY|Apple|ORGANIZATION|Technology company|0.9
ENTITY|Steve Jobs|PERSON|Co-founder of Apple|0.95
ENTITY|Cupertino|LOCATION|City in California|0.85
RELATIONSHIP|Steve Jobs|Apple|FOUNDED|Founded the company|9
RELATIONSHIP|Apple|Cupertino|LOCATED_IN|Headquarters location|8
<COMPLETE>";

#[test]
fn indexing_builds_the_expected_graph() {
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, FOUNDING_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT);
    let harness = Harness::new(llm);

    let report = harness
        .pipeline
        .index_document("doc1", "founding.md", "/corpus/founding.md", FOUNDING_DOC)
        .expect("index");

    assert_eq!(report.chunks, 1);
    assert_eq!(report.chunks_failed, 0);
    assert_eq!(report.entities_extracted, 3);
    assert_eq!(report.relationships, 2);
    assert_eq!(report.status, Some(DocumentStatus::Completed));
    assert!(report.communities_updated >= 1);

    let stats = harness.graph.stats().expect("stats");
    assert_eq!(stats.entities, 3);
    assert_eq!(stats.relationships, 2);
    assert_eq!(stats.text_units, 1);
    assert_eq!(stats.mentions, 3);

    // Every related entity is in a level-0 community with a report.
    let communities = harness.graph.list_communities(Some(0)).expect("list");
    assert!(!communities.is_empty());
    assert!(communities.iter().all(|c| c.summary.is_some()));

    // The document row reflects the run.
    let doc = harness
        .documents
        .get_document("doc1")
        .expect("get")
        .expect("exists");
    assert_eq!(doc.version, 1);
    assert_eq!(doc.status, DocumentStatus::Completed);
    assert!(!doc.content_hash.is_empty());
    assert!(doc.last_processed_at.is_some());
}

#[test]
fn entity_names_dedup_case_insensitively_across_documents() {
    let llm = RoutedLlm::new()
        .route(
            markers::EXTRACTION,
            "ENTITY|Microsoft|ORGANIZATION|Software maker|0.9\n\
             ENTITY|Windows|PRODUCT|Operating system|0.85\n\
             RELATIONSHIP|Microsoft|Windows|RELEASED|Shipped the OS|8\n<COMPLETE>",
        )
        .route(
            markers::EXTRACTION,
            "ENTITY|microsoft|ORGANIZATION|Large tech company|0.8\n\
             ENTITY|LinkedIn|ORGANIZATION|Professional network|0.85\n\
             RELATIONSHIP|microsoft|LinkedIn|ACQUIRED|Bought the company|9\n<COMPLETE>",
        )
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT);
    let harness = Harness::new(llm);

    harness
        .pipeline
        .index_document("d1", "a.md", "/a.md", "Microsoft released Windows.")
        .expect("index d1");
    harness
        .pipeline
        .index_document("d2", "b.md", "/b.md", "microsoft acquired LinkedIn.")
        .expect("index d2");

    // Exactly one Microsoft entity, casing preserved from first occurrence.
    let microsoft = harness
        .graph
        .find_entity_by_name("MICROSOFT", None)
        .expect("find")
        .expect("exists");
    assert_eq!(microsoft.name, "Microsoft");
    assert_eq!(microsoft.mention_count, 2);

    let mentions = harness
        .graph
        .mention_texts(&microsoft.id, 10)
        .expect("mentions");
    let chunk_ids: Vec<&str> = mentions.iter().map(|m| m.id.as_str()).collect();
    assert!(chunk_ids.contains(&"d1_chunk_0"));
    assert!(chunk_ids.contains(&"d2_chunk_0"));
}

#[test]
fn claims_carry_status_dates_and_sources() {
    let llm = RoutedLlm::new()
        .route(
            markers::EXTRACTION,
            "ENTITY|Company A|ORGANIZATION|A company under scrutiny|0.9\n\
             CLAIM|Company A|NONE|LEGAL_ACTION|TRUE|2022-01-10|NONE|Fined for bid rigging|According to the report dated 2022-01-10, Company A was fined for bid rigging.\n\
             <COMPLETE>",
        )
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT);
    let harness = Harness::new(llm);

    harness
        .pipeline
        .index_document(
            "d1",
            "report.md",
            "/report.md",
            "According to the report dated 2022-01-10, Company A was fined for bid rigging.",
        )
        .expect("index");

    let claims = harness
        .queries
        .claims_query(
            None,
            &ClaimFilter {
                status: Some(ClaimStatus::True),
                ..ClaimFilter::default()
            },
        )
        .expect("claims query")
        .claims;
    assert_eq!(claims.len(), 1);
    let claim = &claims[0];
    assert_eq!(claim.subject, "COMPANY A");
    assert_eq!(claim.status, ClaimStatus::True);
    assert_eq!(
        claim.start_date,
        chrono::NaiveDate::from_ymd_opt(2022, 1, 10).and_then(|d| d.and_hms_opt(0, 0, 0))
    );

    // SOURCED_FROM resolves to the chunk holding the sentence.
    let sources = harness.graph.claim_sources(&claim.id).expect("sources");
    assert_eq!(sources, vec!["d1_chunk_0".to_string()]);
    let unit = harness
        .graph
        .get_text_unit(&sources[0])
        .expect("get")
        .expect("exists");
    assert!(unit.text.contains("bid rigging"));
}

#[test]
fn unchanged_reupload_short_circuits_without_llm_or_embedder_calls() {
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, FOUNDING_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT);
    let harness = Harness::new(llm);

    harness
        .pipeline
        .index_document("doc1", "founding.md", "/founding.md", FOUNDING_DOC)
        .expect("index");
    let extractions_before = harness.llm.calls_matching("extraction");
    let embeddings_before = harness.embedder.call_count();

    let outcome = harness
        .pipeline
        .update_document("doc1", FOUNDING_DOC)
        .expect("update");
    match outcome {
        UpdateOutcome::Unchanged { version } => assert_eq!(version, 1),
        UpdateOutcome::Reindexed { .. } => panic!("unchanged content must short-circuit"),
    }
    assert_eq!(harness.llm.calls_matching("extraction"), extractions_before);
    assert_eq!(harness.embedder.call_count(), embeddings_before);

    let doc = harness
        .documents
        .get_document("doc1")
        .expect("get")
        .expect("exists");
    assert_eq!(doc.version, 1, "version does not increment on unchanged");
}

#[test]
fn changed_reupload_reindexes_and_bumps_version() {
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, FOUNDING_EXTRACTION)
        .route(
            markers::EXTRACTION,
            "ENTITY|Apple|ORGANIZATION|Technology company|0.9\n\
             ENTITY|Tim Cook|PERSON|Chief executive|0.9\n\
             RELATIONSHIP|Tim Cook|Apple|LEADS|Runs the company|9\n<COMPLETE>",
        )
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT);
    let harness = Harness::new(llm);

    harness
        .pipeline
        .index_document("doc1", "doc.md", "/doc.md", FOUNDING_DOC)
        .expect("index");
    let outcome = harness
        .pipeline
        .update_document("doc1", "Apple is led by Tim Cook.")
        .expect("update");

    let UpdateOutcome::Reindexed { version, report } = outcome else {
        panic!("changed content must reindex");
    };
    assert_eq!(version, 2);
    assert_eq!(report.chunks, 1);

    // Old-only entities are gone; the regenerated Apple id is deterministic.
    assert!(
        harness
            .graph
            .find_entity_by_name("Steve Jobs", None)
            .expect("find")
            .is_none()
    );
    let apple = harness
        .graph
        .find_entity_by_name("Apple", None)
        .expect("find")
        .expect("exists");
    assert_eq!(
        apple.id,
        graphlore::Entity::id_for("Apple", &graphlore::EntityType::Organization)
    );
    assert!(
        harness
            .graph
            .find_entity_by_name("Tim Cook", None)
            .expect("find")
            .is_some()
    );
}

#[test]
fn empty_document_completes_without_graph_mutation() {
    let llm = RoutedLlm::new();
    let harness = Harness::new(llm);

    let report = harness
        .pipeline
        .index_document("empty", "empty.md", "/empty.md", "   \n\n  ")
        .expect("index");
    assert_eq!(report.chunks, 0);
    assert_eq!(report.status, Some(DocumentStatus::Completed));
    assert_eq!(harness.graph.stats().expect("stats").entities, 0);
    assert_eq!(harness.llm.total_calls(), 0);
}

#[test]
fn deleting_a_document_cascades_and_prunes() {
    let llm = RoutedLlm::new()
        .route(markers::EXTRACTION, FOUNDING_EXTRACTION)
        .route_sticky(markers::COMMUNITY_REPORT, GENERIC_REPORT);
    let harness = Harness::new(llm);

    harness
        .pipeline
        .index_document("doc1", "doc.md", "/doc.md", FOUNDING_DOC)
        .expect("index");
    let stats = harness.pipeline.delete_document("doc1").expect("delete");
    assert_eq!(stats.textunits_deleted, 1);
    assert_eq!(stats.entities_deleted, 3);

    let graph = harness.graph.stats().expect("stats");
    assert_eq!(graph.entities, 0);
    assert_eq!(graph.communities, 0, "empty communities are pruned");
    assert!(
        harness
            .documents
            .get_document("doc1")
            .expect("get")
            .is_none()
    );
}
