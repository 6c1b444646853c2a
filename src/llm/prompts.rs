//! Prompt templates for every LLM touchpoint.
//!
//! Extraction prompts use a delimited record format (one record per line,
//! fields joined by [`TUPLE_DELIM`], output terminated by
//! [`COMPLETION_DELIM`]); everything downstream of extraction requests JSON
//! and is parsed through typed serde structs. The parsers tolerate trailing
//! whitespace and discard malformed records rather than failing the call.

/// Field separator inside an extraction record.
pub const TUPLE_DELIM: &str = "|";

/// Record separator (one record per line).
pub const RECORD_DELIM: &str = "\n";

/// Marker the extractor emits after its last record.
pub const COMPLETION_DELIM: &str = "<COMPLETE>";

/// System prompt for joint entity/relationship/claim extraction.
pub const EXTRACTION_SYSTEM: &str = r#"You are an information extraction engine. You read a text passage and emit entities, relationships, and claims in a strict delimited format.

Output rules:
- One record per line. No prose, no markdown, no numbering.
- Fields inside a record are separated by "|". Never use "|" inside a field.
- Entity record:       ENTITY|<name>|<type>|<description>|<confidence 0.0-1.0>
- Relationship record: RELATIONSHIP|<source name>|<target name>|<type>|<description>|<strength 1-10>
- Claim record:        CLAIM|<subject>|<object or NONE>|<claim type>|<TRUE or FALSE or SUSPECTED>|<start date ISO-8601 or NONE>|<end date ISO-8601 or NONE>|<description>|<verbatim source text>
- Relationship and claim types are short UPPER_SNAKE_CASE labels (WORKS_AT, LOCATED_IN, LEGAL_ACTION, ...).
- Finish your output with <COMPLETE> on its own line."#;

/// Builds the user prompt for the initial extraction pass.
#[must_use]
pub fn extraction_user(entity_types: &[String], known_entities: &[String], text: &str) -> String {
    let known = if known_entities.is_empty() {
        String::from("(none)")
    } else {
        known_entities.join(", ")
    };
    format!(
        "Entity types: {}\n\
         Entities already known to the graph (reuse their exact names when the text refers to them): {known}\n\n\
         Extract all entities, relationships, and claims from this text:\n\n{text}",
        entity_types.join(", ")
    )
}

/// Builds the user prompt for a gleaning pass over the same text.
#[must_use]
pub fn gleaning_user(text: &str, prior_records: &str) -> String {
    format!(
        "You previously extracted the records below from this text. MANY entities and \
         relationships were missed. Emit ONLY the missed records, in the same format, \
         ending with <COMPLETE>.\n\nPrior records:\n{prior_records}\n\nText:\n\n{text}"
    )
}

/// System prompt for the binary continuation gate between gleaning passes.
pub const LOOP_GATE_SYSTEM: &str =
    "Answer with a single word: YES if entities or relationships are still missing from the \
     extraction, NO otherwise.";

/// Builds the user prompt for the continuation gate.
#[must_use]
pub fn loop_gate_user(text: &str, prior_records: &str) -> String {
    format!("Records so far:\n{prior_records}\n\nText:\n\n{text}\n\nAre records still missing?")
}

/// System prompt for pairwise entity disambiguation.
pub const ENTITY_RESOLUTION_SYSTEM: &str = r#"You decide whether two knowledge-graph entity records refer to the same real-world thing. Respond with JSON only:
{"are_same": true|false, "confidence": 0.0-1.0, "suggested_canonical_name": "<best name, or null>"}"#;

/// Builds the user prompt for pairwise entity disambiguation.
#[must_use]
pub fn entity_resolution_user(
    name_a: &str,
    desc_a: &str,
    name_b: &str,
    desc_b: &str,
    entity_type: &str,
) -> String {
    format!(
        "Entity type: {entity_type}\n\
         Entity 1: {name_a}\nDescription 1: {desc_a}\n\
         Entity 2: {name_b}\nDescription 2: {desc_b}\n\n\
         Are these the same entity?"
    )
}

/// System prompt for community report generation.
pub const COMMUNITY_REPORT_SYSTEM: &str = r#"You write an analyst report about a community of related entities from a knowledge graph. Respond with JSON only:
{"title": "<short title>", "summary": "<2-4 paragraph summary>", "rating": 0.0-10.0, "significance": "LOW"|"MEDIUM"|"HIGH", "themes": ["<theme>", ...], "findings": [{"summary": "<one line>", "explanation": "<why it matters>", "rating": 0.0-10.0}, ...]}"#;

/// Builds the user prompt for a community report.
#[must_use]
pub fn community_report_user(
    members: &str,
    relationships: &str,
    child_summaries: &str,
    snippets: &str,
) -> String {
    let mut prompt = format!(
        "Community members (name, type, description, mentions):\n{members}\n\n\
         Internal relationships:\n{relationships}\n"
    );
    if !child_summaries.is_empty() {
        prompt.push_str(&format!("\nChild community summaries:\n{child_summaries}\n"));
    }
    if !snippets.is_empty() {
        prompt.push_str(&format!("\nRepresentative source text:\n{snippets}\n"));
    }
    prompt.push_str("\nWrite the report.");
    prompt
}

/// System prompt for extracting entity names from a user question.
pub const QUERY_ENTITY_SYSTEM: &str = r#"Extract the named entities a knowledge-graph lookup should anchor on for this question. Respond with JSON only: {"entities": ["<name>", ...]}. Return an empty list if the question names no entities."#;

/// System prompt for the local answer call.
pub const LOCAL_ANSWER_SYSTEM: &str = r#"You answer questions using ONLY the knowledge-graph context provided. Cite which entities the answer rests on. If the context cannot answer the question, say so. Respond with JSON only:
{"answer": "<answer>", "confidence": 0.0-1.0, "cited_entities": ["<entity name>", ...]}"#;

/// Builds the user prompt for the local answer call.
#[must_use]
pub fn local_answer_user(question: &str, context: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {question}")
}

/// System prompt for a global map call over one community batch.
pub const GLOBAL_MAP_SYSTEM: &str = r#"You assess which communities of a knowledge graph are relevant to a question and summarize what they contribute. Respond with JSON only:
{"relevant_communities": [<community id>, ...], "summary": "<what this batch contributes>", "key_points": ["<point>", ...], "confidence": "low"|"medium"|"high"}"#;

/// Builds the user prompt for a global map call.
#[must_use]
pub fn global_map_user(question: &str, batch: &str) -> String {
    format!("Question: {question}\n\nCommunities (id, size, themes, summary):\n{batch}")
}

/// System prompt for the global reduce call.
pub const GLOBAL_REDUCE_SYSTEM: &str = r#"You synthesize intermediate community findings into a final answer. Respond with JSON only:
{"answer": "<final answer>", "key_insights": ["<insight>", ...], "supporting_communities": [<community id>, ...], "confidence_score": 0.0-1.0, "limitations": "<caveats>"}"#;

/// Builds the user prompt for the global reduce call.
#[must_use]
pub fn global_reduce_user(question: &str, map_outputs: &str) -> String {
    format!("Question: {question}\n\nIntermediate findings:\n{map_outputs}")
}

/// System prompt for the single-shot global fallback.
pub const GLOBAL_SINGLE_SHOT_SYSTEM: &str = r#"You answer a corpus-level question from community summaries of a knowledge graph. Respond with JSON only:
{"answer": "<answer>", "key_insights": ["<insight>", ...], "supporting_communities": [<community id>, ...], "confidence_score": 0.0-1.0}"#;

/// System prompt for topic entity grounding.
pub const TOPIC_GROUNDING_SYSTEM: &str = r#"Select the entities from the candidate list that a multi-hop graph traversal should start from to answer the question. Respond with JSON only: {"entities": ["<exact candidate name>", ...]}. Use only names from the list."#;

/// Builds the user prompt for topic grounding.
#[must_use]
pub fn topic_grounding_user(question: &str, candidates: &str) -> String {
    format!("Question: {question}\n\nCandidate entities:\n{candidates}")
}

/// System prompt for relation scoring during traversal.
pub const RELATION_SCORING_SYSTEM: &str = r#"Score how useful each relation type is for answering the question, given the current frontier entities. Respond with JSON only:
{"scores": [{"item": "<relation>", "score": 0.0-1.0, "reasoning": "<short>"}, ...]}"#;

/// Builds the user prompt for relation scoring.
#[must_use]
pub fn relation_scoring_user(
    question: &str,
    frontier: &str,
    relations: &str,
    explored: &str,
) -> String {
    let mut prompt = format!(
        "Question: {question}\n\nFrontier entities: {frontier}\n\nCandidate relations:\n{relations}"
    );
    if !explored.is_empty() {
        prompt.push_str(&format!("\n\nRelations already explored: {explored}"));
    }
    prompt
}

/// System prompt for candidate entity scoring during expansion.
pub const ENTITY_SCORING_SYSTEM: &str = r#"Score how likely each candidate entity is to lead toward the answer. Respond with JSON only:
{"scores": [{"item": "<entity name>", "score": 0.0-1.0, "reasoning": "<short>"}, ...]}"#;

/// Builds the user prompt for candidate entity scoring.
#[must_use]
pub fn entity_scoring_user(question: &str, relation: &str, candidates: &str) -> String {
    format!(
        "Question: {question}\n\nRelation being followed: {relation}\n\nCandidate entities:\n{candidates}"
    )
}

/// System prompt for the sufficiency gate.
pub const SUFFICIENCY_SYSTEM: &str = r#"Decide whether the retrieved triplets already contain enough information to answer the question. Respond with JSON only: {"sufficient": true|false, "reason": "<short>"}"#;

/// Builds the user prompt for the sufficiency gate.
#[must_use]
pub fn sufficiency_user(question: &str, triplets: &str) -> String {
    format!("Question: {question}\n\nRetrieved triplets:\n{triplets}")
}

/// System prompt for ToG answer synthesis.
pub const TOG_ANSWER_SYSTEM: &str = r#"You answer a question from a reasoning path traced through a knowledge graph plus source snippets. Respond with JSON only:
{"answer": "<answer>", "confidence": 0.0-1.0, "reasoning_summary": "<how the path supports the answer>"}"#;

/// Builds the user prompt for ToG answer synthesis.
#[must_use]
pub fn tog_answer_user(question: &str, path: &str, context: &str) -> String {
    let mut prompt = format!("Question: {question}\n\nReasoning path:\n{path}");
    if !context.is_empty() {
        prompt.push_str(&format!("\n\nSource snippets:\n{context}"));
    }
    prompt
}

/// System prompt for answering over a claim set.
pub const CLAIMS_ANSWER_SYSTEM: &str = r#"You answer a question using ONLY the recorded claims provided, respecting each claim's status tag (TRUE, FALSE, SUSPECTED). Respond with JSON only: {"answer": "<answer>", "confidence": 0.0-1.0}"#;

/// Builds the user prompt for answering over claims.
#[must_use]
pub fn claims_answer_user(question: &str, claims: &str) -> String {
    format!("Claims:\n{claims}\n\nQuestion: {question}")
}
