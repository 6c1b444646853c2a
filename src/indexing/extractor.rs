//! LLM-driven joint entity/relationship/claim extraction.
//!
//! One prompt per chunk produces delimited records (entities, relationships,
//! claims); an optional gleaning loop re-prompts for missed records, gated by
//! a binary continuation check. Malformed records are discarded and logged,
//! never guessed at, including records whose fields contain the tuple
//! delimiter.

use crate::Result;
use crate::config::ExtractionConfig;
use crate::llm::{CompletionOptions, LlmProvider, prompts};
use crate::models::TextUnit;
use crate::models::graph::ClaimStatus;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;

/// An entity record extracted from a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    /// Entity name as written.
    pub name: String,
    /// Entity type string.
    pub entity_type: String,
    /// Description from the extractor.
    pub description: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
}

/// A relationship record extracted from a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelationship {
    /// Source entity name.
    pub source: String,
    /// Target entity name.
    pub target: String,
    /// Relationship type string.
    pub rel_type: String,
    /// Description from the extractor.
    pub description: String,
    /// Strength in [1, 10], normalized to `confidence = strength / 10`.
    pub strength: f32,
    /// Occurrence count within the chunk.
    pub weight: u64,
}

impl ExtractedRelationship {
    /// Confidence derived from strength.
    #[must_use]
    pub fn confidence(&self) -> f32 {
        (self.strength / 10.0).clamp(0.0, 1.0)
    }
}

/// A claim record extracted from a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedClaim {
    /// Subject entity name.
    pub subject: String,
    /// Object entity name, or `None`.
    pub object: Option<String>,
    /// Claim category.
    pub claim_type: String,
    /// Truth status.
    pub status: ClaimStatus,
    /// Start of validity, when stated.
    pub start_date: Option<NaiveDateTime>,
    /// End of validity, when stated.
    pub end_date: Option<NaiveDateTime>,
    /// Description of the assertion.
    pub description: String,
    /// Verbatim source text.
    pub source_text: String,
}

/// Everything extracted from one chunk, deduplicated.
#[derive(Debug, Clone, Default)]
pub struct ChunkExtraction {
    /// Deduplicated entities.
    pub entities: Vec<ExtractedEntity>,
    /// Deduplicated relationships.
    pub relationships: Vec<ExtractedRelationship>,
    /// Claims.
    pub claims: Vec<ExtractedClaim>,
    /// Records discarded as malformed.
    pub discarded_records: usize,
    /// Gleaning passes that ran.
    pub gleaning_passes: usize,
}

/// LLM-backed extractor service.
pub struct Extractor {
    llm: Arc<dyn LlmProvider>,
    config: ExtractionConfig,
}

impl Extractor {
    /// Creates an extractor. The provider is expected to already be wrapped
    /// in the shared rate-limit/retry layer.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmProvider>, config: ExtractionConfig) -> Self {
        Self { llm, config }
    }

    /// Extracts entities, relationships, and claims from one chunk.
    ///
    /// `known_entities` are names already in the graph; the prompt asks the
    /// model to reuse them verbatim so cross-chunk references line up.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial extraction call fails. Gleaning
    /// failures degrade to the records collected so far.
    pub fn extract(&self, chunk: &TextUnit, known_entities: &[String]) -> Result<ChunkExtraction> {
        if chunk.text.trim().is_empty() {
            return Ok(ChunkExtraction::default());
        }

        let user = prompts::extraction_user(&self.config.entity_types, known_entities, &chunk.text);
        let response = self
            .llm
            .complete_with_options(
                prompts::EXTRACTION_SYSTEM,
                &user,
                &CompletionOptions::with_temperature(0.0).with_max_tokens(2048),
            )?;

        let mut raw = parse_records(&response);
        let mut passes = 0usize;

        for iteration in 0..self.config.max_gleanings {
            if iteration > 0 && !self.should_continue(chunk, &raw) {
                break;
            }
            match self.glean(chunk, &raw) {
                Ok(gleaned) => {
                    passes += 1;
                    raw.merge(gleaned);
                },
                Err(e) => {
                    tracing::warn!(chunk = %chunk.id, error = %e, "gleaning pass failed");
                    break;
                },
            }
        }

        let mut extraction = raw.dedup();
        extraction.gleaning_passes = passes;
        Ok(extraction)
    }

    /// Runs one gleaning pass asking for missed records.
    fn glean(&self, chunk: &TextUnit, prior: &RawRecords) -> Result<RawRecords> {
        let user = prompts::gleaning_user(&chunk.text, &prior.render());
        let response = self.llm.complete_with_options(
            prompts::EXTRACTION_SYSTEM,
            &user,
            &CompletionOptions::with_temperature(0.0).with_max_tokens(2048),
        )?;
        Ok(parse_records(&response))
    }

    /// Binary YES/NO continuation gate; treats any failure as NO.
    fn should_continue(&self, chunk: &TextUnit, prior: &RawRecords) -> bool {
        let user = prompts::loop_gate_user(&chunk.text, &prior.render());
        match self.llm.complete_with_options(
            prompts::LOOP_GATE_SYSTEM,
            &user,
            &CompletionOptions::short(),
        ) {
            Ok(reply) => {
                let token = reply
                    .trim()
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_matches(|c: char| !c.is_ascii_alphabetic())
                    .to_uppercase();
                matches!(token.as_str(), "Y" | "YES")
            },
            Err(e) => {
                tracing::warn!(chunk = %chunk.id, error = %e, "continuation gate failed");
                false
            },
        }
    }
}

/// Records accumulated across extraction passes, before dedup.
#[derive(Debug, Default)]
struct RawRecords {
    entities: Vec<ExtractedEntity>,
    relationships: Vec<ExtractedRelationship>,
    claims: Vec<ExtractedClaim>,
    discarded: usize,
}

impl RawRecords {
    fn merge(&mut self, other: Self) {
        self.entities.extend(other.entities);
        self.relationships.extend(other.relationships);
        self.claims.extend(other.claims);
        self.discarded += other.discarded;
    }

    /// Renders prior records back into the delimited format for gleaning
    /// prompts.
    fn render(&self) -> String {
        let d = prompts::TUPLE_DELIM;
        let mut lines = Vec::new();
        for e in &self.entities {
            lines.push(format!(
                "ENTITY{d}{}{d}{}{d}{}{d}{:.2}",
                e.name, e.entity_type, e.description, e.confidence
            ));
        }
        for r in &self.relationships {
            lines.push(format!(
                "RELATIONSHIP{d}{}{d}{}{d}{}{d}{}{d}{:.0}",
                r.source, r.target, r.rel_type, r.description, r.strength
            ));
        }
        for c in &self.claims {
            lines.push(format!(
                "CLAIM{d}{}{d}{}{d}{}{d}{}",
                c.subject,
                c.object.as_deref().unwrap_or("NONE"),
                c.claim_type,
                c.description
            ));
        }
        lines.join(prompts::RECORD_DELIM)
    }

    /// In-chunk deduplication: entities by `(name, type)` (descriptions
    /// joined, confidences averaged), relationships by `(source, target,
    /// type)` (max strength, weight incremented).
    fn dedup(self) -> ChunkExtraction {
        let mut entities: Vec<ExtractedEntity> = Vec::new();
        let mut entity_index: HashMap<(String, String), (usize, u32)> = HashMap::new();
        for entity in self.entities {
            let key = (
                entity.name.trim().to_uppercase(),
                entity.entity_type.trim().to_uppercase(),
            );
            match entity_index.get_mut(&key) {
                Some((slot, seen)) => {
                    let existing = &mut entities[*slot];
                    if !entity.description.is_empty()
                        && !existing
                            .description
                            .split('|')
                            .any(|d| d == entity.description)
                    {
                        if existing.description.is_empty() {
                            existing.description = entity.description;
                        } else {
                            existing.description.push('|');
                            existing.description.push_str(&entity.description);
                        }
                    }
                    // Running average of confidences.
                    let n = f32::from(u16::try_from(*seen).unwrap_or(u16::MAX)) + 1.0;
                    existing.confidence =
                        existing.confidence.mul_add(n - 1.0, entity.confidence) / n;
                    *seen += 1;
                },
                None => {
                    entity_index.insert(key, (entities.len(), 1));
                    entities.push(entity);
                },
            }
        }

        let mut relationships: Vec<ExtractedRelationship> = Vec::new();
        let mut rel_index: HashMap<(String, String, String), usize> = HashMap::new();
        for rel in self.relationships {
            let key = (
                rel.source.trim().to_uppercase(),
                rel.target.trim().to_uppercase(),
                rel.rel_type.trim().to_uppercase(),
            );
            match rel_index.get(&key) {
                Some(slot) => {
                    let existing = &mut relationships[*slot];
                    existing.strength = existing.strength.max(rel.strength);
                    existing.weight += 1;
                },
                None => {
                    rel_index.insert(key, relationships.len());
                    relationships.push(rel);
                },
            }
        }

        ChunkExtraction {
            entities,
            relationships,
            claims: self.claims,
            discarded_records: self.discarded,
            gleaning_passes: 0,
        }
    }
}

/// Parses a delimited extraction response. Tolerates trailing whitespace,
/// stops at the completion marker, and discards malformed records.
fn parse_records(response: &str) -> RawRecords {
    let mut records = RawRecords::default();
    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(prompts::COMPLETION_DELIM) {
            break;
        }
        let fields: Vec<&str> = line.split(prompts::TUPLE_DELIM).map(str::trim).collect();
        let parsed = match fields.first().map(|k| k.to_uppercase()) {
            Some(kind) if kind == "ENTITY" => parse_entity(&fields)
                .map(|e| records.entities.push(e))
                .is_some(),
            Some(kind) if kind == "RELATIONSHIP" => parse_relationship(&fields)
                .map(|r| records.relationships.push(r))
                .is_some(),
            Some(kind) if kind == "CLAIM" => parse_claim(&fields)
                .map(|c| records.claims.push(c))
                .is_some(),
            _ => false,
        };
        if !parsed {
            tracing::debug!(record = line, "discarding malformed extraction record");
            records.discarded += 1;
        }
    }
    records
}

fn parse_entity(fields: &[&str]) -> Option<ExtractedEntity> {
    // ENTITY|name|type|description|confidence. Extra fields mean the
    // delimiter leaked into a field; reject rather than guess.
    if fields.len() != 5 {
        return None;
    }
    let name = fields[1];
    if name.is_empty() {
        return None;
    }
    let confidence = fields[4].parse::<f32>().ok()?;
    Some(ExtractedEntity {
        name: name.to_string(),
        entity_type: fields[2].to_string(),
        description: fields[3].to_string(),
        confidence: confidence.clamp(0.0, 1.0),
    })
}

fn parse_relationship(fields: &[&str]) -> Option<ExtractedRelationship> {
    if fields.len() != 6 {
        return None;
    }
    let (source, target) = (fields[1], fields[2]);
    if source.is_empty() || target.is_empty() {
        return None;
    }
    let strength = fields[5].parse::<f32>().ok()?;
    Some(ExtractedRelationship {
        source: source.to_string(),
        target: target.to_string(),
        rel_type: fields[3].to_string(),
        description: fields[4].to_string(),
        strength: strength.clamp(1.0, 10.0),
        weight: 1,
    })
}

fn parse_claim(fields: &[&str]) -> Option<ExtractedClaim> {
    if fields.len() != 9 {
        return None;
    }
    let subject = fields[1];
    if subject.is_empty() {
        return None;
    }
    let status = ClaimStatus::parse(fields[4])?;
    let object = match fields[2] {
        "" | "NONE" | "none" => None,
        other => Some(other.to_string()),
    };
    Some(ExtractedClaim {
        subject: subject.to_string(),
        object,
        claim_type: fields[3].to_string(),
        status,
        start_date: parse_claim_date(fields[5]),
        end_date: parse_claim_date(fields[6]),
        description: fields[7].to_string(),
        source_text: fields[8].to_string(),
    })
}

/// Parses an ISO-8601 date or datetime; `NONE`/empty yields `None`.
fn parse_claim_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return None;
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use std::sync::Mutex;

    /// Scripted LLM double: pops canned responses in order.
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

    fn chunk(text: &str) -> TextUnit {
        TextUnit {
            id: "doc_chunk_0".to_string(),
            document_id: "doc".to_string(),
            text: text.to_string(),
            start_char: 0,
            end_char: text.len(),
        }
    }

    const FIRST_PASS: &str = "\
ENTITY|Apple|ORGANIZATION|Technology company|0.9
ENTITY|Steve Jobs|PERSON|Co-founder of Apple|0.95
RELATIONSHIP|Steve Jobs|Apple|FOUNDED|Founded the company|9
CLAIM|Apple|NONE|FOUNDING|TRUE|1976-04-01|NONE|Apple was founded|Apple was founded by Steve Jobs.
<COMPLETE>";

    #[test]
    fn parses_all_record_kinds() {
        let llm = ScriptedLlm::new(&[FIRST_PASS]);
        let extractor = Extractor::new(
            llm,
            ExtractionConfig {
                max_gleanings: 0,
                ..ExtractionConfig::default()
            },
        );
        let result = extractor
            .extract(&chunk("Apple was founded by Steve Jobs."), &[])
            .expect("extract");
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.claims.len(), 1);
        assert!((result.relationships[0].confidence() - 0.9).abs() < 1e-6);
        assert_eq!(
            result.claims[0].start_date,
            chrono::NaiveDate::from_ymd_opt(1976, 4, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        );
    }

    #[test]
    fn malformed_and_delimiter_colliding_records_are_discarded() {
        let response = "\
ENTITY|Good|PERSON|fine|0.8
ENTITY|Bad|PERSON|has|extra|field|0.8
RELATIONSHIP|A|B|KNOWS|desc|not_a_number
garbage line
<COMPLETE>
ENTITY|AfterComplete|PERSON|ignored|0.9";
        let records = parse_records(response);
        assert_eq!(records.entities.len(), 1);
        assert_eq!(records.entities[0].name, "Good");
        assert!(records.relationships.is_empty());
        assert_eq!(records.discarded, 3);
    }

    #[test]
    fn chunk_dedup_merges_entities_and_relationships() {
        let response = "\
ENTITY|Acme|ORGANIZATION|Widget maker|0.8
ENTITY|ACME|organization|Conglomerate|0.6
RELATIONSHIP|Alice|Acme|WORKS_AT|employee|6
RELATIONSHIP|alice|ACME|works_at|staff|8
<COMPLETE>";
        let llm = ScriptedLlm::new(&[response]);
        let extractor = Extractor::new(
            llm,
            ExtractionConfig {
                max_gleanings: 0,
                ..ExtractionConfig::default()
            },
        );
        let result = extractor.extract(&chunk("text"), &[]).expect("extract");
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].description, "Widget maker|Conglomerate");
        assert!((result.entities[0].confidence - 0.7).abs() < 1e-6);
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].weight, 2);
        assert!((result.relationships[0].strength - 8.0).abs() < 1e-6);
    }

    #[test]
    fn gleaning_appends_missed_records() {
        let gleaned = "\
ENTITY|Cupertino|LOCATION|City in California|0.85
<COMPLETE>";
        let llm = ScriptedLlm::new(&[FIRST_PASS, gleaned]);
        let extractor = Extractor::new(
            llm,
            ExtractionConfig {
                max_gleanings: 1,
                ..ExtractionConfig::default()
            },
        );
        let result = extractor
            .extract(&chunk("Apple was founded by Steve Jobs in Cupertino."), &[])
            .expect("extract");
        assert_eq!(result.gleaning_passes, 1);
        assert_eq!(result.entities.len(), 3);
    }

    #[test]
    fn continuation_gate_no_stops_gleaning() {
        let gleaned = "ENTITY|Extra|CONCEPT|first glean|0.5\n<COMPLETE>";
        // initial, glean 1, gate (NO); a second glean never happens.
        let llm = ScriptedLlm::new(&[FIRST_PASS, gleaned, "NO"]);
        let extractor = Extractor::new(
            llm,
            ExtractionConfig {
                max_gleanings: 3,
                ..ExtractionConfig::default()
            },
        );
        let result = extractor.extract(&chunk("text"), &[]).expect("extract");
        assert_eq!(result.gleaning_passes, 1);
        assert_eq!(result.entities.len(), 3);
    }

    #[test]
    fn empty_chunk_short_circuits() {
        let llm = ScriptedLlm::new(&[]);
        let extractor = Extractor::new(llm, ExtractionConfig::default());
        let result = extractor.extract(&chunk("   "), &[]).expect("extract");
        assert!(result.entities.is_empty());
    }
}
