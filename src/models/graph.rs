//! Graph node and edge types for knowledge graph construction.
//!
//! Entities, relationships, claims, and text units form the property graph
//! written by the indexer and traversed by the query engines.
//!
//! # Identity
//!
//! Entity ids are deterministic: the first 16 hex characters of a SHA-256
//! over the case-folded name and upper-cased type. Re-indexing the same
//! document therefore regenerates the same ids, which is what makes graph
//! upserts idempotent. Claim ids hash the full
//! `subject:object:type:description` tuple the same way.
//!
//! # Example
//!
//! ```rust
//! use graphlore::models::graph::{Entity, EntityType};
//!
//! let entity = Entity::new("Acme Corp", EntityType::Organization, "Widget maker", 0.9);
//! assert_eq!(entity.id, Entity::id_for("acme corp", &EntityType::Organization));
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::LazyLock;

/// Unique identifier for a graph entity (16 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Wraps an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the entity ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

/// Type of entity in the knowledge graph.
///
/// The seven base variants cover the extraction prompt's default set;
/// [`EntityType::Custom`] carries domain-tuned extensions verbatim so that
/// `(name, type)` identity is preserved for them too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// Named individual.
    Person,
    /// Company, team, institution, or collective.
    Organization,
    /// Geographic or spatial referent.
    Location,
    /// Abstract idea, topic, or methodology.
    Concept,
    /// Occurrence anchored in time.
    Event,
    /// Artifact, product, or system.
    Product,
    /// Anything that does not fit the above.
    Other,
    /// Domain-tuned extension type (stored upper-cased).
    Custom(String),
}

impl EntityType {
    /// Parses an entity type string, mapping unknown values to
    /// [`EntityType::Custom`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "PERSON" => Self::Person,
            "ORGANIZATION" | "ORG" => Self::Organization,
            "LOCATION" => Self::Location,
            "CONCEPT" => Self::Concept,
            "EVENT" => Self::Event,
            "PRODUCT" => Self::Product,
            "OTHER" | "" => Self::Other,
            custom => Self::Custom(custom.to_string()),
        }
    }

    /// Canonical upper-case string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Location => "LOCATION",
            Self::Concept => "CONCEPT",
            Self::Event => "EVENT",
            Self::Product => "PRODUCT",
            Self::Other => "OTHER",
            Self::Custom(s) => s,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for EntityType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// A resolved canonical entity node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic id derived from `(name, type)`.
    pub id: EntityId,
    /// Canonical name (case preserved from first occurrence).
    pub name: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Description, merged across mentions.
    pub description: String,
    /// Confidence in [0, 1]; maximum across mentions.
    pub confidence: f32,
    /// Number of text units mentioning this entity.
    pub mention_count: u64,
    /// Alternative names accumulated by merges (ordered, deduplicated).
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Creates an entity with a deterministic id and a mention count of 1.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        description: impl Into<String>,
        confidence: f32,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Self::id_for(&name, &entity_type),
            name,
            entity_type,
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            mention_count: 1,
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic id for a `(name, type)` pair: 16 hex chars of SHA-256
    /// over the case-folded name and upper-cased type.
    #[must_use]
    pub fn id_for(name: &str, entity_type: &EntityType) -> EntityId {
        let key = format!(
            "{}|{}",
            name.trim().to_lowercase(),
            entity_type.as_str().to_uppercase()
        );
        EntityId(short_hash(&key))
    }

    /// Adds an alias, preserving order and skipping case-insensitive
    /// duplicates and the canonical name itself. Returns whether the alias
    /// was added.
    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        let alias = alias.into();
        let folded = alias.trim().to_lowercase();
        if folded.is_empty() || folded == self.name.trim().to_lowercase() {
            return false;
        }
        if self.aliases.iter().any(|a| a.to_lowercase() == folded) {
            return false;
        }
        self.aliases.push(alias);
        true
    }
}

/// A typed, directed edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity id.
    pub source_id: EntityId,
    /// Target entity id.
    pub target_id: EntityId,
    /// Relationship type (validated upper-case label).
    pub rel_type: String,
    /// Description of the relationship.
    pub description: String,
    /// Confidence in [0, 1]; maximum across observations.
    pub confidence: f32,
    /// Occurrence count across chunks.
    pub weight: u64,
}

impl Relationship {
    /// Creates a relationship with weight 1.
    #[must_use]
    pub fn new(
        source_id: EntityId,
        target_id: EntityId,
        rel_type: impl Into<String>,
        description: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            source_id,
            target_id,
            rel_type: rel_type.into(),
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            weight: 1,
        }
    }
}

static RELATION_TYPE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Z][A-Z0-9_]{0,63}$").expect("valid pattern"));

/// Normalizes a free-form relation label to the stored form, or `None` if the
/// label cannot be made safe for interpolation into a graph query.
///
/// Upper-cases, trims, and joins interior whitespace/hyphens with `_`, then
/// validates against `^[A-Z][A-Z0-9_]{0,63}$`. Anything that still fails the
/// pattern (digits first, exotic punctuation) is rejected rather than
/// repaired further.
#[must_use]
pub fn normalize_relation_type(raw: &str) -> Option<String> {
    let collapsed = raw
        .trim()
        .to_uppercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    RELATION_TYPE_RE.is_match(&collapsed).then_some(collapsed)
}

/// Truth status recorded by the claim extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClaimStatus {
    /// Asserted as factual by the source text.
    True,
    /// Asserted as false by the source text.
    False,
    /// Asserted with hedging or attribution.
    Suspected,
}

impl ClaimStatus {
    /// Parses a status string (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "TRUE" => Some(Self::True),
            "FALSE" => Some(Self::False),
            "SUSPECTED" => Some(Self::Suspected),
            _ => None,
        }
    }

    /// Canonical upper-case string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Suspected => "SUSPECTED",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A factual assertion recorded by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Deterministic id (16 hex chars over `subject:object:type:description`).
    pub id: String,
    /// Subject entity name (upper-cased).
    pub subject: String,
    /// Object entity name, or `None` when the source said "NONE".
    pub object: Option<String>,
    /// Claim category (e.g. `LEGAL_ACTION`).
    pub claim_type: String,
    /// Truth status tag.
    pub status: ClaimStatus,
    /// Natural-language description of the assertion.
    pub description: String,
    /// Start of the claim's validity period, when stated.
    pub start_date: Option<NaiveDateTime>,
    /// End of the claim's validity period, when stated.
    pub end_date: Option<NaiveDateTime>,
    /// Verbatim source sentence(s).
    pub source_text: String,
    /// How many times this claim has been observed.
    pub occurrence_count: u64,
}

impl Claim {
    /// Creates a claim with a deterministic id and occurrence count 1.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        object: Option<String>,
        claim_type: impl Into<String>,
        status: ClaimStatus,
        description: impl Into<String>,
        source_text: impl Into<String>,
    ) -> Self {
        let subject = subject.into().trim().to_uppercase();
        let object = object
            .map(|o| o.trim().to_uppercase())
            .filter(|o| !o.is_empty() && o != "NONE");
        let claim_type = claim_type.into();
        let description = description.into();
        let id = short_hash(&format!(
            "{subject}:{}:{claim_type}:{description}",
            object.as_deref().unwrap_or("NONE")
        ));
        Self {
            id,
            subject,
            object,
            claim_type,
            status,
            description,
            start_date: None,
            end_date: None,
            source_text: source_text.into(),
            occurrence_count: 1,
        }
    }

    /// Sets the validity period.
    #[must_use]
    pub const fn with_dates(
        mut self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }
}

/// A chunk of a document: the unit of extraction and embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    /// Unique id, `{document_id}_chunk_{i}`.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Chunk text (overlap included).
    pub text: String,
    /// Start offset in the original document, in chars.
    pub start_char: usize,
    /// End offset in the original document, in chars.
    pub end_char: usize,
}

/// A `MENTIONS` edge from a text unit to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityMention {
    /// The mentioned entity.
    pub entity_id: EntityId,
    /// The mentioning text unit.
    pub textunit_id: String,
}
