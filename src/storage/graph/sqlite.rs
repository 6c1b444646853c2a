//! `SQLite` graph store.
//!
//! Stores the property graph in six tables: entities, relationships, text
//! units, mentions, claims (+ claim sources), and communities (+ members).
//! All statements are parameterized; relationship types live in a column
//! (never interpolated into SQL) and are validated by the graph writer before
//! they arrive here. Multi-step operations (entity merge, document cascade)
//! run inside a transaction.

// SQLite returns i64; counts and offsets are non-negative and small.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::models::{
    Claim, ClaimStatus, Community, CommunityReport, Entity, EntityId, EntityMention, EntityType,
    Relationship, Significance, TextUnit,
};
use crate::storage::traits::{
    ClaimFilter, GraphDeletionStats, GraphStats, GraphStore, RelationTarget,
};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire the connection lock with poison recovery.
fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("graph store mutex was poisoned, recovering");
            poisoned.into_inner()
        },
    }
}

fn db_err(operation: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::failed(operation, e.to_string())
}

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn naive_to_text(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|v| v.format(NAIVE_FORMAT).to_string())
}

fn naive_from_text(value: Option<String>) -> Option<NaiveDateTime> {
    value.and_then(|v| NaiveDateTime::parse_from_str(&v, NAIVE_FORMAT).ok())
}

fn utc_from_text(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// `SQLite`-backed graph store.
///
/// # Concurrency Model
///
/// A `Mutex<Connection>` serializes access; WAL mode and `busy_timeout` keep
/// concurrent readers from other connections graceful.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteGraphStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::failed("open_graph_store", e.to_string()))?;
        }
        let conn = Connection::open(&db_path).map_err(db_err("open_graph_store"))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open_graph_store"))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path, if file-backed.
    #[must_use]
    pub fn db_path(&self) -> Option<&std::path::Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        let _ = conn.pragma_update(None, "foreign_keys", "ON");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                name_folded TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                confidence REAL NOT NULL DEFAULT 0.0,
                mention_count INTEGER NOT NULL DEFAULT 1,
                aliases TEXT NOT NULL DEFAULT '[]',
                aliases_folded TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(name_folded, entity_type)
            );
            CREATE INDEX IF NOT EXISTS idx_entities_mentions
                ON entities(mention_count DESC);

            CREATE TABLE IF NOT EXISTS relationships (
                source_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                target_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                rel_type TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                confidence REAL NOT NULL DEFAULT 0.0,
                weight INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY(source_id, target_id, rel_type)
            );
            CREATE INDEX IF NOT EXISTS idx_relationships_target
                ON relationships(target_id);
            CREATE INDEX IF NOT EXISTS idx_relationships_type
                ON relationships(rel_type);

            CREATE TABLE IF NOT EXISTS text_units (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                text TEXT NOT NULL,
                start_char INTEGER NOT NULL,
                end_char INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_text_units_document
                ON text_units(document_id);

            CREATE TABLE IF NOT EXISTS mentions (
                entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                textunit_id TEXT NOT NULL REFERENCES text_units(id) ON DELETE CASCADE,
                PRIMARY KEY(entity_id, textunit_id)
            );
            CREATE INDEX IF NOT EXISTS idx_mentions_textunit
                ON mentions(textunit_id);

            CREATE TABLE IF NOT EXISTS claims (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                object TEXT,
                claim_type TEXT NOT NULL,
                status TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                start_date TEXT,
                end_date TEXT,
                source_text TEXT NOT NULL DEFAULT '',
                occurrence_count INTEGER NOT NULL DEFAULT 1,
                subject_entity_id TEXT REFERENCES entities(id) ON DELETE SET NULL,
                object_entity_id TEXT REFERENCES entities(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_claims_subject ON claims(subject);
            CREATE INDEX IF NOT EXISTS idx_claims_status ON claims(status);

            CREATE TABLE IF NOT EXISTS claim_sources (
                claim_id TEXT NOT NULL REFERENCES claims(id) ON DELETE CASCADE,
                textunit_id TEXT NOT NULL REFERENCES text_units(id) ON DELETE CASCADE,
                PRIMARY KEY(claim_id, textunit_id)
            );

            CREATE TABLE IF NOT EXISTS communities (
                id INTEGER NOT NULL,
                level INTEGER NOT NULL,
                parent_id INTEGER,
                title TEXT,
                summary TEXT,
                themes TEXT NOT NULL DEFAULT '[]',
                significance TEXT,
                rating REAL,
                member_count INTEGER NOT NULL DEFAULT 0,
                summary_timestamp TEXT,
                PRIMARY KEY(id, level)
            );

            CREATE TABLE IF NOT EXISTS community_members (
                community_id INTEGER NOT NULL,
                level INTEGER NOT NULL,
                entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                confidence REAL NOT NULL DEFAULT 0.95,
                PRIMARY KEY(community_id, level, entity_id),
                FOREIGN KEY(community_id, level)
                    REFERENCES communities(id, level) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_community_members_entity
                ON community_members(entity_id);",
        )
        .map_err(db_err("initialize_graph_store"))
    }

    fn map_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
        let aliases: String = row.get("aliases")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let entity_type: String = row.get("entity_type")?;
        Ok(Entity {
            id: EntityId::new(row.get::<_, String>("id")?),
            name: row.get("name")?,
            entity_type: EntityType::parse(&entity_type),
            description: row.get("description")?,
            confidence: row.get("confidence")?,
            mention_count: row.get::<_, i64>("mention_count")? as u64,
            aliases: serde_json::from_str(&aliases).unwrap_or_default(),
            created_at: utc_from_text(&created_at),
            updated_at: utc_from_text(&updated_at),
        })
    }

    fn map_relationship(row: &Row<'_>) -> rusqlite::Result<Relationship> {
        Ok(Relationship {
            source_id: EntityId::new(row.get::<_, String>("source_id")?),
            target_id: EntityId::new(row.get::<_, String>("target_id")?),
            rel_type: row.get("rel_type")?,
            description: row.get("description")?,
            confidence: row.get("confidence")?,
            weight: row.get::<_, i64>("weight")? as u64,
        })
    }

    fn map_text_unit(row: &Row<'_>) -> rusqlite::Result<TextUnit> {
        Ok(TextUnit {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            text: row.get("text")?,
            start_char: row.get::<_, i64>("start_char")? as usize,
            end_char: row.get::<_, i64>("end_char")? as usize,
        })
    }

    fn map_claim(row: &Row<'_>) -> rusqlite::Result<Claim> {
        let status: String = row.get("status")?;
        Ok(Claim {
            id: row.get("id")?,
            subject: row.get("subject")?,
            object: row.get("object")?,
            claim_type: row.get("claim_type")?,
            status: ClaimStatus::parse(&status).unwrap_or(ClaimStatus::Suspected),
            description: row.get("description")?,
            start_date: naive_from_text(row.get("start_date")?),
            end_date: naive_from_text(row.get("end_date")?),
            source_text: row.get("source_text")?,
            occurrence_count: row.get::<_, i64>("occurrence_count")? as u64,
        })
    }

    fn map_community(row: &Row<'_>) -> rusqlite::Result<Community> {
        let themes: String = row.get("themes")?;
        let significance: Option<String> = row.get("significance")?;
        let timestamp: Option<String> = row.get("summary_timestamp")?;
        Ok(Community {
            id: row.get("id")?,
            level: row.get::<_, i64>("level")? as u32,
            parent_id: row.get("parent_id")?,
            title: row.get("title")?,
            summary: row.get("summary")?,
            themes: serde_json::from_str(&themes).unwrap_or_default(),
            significance: significance.as_deref().and_then(Significance::parse),
            rating: row.get("rating")?,
            member_count: row.get::<_, i64>("member_count")? as u64,
            summary_timestamp: timestamp.as_deref().map(utc_from_text),
        })
    }

    fn write_entity_row(conn: &Connection, entity: &Entity, insert: bool) -> Result<()> {
        let aliases =
            serde_json::to_string(&entity.aliases).unwrap_or_else(|_| "[]".to_string());
        let aliases_folded: Vec<String> = entity
            .aliases
            .iter()
            .map(|a| a.trim().to_lowercase())
            .collect();
        let aliases_folded =
            serde_json::to_string(&aliases_folded).unwrap_or_else(|_| "[]".to_string());
        let sql = if insert {
            "INSERT INTO entities
                (id, name, name_folded, entity_type, description, confidence,
                 mention_count, aliases, aliases_folded, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        } else {
            "UPDATE entities SET
                name = ?2, name_folded = ?3, entity_type = ?4, description = ?5,
                confidence = ?6, mention_count = ?7, aliases = ?8,
                aliases_folded = ?9, created_at = ?10, updated_at = ?11
             WHERE id = ?1"
        };
        conn.execute(
            sql,
            params![
                entity.id.as_str(),
                entity.name,
                entity.name.trim().to_lowercase(),
                entity.entity_type.as_str(),
                entity.description,
                f64::from(entity.confidence),
                entity.mention_count as i64,
                aliases,
                aliases_folded,
                entity.created_at.to_rfc3339(),
                entity.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("write_entity"))?;
        Ok(())
    }

    fn find_by_folded_name(
        conn: &Connection,
        folded: &str,
        entity_type: Option<&EntityType>,
    ) -> Result<Option<Entity>> {
        let mut sql = String::from(
            "SELECT * FROM entities
             WHERE (name_folded = ?1
                    OR EXISTS (SELECT 1 FROM json_each(entities.aliases_folded)
                               WHERE json_each.value = ?1))",
        );
        if entity_type.is_some() {
            sql.push_str(" AND entity_type = ?2");
        }
        sql.push_str(" ORDER BY mention_count DESC LIMIT 1");

        let mut stmt = conn.prepare(&sql).map_err(db_err("find_entity"))?;
        let found = match entity_type {
            Some(t) => stmt
                .query_row(params![folded, t.as_str()], Self::map_entity)
                .optional(),
            None => stmt.query_row(params![folded], Self::map_entity).optional(),
        };
        found.map_err(db_err("find_entity"))
    }
}

impl GraphStore for SqliteGraphStore {
    fn upsert_entity(&self, entity: &Entity) -> Result<Entity> {
        let conn = acquire_lock(&self.conn);
        let folded = entity.name.trim().to_lowercase();

        if let Some(mut existing) =
            Self::find_by_folded_name(&conn, &folded, Some(&entity.entity_type))?
        {
            existing.mention_count += entity.mention_count;
            existing.confidence = existing.confidence.max(entity.confidence);
            if existing.description.is_empty() && !entity.description.is_empty() {
                existing.description = entity.description.clone();
            }
            for alias in &entity.aliases {
                existing.add_alias(alias.clone());
            }
            existing.updated_at = Utc::now();
            Self::write_entity_row(&conn, &existing, false)?;
            return Ok(existing);
        }

        Self::write_entity_row(&conn, entity, true)?;
        Ok(entity.clone())
    }

    fn put_entity(&self, entity: &Entity) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM entities WHERE id = ?1",
                params![entity.id.as_str()],
                |_| Ok(true),
            )
            .optional()
            .map_err(db_err("put_entity"))?
            .unwrap_or(false);
        if !exists {
            return Err(Error::NotFound {
                resource: "entity".to_string(),
                id: entity.id.to_string(),
            });
        }
        Self::write_entity_row(&conn, entity, false)
    }

    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM entities WHERE id = ?1",
            params![id.as_str()],
            Self::map_entity,
        )
        .optional()
        .map_err(db_err("get_entity"))
    }

    fn find_entity_by_name(
        &self,
        name: &str,
        entity_type: Option<&EntityType>,
    ) -> Result<Option<Entity>> {
        let conn = acquire_lock(&self.conn);
        Self::find_by_folded_name(&conn, &name.trim().to_lowercase(), entity_type)
    }

    fn list_entities(&self, limit: usize, document_ids: Option<&[String]>) -> Result<Vec<Entity>> {
        let conn = acquire_lock(&self.conn);
        let mut entities = Vec::new();
        match document_ids {
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT * FROM entities
                         ORDER BY mention_count DESC, name ASC LIMIT ?1",
                    )
                    .map_err(db_err("list_entities"))?;
                let rows = stmt
                    .query_map(params![limit as i64], Self::map_entity)
                    .map_err(db_err("list_entities"))?;
                for row in rows {
                    entities.push(row.map_err(db_err("list_entities"))?);
                }
            },
            Some(docs) => {
                if docs.is_empty() {
                    return Ok(entities);
                }
                let sql = format!(
                    "SELECT DISTINCT e.* FROM entities e
                     JOIN mentions m ON m.entity_id = e.id
                     JOIN text_units tu ON tu.id = m.textunit_id
                     WHERE tu.document_id IN ({})
                     ORDER BY e.mention_count DESC, e.name ASC LIMIT {}",
                    placeholders(docs.len()),
                    limit as i64,
                );
                let mut stmt = conn.prepare(&sql).map_err(db_err("list_entities"))?;
                let rows = stmt
                    .query_map(params_from_iter(docs.iter()), Self::map_entity)
                    .map_err(db_err("list_entities"))?;
                for row in rows {
                    entities.push(row.map_err(db_err("list_entities"))?);
                }
            },
        }
        Ok(entities)
    }

    fn delete_entity(&self, id: &EntityId) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let deleted = conn
            .execute("DELETE FROM entities WHERE id = ?1", params![id.as_str()])
            .map_err(db_err("delete_entity"))?;
        Ok(deleted > 0)
    }

    fn merge_entities(
        &self,
        primary: &EntityId,
        duplicates: &[EntityId],
        canonical_name: Option<&str>,
    ) -> Result<Entity> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(db_err("merge_entities"))?;

        let mut merged = tx
            .query_row(
                "SELECT * FROM entities WHERE id = ?1",
                params![primary.as_str()],
                Self::map_entity,
            )
            .optional()
            .map_err(db_err("merge_entities"))?
            .ok_or_else(|| Error::NotFound {
                resource: "entity".to_string(),
                id: primary.to_string(),
            })?;

        let mut descriptions: Vec<String> = merged
            .description
            .split(" | ")
            .map(str::to_string)
            .filter(|d| !d.is_empty())
            .collect();

        for dup_id in duplicates {
            let duplicate = tx
                .query_row(
                    "SELECT * FROM entities WHERE id = ?1",
                    params![dup_id.as_str()],
                    Self::map_entity,
                )
                .optional()
                .map_err(db_err("merge_entities"))?
                .ok_or_else(|| Error::NotFound {
                    resource: "entity".to_string(),
                    id: dup_id.to_string(),
                })?;

            merged.mention_count += duplicate.mention_count;
            merged.confidence = merged.confidence.max(duplicate.confidence);
            merged.add_alias(duplicate.name.clone());
            for alias in &duplicate.aliases {
                merged.add_alias(alias.clone());
            }
            for part in duplicate.description.split(" | ") {
                if !part.is_empty() && !descriptions.iter().any(|d| d == part) {
                    descriptions.push(part.to_string());
                }
            }

            // Re-point relationships, merging duplicates on (neighbor, type).
            let moved: Vec<Relationship> = {
                let mut stmt = tx
                    .prepare(
                        "SELECT * FROM relationships
                         WHERE source_id = ?1 OR target_id = ?1",
                    )
                    .map_err(db_err("merge_entities"))?;
                let rows = stmt
                    .query_map(params![dup_id.as_str()], Self::map_relationship)
                    .map_err(db_err("merge_entities"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err("merge_entities"))?
            };
            tx.execute(
                "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
                params![dup_id.as_str()],
            )
            .map_err(db_err("merge_entities"))?;
            for mut rel in moved {
                if &rel.source_id == dup_id {
                    rel.source_id = primary.clone();
                }
                if &rel.target_id == dup_id {
                    rel.target_id = primary.clone();
                }
                if rel.source_id == rel.target_id {
                    continue;
                }
                tx.execute(
                    "INSERT INTO relationships
                        (source_id, target_id, rel_type, description, confidence, weight)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(source_id, target_id, rel_type) DO UPDATE SET
                        confidence = MAX(confidence, excluded.confidence),
                        weight = weight + excluded.weight",
                    params![
                        rel.source_id.as_str(),
                        rel.target_id.as_str(),
                        rel.rel_type,
                        rel.description,
                        f64::from(rel.confidence),
                        rel.weight as i64,
                    ],
                )
                .map_err(db_err("merge_entities"))?;
            }

            tx.execute(
                "INSERT OR IGNORE INTO mentions (entity_id, textunit_id)
                 SELECT ?1, textunit_id FROM mentions WHERE entity_id = ?2",
                params![primary.as_str(), dup_id.as_str()],
            )
            .map_err(db_err("merge_entities"))?;
            tx.execute(
                "UPDATE claims SET subject_entity_id = ?1 WHERE subject_entity_id = ?2",
                params![primary.as_str(), dup_id.as_str()],
            )
            .map_err(db_err("merge_entities"))?;
            tx.execute(
                "UPDATE claims SET object_entity_id = ?1 WHERE object_entity_id = ?2",
                params![primary.as_str(), dup_id.as_str()],
            )
            .map_err(db_err("merge_entities"))?;
            tx.execute(
                "INSERT OR IGNORE INTO community_members
                    (community_id, level, entity_id, confidence)
                 SELECT community_id, level, ?1, confidence
                 FROM community_members WHERE entity_id = ?2",
                params![primary.as_str(), dup_id.as_str()],
            )
            .map_err(db_err("merge_entities"))?;

            // Deleting last keeps the duplicate's data intact on failure.
            tx.execute(
                "DELETE FROM entities WHERE id = ?1",
                params![dup_id.as_str()],
            )
            .map_err(db_err("merge_entities"))?;
        }

        if let Some(name) = canonical_name {
            if !name.trim().is_empty() && name != merged.name {
                merged.add_alias(merged.name.clone());
                merged.name = name.to_string();
            }
        }
        merged.description = descriptions.join(" | ");
        merged.updated_at = Utc::now();
        Self::write_entity_row(&tx, &merged, false)?;

        tx.commit().map_err(db_err("merge_entities"))?;
        Ok(merged)
    }

    fn upsert_relationship(&self, relationship: &Relationship) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        for endpoint in [&relationship.source_id, &relationship.target_id] {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM entities WHERE id = ?1",
                    params![endpoint.as_str()],
                    |_| Ok(true),
                )
                .optional()
                .map_err(db_err("upsert_relationship"))?
                .unwrap_or(false);
            if !exists {
                return Err(Error::NotFound {
                    resource: "entity".to_string(),
                    id: endpoint.to_string(),
                });
            }
        }
        conn.execute(
            "INSERT INTO relationships
                (source_id, target_id, rel_type, description, confidence, weight)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source_id, target_id, rel_type) DO UPDATE SET
                confidence = MAX(confidence, excluded.confidence),
                weight = weight + excluded.weight,
                description = CASE WHEN description = ''
                    THEN excluded.description ELSE description END",
            params![
                relationship.source_id.as_str(),
                relationship.target_id.as_str(),
                relationship.rel_type,
                relationship.description,
                f64::from(relationship.confidence),
                relationship.weight as i64,
            ],
        )
        .map_err(db_err("upsert_relationship"))?;
        Ok(())
    }

    fn relationships_of(&self, id: &EntityId) -> Result<Vec<Relationship>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM relationships WHERE source_id = ?1 OR target_id = ?1")
            .map_err(db_err("relationships_of"))?;
        let rows = stmt
            .query_map(params![id.as_str()], Self::map_relationship)
            .map_err(db_err("relationships_of"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("relationships_of"))
    }

    fn relationships_among(&self, ids: &[EntityId]) -> Result<Vec<Relationship>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = acquire_lock(&self.conn);
        let marks = placeholders(ids.len());
        let sql = format!(
            "SELECT * FROM relationships
             WHERE source_id IN ({marks}) AND target_id IN ({marks})"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err("relationships_among"))?;
        let param_values: Vec<&str> = ids
            .iter()
            .chain(ids.iter())
            .map(EntityId::as_str)
            .collect();
        let rows = stmt
            .query_map(params_from_iter(param_values), Self::map_relationship)
            .map_err(db_err("relationships_among"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("relationships_among"))
    }

    fn relation_types_for(
        &self,
        ids: &[EntityId],
        min_confidence: f32,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = acquire_lock(&self.conn);
        let marks = placeholders(ids.len());
        // The floor and limit are trusted numerics; only the id lists are bound.
        let sql = format!(
            "SELECT rel_type, SUM(weight) AS freq FROM relationships
             WHERE confidence > {} AND (source_id IN ({marks}) OR target_id IN ({marks}))
             GROUP BY rel_type ORDER BY freq DESC, rel_type ASC LIMIT {}",
            f64::from(min_confidence),
            limit as i64,
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err("relation_types_for"))?;
        let param_values: Vec<&str> = ids
            .iter()
            .chain(ids.iter())
            .map(EntityId::as_str)
            .collect();
        let rows = stmt
            .query_map(params_from_iter(param_values), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(db_err("relation_types_for"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("relation_types_for"))
    }

    fn relation_targets(
        &self,
        source_ids: &[EntityId],
        rel_type: &str,
        document_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<RelationTarget>> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = acquire_lock(&self.conn);
        let marks = placeholders(source_ids.len());
        let doc_clause = match document_ids {
            Some(docs) if !docs.is_empty() => format!(
                " AND EXISTS (SELECT 1 FROM mentions m
                              JOIN text_units tu ON tu.id = m.textunit_id
                              WHERE m.entity_id = e.id AND tu.document_id IN ({}))",
                placeholders(docs.len())
            ),
            Some(_) => return Ok(Vec::new()),
            None => String::new(),
        };
        let sql = format!(
            "SELECT s.name AS source_name, r.confidence AS rel_confidence,
                    r.description AS rel_description, e.*
             FROM relationships r
             JOIN entities s ON s.id = r.source_id
             JOIN entities e ON e.id = r.target_id
             WHERE r.rel_type = ? AND r.source_id IN ({marks}){doc_clause}
             ORDER BY r.confidence DESC, e.mention_count DESC, e.name ASC
             LIMIT {}",
            limit as i64,
        );
        let mut params_vec: Vec<String> = vec![rel_type.to_string()];
        params_vec.extend(source_ids.iter().map(|id| id.as_str().to_string()));
        if let Some(docs) = document_ids {
            params_vec.extend(docs.iter().cloned());
        }

        let mut stmt = conn.prepare(&sql).map_err(db_err("relation_targets"))?;
        let rows = stmt
            .query_map(params_from_iter(params_vec.iter()), |row| {
                Ok(RelationTarget {
                    source_name: row.get("source_name")?,
                    confidence: row.get("rel_confidence")?,
                    description: row.get("rel_description")?,
                    target: Self::map_entity(row)?,
                })
            })
            .map_err(db_err("relation_targets"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("relation_targets"))
    }

    fn put_text_unit(&self, unit: &TextUnit) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO text_units (id, document_id, text, start_char, end_char)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                document_id = excluded.document_id, text = excluded.text,
                start_char = excluded.start_char, end_char = excluded.end_char",
            params![
                unit.id,
                unit.document_id,
                unit.text,
                unit.start_char as i64,
                unit.end_char as i64,
            ],
        )
        .map_err(db_err("put_text_unit"))?;
        Ok(())
    }

    fn get_text_unit(&self, id: &str) -> Result<Option<TextUnit>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM text_units WHERE id = ?1",
            params![id],
            Self::map_text_unit,
        )
        .optional()
        .map_err(db_err("get_text_unit"))
    }

    fn create_mention(&self, mention: &EntityMention) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO mentions (entity_id, textunit_id) VALUES (?1, ?2)",
                params![mention.entity_id.as_str(), mention.textunit_id],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(code, _)
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::NotFound {
                        resource: "entity or text unit".to_string(),
                        id: format!("{}/{}", mention.entity_id, mention.textunit_id),
                    }
                },
                other => Error::failed("create_mention", other.to_string()),
            })?;
        Ok(inserted > 0)
    }

    fn mention_texts(&self, id: &EntityId, limit: usize) -> Result<Vec<TextUnit>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT tu.* FROM text_units tu
                 JOIN mentions m ON m.textunit_id = tu.id
                 WHERE m.entity_id = ?1 ORDER BY tu.id ASC LIMIT ?2",
            )
            .map_err(db_err("mention_texts"))?;
        let rows = stmt
            .query_map(params![id.as_str(), limit as i64], Self::map_text_unit)
            .map_err(db_err("mention_texts"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("mention_texts"))
    }

    fn entities_mentioned_by(&self, document_id: &str) -> Result<Vec<EntityId>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT m.entity_id FROM mentions m
                 JOIN text_units tu ON tu.id = m.textunit_id
                 WHERE tu.document_id = ?1 ORDER BY m.entity_id",
            )
            .map_err(db_err("entities_mentioned_by"))?;
        let rows = stmt
            .query_map(params![document_id], |row| {
                Ok(EntityId::new(row.get::<_, String>(0)?))
            })
            .map_err(db_err("entities_mentioned_by"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("entities_mentioned_by"))
    }

    fn upsert_claim(
        &self,
        claim: &Claim,
        subject_id: &EntityId,
        object_id: Option<&EntityId>,
        textunit_id: &str,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO claims
                (id, subject, object, claim_type, status, description,
                 start_date, end_date, source_text, occurrence_count,
                 subject_entity_id, object_entity_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                occurrence_count = occurrence_count + 1",
            params![
                claim.id,
                claim.subject,
                claim.object,
                claim.claim_type,
                claim.status.as_str(),
                claim.description,
                naive_to_text(claim.start_date),
                naive_to_text(claim.end_date),
                claim.source_text,
                subject_id.as_str(),
                object_id.map(EntityId::as_str),
            ],
        )
        .map_err(db_err("upsert_claim"))?;
        conn.execute(
            "INSERT OR IGNORE INTO claim_sources (claim_id, textunit_id) VALUES (?1, ?2)",
            params![claim.id, textunit_id],
        )
        .map_err(db_err("upsert_claim"))?;
        Ok(())
    }

    fn query_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>> {
        let conn = acquire_lock(&self.conn);
        let mut sql = String::from("SELECT * FROM claims WHERE 1=1");
        let mut params_vec: Vec<String> = Vec::new();
        if let Some(subject) = &filter.subject {
            sql.push_str(" AND subject = ?");
            params_vec.push(subject.trim().to_uppercase());
        }
        if let Some(claim_type) = &filter.claim_type {
            sql.push_str(" AND UPPER(claim_type) = ?");
            params_vec.push(claim_type.trim().to_uppercase());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params_vec.push(status.as_str().to_string());
        }
        let limit = if filter.limit == 0 { 100 } else { filter.limit };
        sql.push_str(&format!(" ORDER BY id ASC LIMIT {limit}"));

        let mut stmt = conn.prepare(&sql).map_err(db_err("query_claims"))?;
        let rows = stmt
            .query_map(params_from_iter(params_vec.iter()), Self::map_claim)
            .map_err(db_err("query_claims"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("query_claims"))
    }

    fn claim_sources(&self, claim_id: &str) -> Result<Vec<String>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT textunit_id FROM claim_sources WHERE claim_id = ?1
                 ORDER BY textunit_id",
            )
            .map_err(db_err("claim_sources"))?;
        let rows = stmt
            .query_map(params![claim_id], |row| row.get::<_, String>(0))
            .map_err(db_err("claim_sources"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("claim_sources"))
    }

    fn delete_document_graph_data(&self, document_id: &str) -> Result<GraphDeletionStats> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(db_err("delete_document_graph_data"))?;

        let textunits_deleted = tx
            .query_row(
                "SELECT COUNT(*) FROM text_units WHERE document_id = ?1",
                params![document_id],
                |row| row.get::<_, i64>(0),
            )
            .map_err(db_err("delete_document_graph_data"))? as usize;
        if textunits_deleted == 0 {
            return Ok(GraphDeletionStats::default());
        }

        // Claims whose every source text unit belongs to this document.
        let claims_deleted = tx
            .execute(
                "DELETE FROM claims WHERE
                    EXISTS (SELECT 1 FROM claim_sources cs WHERE cs.claim_id = claims.id)
                    AND NOT EXISTS (
                        SELECT 1 FROM claim_sources cs
                        JOIN text_units tu ON tu.id = cs.textunit_id
                        WHERE cs.claim_id = claims.id AND tu.document_id <> ?1)",
                params![document_id],
            )
            .map_err(db_err("delete_document_graph_data"))?;

        // Mentions lost per entity.
        let lost: HashMap<String, u64> = {
            let mut stmt = tx
                .prepare(
                    "SELECT m.entity_id, COUNT(*) FROM mentions m
                     JOIN text_units tu ON tu.id = m.textunit_id
                     WHERE tu.document_id = ?1 GROUP BY m.entity_id",
                )
                .map_err(db_err("delete_document_graph_data"))?;
            let rows = stmt
                .query_map(params![document_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })
                .map_err(db_err("delete_document_graph_data"))?;
            rows.collect::<rusqlite::Result<HashMap<_, _>>>()
                .map_err(db_err("delete_document_graph_data"))?
        };

        // Text units go first; mentions and claim_sources cascade.
        tx.execute(
            "DELETE FROM text_units WHERE document_id = ?1",
            params![document_id],
        )
        .map_err(db_err("delete_document_graph_data"))?;

        let mut entities_deleted = 0;
        let mut entities_affected = 0;
        for (entity_id, lost_count) in lost {
            let remaining: i64 = tx
                .query_row(
                    "UPDATE entities
                     SET mention_count = MAX(0, mention_count - ?2),
                         updated_at = ?3
                     WHERE id = ?1
                     RETURNING mention_count",
                    params![entity_id, lost_count as i64, Utc::now().to_rfc3339()],
                    |row| row.get(0),
                )
                .map_err(db_err("delete_document_graph_data"))?;
            if remaining == 0 {
                tx.execute("DELETE FROM entities WHERE id = ?1", params![entity_id])
                    .map_err(db_err("delete_document_graph_data"))?;
                entities_deleted += 1;
            } else {
                entities_affected += 1;
            }
        }

        tx.commit().map_err(db_err("delete_document_graph_data"))?;
        Ok(GraphDeletionStats {
            textunits_deleted,
            entities_deleted,
            entities_affected,
            claims_deleted,
        })
    }

    fn upsert_community(&self, community: &Community) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let themes =
            serde_json::to_string(&community.themes).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO communities
                (id, level, parent_id, title, summary, themes, significance,
                 rating, member_count, summary_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id, level) DO UPDATE SET
                parent_id = excluded.parent_id,
                member_count = excluded.member_count",
            params![
                community.id,
                i64::from(community.level),
                community.parent_id,
                community.title,
                community.summary,
                themes,
                community.significance.map(Significance::as_str),
                community.rating.map(f64::from),
                community.member_count as i64,
                community.summary_timestamp.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(db_err("upsert_community"))?;
        Ok(())
    }

    fn clear_community_memberships(&self, entity_ids: Option<&[EntityId]>) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        match entity_ids {
            None => {
                conn.execute("DELETE FROM community_members", [])
                    .map_err(db_err("clear_community_memberships"))?;
            },
            Some(ids) if ids.is_empty() => {},
            Some(ids) => {
                let sql = format!(
                    "DELETE FROM community_members WHERE entity_id IN ({})",
                    placeholders(ids.len())
                );
                conn.execute(&sql, params_from_iter(ids.iter().map(EntityId::as_str)))
                    .map_err(db_err("clear_community_memberships"))?;
            },
        }
        Ok(())
    }

    fn add_community_member(
        &self,
        community_id: i64,
        level: u32,
        entity_id: &EntityId,
        confidence: f32,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO community_members
                (community_id, level, entity_id, confidence)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                community_id,
                i64::from(level),
                entity_id.as_str(),
                f64::from(confidence)
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::NotFound {
                    resource: "community or entity".to_string(),
                    id: format!("{community_id}@L{level}/{entity_id}"),
                }
            },
            other => Error::failed("add_community_member", other.to_string()),
        })?;
        Ok(())
    }

    fn prune_empty_communities(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "DELETE FROM communities WHERE NOT EXISTS (
                SELECT 1 FROM community_members cm
                WHERE cm.community_id = communities.id AND cm.level = communities.level)",
            [],
        )
        .map_err(db_err("prune_empty_communities"))
    }

    fn list_communities(&self, level: Option<u32>) -> Result<Vec<Community>> {
        let conn = acquire_lock(&self.conn);
        let mut out = Vec::new();
        match level {
            Some(l) => {
                let mut stmt = conn
                    .prepare("SELECT * FROM communities WHERE level = ?1 ORDER BY id ASC")
                    .map_err(db_err("list_communities"))?;
                let rows = stmt
                    .query_map(params![i64::from(l)], Self::map_community)
                    .map_err(db_err("list_communities"))?;
                for row in rows {
                    out.push(row.map_err(db_err("list_communities"))?);
                }
            },
            None => {
                let mut stmt = conn
                    .prepare("SELECT * FROM communities ORDER BY level ASC, id ASC")
                    .map_err(db_err("list_communities"))?;
                let rows = stmt
                    .query_map([], Self::map_community)
                    .map_err(db_err("list_communities"))?;
                for row in rows {
                    out.push(row.map_err(db_err("list_communities"))?);
                }
            },
        }
        Ok(out)
    }

    fn get_community(&self, id: i64, level: u32) -> Result<Option<Community>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM communities WHERE id = ?1 AND level = ?2",
            params![id, i64::from(level)],
            Self::map_community,
        )
        .optional()
        .map_err(db_err("get_community"))
    }

    fn community_members(&self, id: i64, level: u32, limit: usize) -> Result<Vec<Entity>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT e.* FROM entities e
                 JOIN community_members cm ON cm.entity_id = e.id
                 WHERE cm.community_id = ?1 AND cm.level = ?2
                 ORDER BY e.mention_count DESC, e.name ASC LIMIT ?3",
            )
            .map_err(db_err("community_members"))?;
        let rows = stmt
            .query_map(
                params![id, i64::from(level), limit as i64],
                Self::map_entity,
            )
            .map_err(db_err("community_members"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("community_members"))
    }

    fn communities_of_entities(&self, ids: &[EntityId]) -> Result<Vec<(i64, u32)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = acquire_lock(&self.conn);
        let sql = format!(
            "SELECT DISTINCT community_id, level FROM community_members
             WHERE entity_id IN ({}) ORDER BY level, community_id",
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err("communities_of_entities"))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter().map(EntityId::as_str)), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u32))
            })
            .map_err(db_err("communities_of_entities"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("communities_of_entities"))
    }

    fn update_community_report(
        &self,
        id: i64,
        level: u32,
        report: &CommunityReport,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let themes = serde_json::to_string(&report.themes).unwrap_or_else(|_| "[]".to_string());
        let updated = conn
            .execute(
                "UPDATE communities SET
                    title = ?3, summary = ?4, themes = ?5, significance = ?6,
                    rating = ?7, summary_timestamp = ?8
                 WHERE id = ?1 AND level = ?2",
                params![
                    id,
                    i64::from(level),
                    report.title,
                    report.summary,
                    themes,
                    report.significance.as_str(),
                    f64::from(report.rating.clamp(0.0, 10.0)),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err("update_community_report"))?;
        if updated == 0 {
            return Err(Error::NotFound {
                resource: "community".to_string(),
                id: format!("{id}@L{level}"),
            });
        }
        Ok(())
    }

    fn neighbor_ids(&self, ids: &[EntityId]) -> Result<Vec<EntityId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = acquire_lock(&self.conn);
        let marks = placeholders(ids.len());
        let sql = format!(
            "SELECT DISTINCT target_id FROM relationships WHERE source_id IN ({marks})
             UNION SELECT DISTINCT source_id FROM relationships WHERE target_id IN ({marks})"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err("neighbor_ids"))?;
        let param_values: Vec<&str> = ids
            .iter()
            .chain(ids.iter())
            .map(EntityId::as_str)
            .collect();
        let rows = stmt
            .query_map(params_from_iter(param_values), |row| {
                Ok(EntityId::new(row.get::<_, String>(0)?))
            })
            .map_err(db_err("neighbor_ids"))?;
        let mut out: Vec<EntityId> = ids.to_vec();
        for row in rows {
            out.push(row.map_err(db_err("neighbor_ids"))?);
        }
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        out.dedup();
        Ok(out)
    }

    fn stats(&self) -> Result<GraphStats> {
        let conn = acquire_lock(&self.conn);
        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(db_err("graph_stats"))
        };
        Ok(GraphStats {
            entities: count("entities")?,
            relationships: count("relationships")?,
            text_units: count("text_units")?,
            mentions: count("mentions")?,
            claims: count("claims")?,
            communities: count("communities")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    #[test]
    fn sqlite_upsert_matches_memory_semantics() {
        let store = SqliteGraphStore::in_memory().expect("open");
        let first = store
            .upsert_entity(&Entity::new("Microsoft", EntityType::Organization, "", 0.8))
            .expect("first");
        let second = store
            .upsert_entity(&Entity::new(
                "microsoft",
                EntityType::Organization,
                "Maker of Windows",
                0.95,
            ))
            .expect("second");
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Microsoft");
        assert_eq!(second.mention_count, 2);
        assert_eq!(second.description, "Maker of Windows");
        assert_eq!(store.stats().expect("stats").entities, 1);
    }

    #[test]
    fn upsert_matches_aliases_after_merge_rename() {
        let store = SqliteGraphStore::in_memory().expect("open");
        let a = store
            .upsert_entity(&Entity::new("IBM", EntityType::Organization, "", 0.9))
            .expect("a");
        let b = store
            .upsert_entity(&Entity::new(
                "International Business Machines",
                EntityType::Organization,
                "",
                0.9,
            ))
            .expect("b");
        let merged = store
            .merge_entities(&a.id, std::slice::from_ref(&b.id), None)
            .expect("merge");
        assert!(merged
            .aliases
            .contains(&"International Business Machines".to_string()));

        // A later mention under the alias folds into the merged row.
        let again = store
            .upsert_entity(&Entity::new(
                "international business machines",
                EntityType::Organization,
                "",
                0.5,
            ))
            .expect("again");
        assert_eq!(again.id, a.id);
        assert_eq!(again.mention_count, 3);
    }

    #[test]
    fn claims_survive_while_other_sources_remain() {
        let store = SqliteGraphStore::in_memory().expect("open");
        for (tu, doc) in [("d1_chunk_0", "d1"), ("d2_chunk_0", "d2")] {
            store
                .put_text_unit(&TextUnit {
                    id: tu.to_string(),
                    document_id: doc.to_string(),
                    text: "Company A was fined.".to_string(),
                    start_char: 0,
                    end_char: 20,
                })
                .expect("tu");
        }
        let subject = store
            .upsert_entity(&Entity::new("Company A", EntityType::Organization, "", 0.9))
            .expect("subject");
        store
            .create_mention(&EntityMention {
                entity_id: subject.id.clone(),
                textunit_id: "d1_chunk_0".to_string(),
            })
            .expect("m1");
        store
            .create_mention(&EntityMention {
                entity_id: subject.id.clone(),
                textunit_id: "d2_chunk_0".to_string(),
            })
            .expect("m2");
        let claim = Claim::new(
            "Company A",
            None,
            "LEGAL_ACTION",
            ClaimStatus::True,
            "Fined for bid rigging",
            "Company A was fined.",
        );
        store
            .upsert_claim(&claim, &subject.id, None, "d1_chunk_0")
            .expect("c1");
        store
            .upsert_claim(&claim, &subject.id, None, "d2_chunk_0")
            .expect("c2");

        let stats = store.delete_document_graph_data("d1").expect("delete");
        assert_eq!(stats.claims_deleted, 0);
        assert_eq!(stats.entities_affected, 1);
        let remaining = store
            .query_claims(&ClaimFilter::default())
            .expect("claims");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].occurrence_count, 2);
        assert_eq!(
            store.claim_sources(&claim.id).expect("sources"),
            vec!["d2_chunk_0".to_string()]
        );

        let stats = store.delete_document_graph_data("d2").expect("delete 2");
        assert_eq!(stats.claims_deleted, 1);
        assert_eq!(stats.entities_deleted, 1);
    }
}
