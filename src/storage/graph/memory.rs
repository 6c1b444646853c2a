//! In-memory graph store for testing.
//!
//! Fast, non-persistent implementation of [`GraphStore`] with the same merge
//! and cascade semantics as the SQLite backend. Uses `RwLock` maps for
//! thread-safe access.

// Graph cascade logic reads better with explicit nested conditionals.
#![allow(clippy::collapsible_if)]

use crate::models::{
    Claim, Community, CommunityReport, Entity, EntityId, EntityMention, EntityType, Relationship,
    TextUnit,
};
use crate::storage::traits::{
    ClaimFilter, GraphDeletionStats, GraphStats, GraphStore, RelationTarget,
};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

type RelKey = (EntityId, EntityId, String);

#[derive(Debug, Clone)]
struct ClaimLinks {
    subject: EntityId,
    object: Option<EntityId>,
    sources: BTreeSet<String>,
}

/// In-memory graph store.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    entities: RwLock<HashMap<EntityId, Entity>>,
    relationships: RwLock<HashMap<RelKey, Relationship>>,
    text_units: RwLock<HashMap<String, TextUnit>>,
    mentions: RwLock<HashSet<EntityMention>>,
    claims: RwLock<HashMap<String, Claim>>,
    claim_links: RwLock<HashMap<String, ClaimLinks>>,
    communities: RwLock<HashMap<(i64, u32), Community>>,
    memberships: RwLock<HashMap<(i64, u32, EntityId), f32>>,
}

fn read_poisoned<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_poisoned<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl InMemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn matches_name(entity: &Entity, folded: &str) -> bool {
        entity.name.trim().to_lowercase() == folded
            || entity.aliases.iter().any(|a| a.trim().to_lowercase() == folded)
    }

    fn documents_of_entity(&self, id: &EntityId) -> HashSet<String> {
        let text_units = read_poisoned(&self.text_units);
        read_poisoned(&self.mentions)
            .iter()
            .filter(|m| &m.entity_id == id)
            .filter_map(|m| text_units.get(&m.textunit_id).map(|tu| tu.document_id.clone()))
            .collect()
    }

    fn entity_in_documents(&self, id: &EntityId, document_ids: Option<&[String]>) -> bool {
        match document_ids {
            None => true,
            Some(docs) => {
                let mentioned = self.documents_of_entity(id);
                docs.iter().any(|d| mentioned.contains(d))
            },
        }
    }

    fn remove_entity_everywhere(&self, id: &EntityId) {
        write_poisoned(&self.relationships)
            .retain(|(source, target, _), _| source != id && target != id);
        write_poisoned(&self.mentions).retain(|m| &m.entity_id != id);
        write_poisoned(&self.memberships).retain(|(_, _, entity), _| entity != id);
        let orphaned: Vec<String> = read_poisoned(&self.claim_links)
            .iter()
            .filter(|(_, links)| &links.subject == id)
            .map(|(claim_id, _)| claim_id.clone())
            .collect();
        let mut claim_links = write_poisoned(&self.claim_links);
        for claim_id in orphaned {
            claim_links.remove(&claim_id);
        }
        for links in claim_links.values_mut() {
            if links.object.as_ref() == Some(id) {
                links.object = None;
            }
        }
    }
}

impl GraphStore for InMemoryGraphStore {
    fn upsert_entity(&self, entity: &Entity) -> Result<Entity> {
        let folded = entity.name.trim().to_lowercase();
        let mut entities = write_poisoned(&self.entities);

        let existing_id = entities
            .values()
            .find(|e| e.entity_type == entity.entity_type && Self::matches_name(e, &folded))
            .map(|e| e.id.clone());

        if let Some(id) = existing_id {
            let stored = entities.get_mut(&id).ok_or_else(|| {
                Error::failed("upsert_entity", "entity disappeared during upsert")
            })?;
            stored.mention_count += entity.mention_count;
            stored.confidence = stored.confidence.max(entity.confidence);
            if stored.description.is_empty() && !entity.description.is_empty() {
                stored.description = entity.description.clone();
            }
            for alias in &entity.aliases {
                stored.add_alias(alias.clone());
            }
            stored.updated_at = chrono::Utc::now();
            return Ok(stored.clone());
        }

        entities.insert(entity.id.clone(), entity.clone());
        Ok(entity.clone())
    }

    fn put_entity(&self, entity: &Entity) -> Result<()> {
        let mut entities = write_poisoned(&self.entities);
        if !entities.contains_key(&entity.id) {
            return Err(Error::NotFound {
                resource: "entity".to_string(),
                id: entity.id.to_string(),
            });
        }
        entities.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>> {
        Ok(read_poisoned(&self.entities).get(id).cloned())
    }

    fn find_entity_by_name(
        &self,
        name: &str,
        entity_type: Option<&EntityType>,
    ) -> Result<Option<Entity>> {
        let folded = name.trim().to_lowercase();
        Ok(read_poisoned(&self.entities)
            .values()
            .find(|e| {
                entity_type.is_none_or(|t| &e.entity_type == t) && Self::matches_name(e, &folded)
            })
            .cloned())
    }

    fn list_entities(&self, limit: usize, document_ids: Option<&[String]>) -> Result<Vec<Entity>> {
        let mut entities: Vec<Entity> = read_poisoned(&self.entities)
            .values()
            .filter(|e| self.entity_in_documents(&e.id, document_ids))
            .cloned()
            .collect();
        entities.sort_by(|a, b| {
            b.mention_count
                .cmp(&a.mention_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        entities.truncate(limit);
        Ok(entities)
    }

    fn delete_entity(&self, id: &EntityId) -> Result<bool> {
        let existed = write_poisoned(&self.entities).remove(id).is_some();
        if existed {
            self.remove_entity_everywhere(id);
        }
        Ok(existed)
    }

    fn merge_entities(
        &self,
        primary: &EntityId,
        duplicates: &[EntityId],
        canonical_name: Option<&str>,
    ) -> Result<Entity> {
        let mut merged = self.get_entity(primary)?.ok_or_else(|| Error::NotFound {
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
            let duplicate = self.get_entity(dup_id)?.ok_or_else(|| Error::NotFound {
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

            // Re-point relationships, merging on (neighbor, type).
            let moved: Vec<Relationship> = {
                let mut relationships = write_poisoned(&self.relationships);
                let keys: Vec<RelKey> = relationships
                    .keys()
                    .filter(|(s, t, _)| s == dup_id || t == dup_id)
                    .cloned()
                    .collect();
                keys.into_iter()
                    .filter_map(|key| relationships.remove(&key))
                    .collect()
            };
            for mut rel in moved {
                if &rel.source_id == dup_id {
                    rel.source_id = primary.clone();
                }
                if &rel.target_id == dup_id {
                    rel.target_id = primary.clone();
                }
                if rel.source_id == rel.target_id {
                    continue; // drop self-loops created by the merge
                }
                let mut relationships = write_poisoned(&self.relationships);
                let key = (rel.source_id.clone(), rel.target_id.clone(), rel.rel_type.clone());
                match relationships.get_mut(&key) {
                    Some(existing) => {
                        existing.confidence = existing.confidence.max(rel.confidence);
                        existing.weight += rel.weight;
                    },
                    None => {
                        relationships.insert(key, rel);
                    },
                }
            }

            // Re-point mentions and claim links.
            {
                let mut mentions = write_poisoned(&self.mentions);
                let moved: Vec<EntityMention> = mentions
                    .iter()
                    .filter(|m| &m.entity_id == dup_id)
                    .cloned()
                    .collect();
                for mention in moved {
                    mentions.remove(&mention);
                    mentions.insert(EntityMention {
                        entity_id: primary.clone(),
                        textunit_id: mention.textunit_id,
                    });
                }
            }
            {
                let mut claim_links = write_poisoned(&self.claim_links);
                for links in claim_links.values_mut() {
                    if &links.subject == dup_id {
                        links.subject = primary.clone();
                    }
                    if links.object.as_ref() == Some(dup_id) {
                        links.object = Some(primary.clone());
                    }
                }
            }
            {
                let mut memberships = write_poisoned(&self.memberships);
                let moved: Vec<((i64, u32, EntityId), f32)> = memberships
                    .iter()
                    .filter(|((_, _, e), _)| e == dup_id)
                    .map(|(k, v)| (k.clone(), *v))
                    .collect();
                for ((community, level, _), confidence) in moved {
                    memberships.remove(&(community, level, dup_id.clone()));
                    memberships
                        .entry((community, level, primary.clone()))
                        .or_insert(confidence);
                }
            }

            write_poisoned(&self.entities).remove(dup_id);
        }

        if let Some(name) = canonical_name {
            if !name.trim().is_empty() && name != merged.name {
                merged.add_alias(merged.name.clone());
                merged.name = name.to_string();
            }
        }
        merged.description = descriptions.join(" | ");
        merged.updated_at = chrono::Utc::now();
        write_poisoned(&self.entities).insert(primary.clone(), merged.clone());
        Ok(merged)
    }

    fn upsert_relationship(&self, relationship: &Relationship) -> Result<()> {
        {
            let entities = read_poisoned(&self.entities);
            for endpoint in [&relationship.source_id, &relationship.target_id] {
                if !entities.contains_key(endpoint) {
                    return Err(Error::NotFound {
                        resource: "entity".to_string(),
                        id: endpoint.to_string(),
                    });
                }
            }
        }
        let key = (
            relationship.source_id.clone(),
            relationship.target_id.clone(),
            relationship.rel_type.clone(),
        );
        let mut relationships = write_poisoned(&self.relationships);
        match relationships.get_mut(&key) {
            Some(existing) => {
                existing.confidence = existing.confidence.max(relationship.confidence);
                existing.weight += relationship.weight;
                if existing.description.is_empty() {
                    existing.description = relationship.description.clone();
                }
            },
            None => {
                relationships.insert(key, relationship.clone());
            },
        }
        Ok(())
    }

    fn relationships_of(&self, id: &EntityId) -> Result<Vec<Relationship>> {
        Ok(read_poisoned(&self.relationships)
            .values()
            .filter(|r| &r.source_id == id || &r.target_id == id)
            .cloned()
            .collect())
    }

    fn relationships_among(&self, ids: &[EntityId]) -> Result<Vec<Relationship>> {
        let set: HashSet<&EntityId> = ids.iter().collect();
        Ok(read_poisoned(&self.relationships)
            .values()
            .filter(|r| set.contains(&r.source_id) && set.contains(&r.target_id))
            .cloned()
            .collect())
    }

    fn relation_types_for(
        &self,
        ids: &[EntityId],
        min_confidence: f32,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        let set: HashSet<&EntityId> = ids.iter().collect();
        let mut counts: HashMap<String, u64> = HashMap::new();
        for rel in read_poisoned(&self.relationships).values() {
            if rel.confidence > min_confidence
                && (set.contains(&rel.source_id) || set.contains(&rel.target_id))
            {
                *counts.entry(rel.rel_type.clone()).or_insert(0) += rel.weight;
            }
        }
        let mut ordered: Vec<(String, u64)> = counts.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ordered.truncate(limit);
        Ok(ordered)
    }

    fn relation_targets(
        &self,
        source_ids: &[EntityId],
        rel_type: &str,
        document_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<RelationTarget>> {
        let set: HashSet<&EntityId> = source_ids.iter().collect();
        let entities = read_poisoned(&self.entities);
        let mut targets: Vec<(RelationTarget, u64)> = Vec::new();
        for rel in read_poisoned(&self.relationships).values() {
            if rel.rel_type != rel_type || !set.contains(&rel.source_id) {
                continue;
            }
            let Some(source) = entities.get(&rel.source_id) else {
                continue;
            };
            let Some(target) = entities.get(&rel.target_id) else {
                continue;
            };
            if !self.entity_in_documents(&target.id, document_ids) {
                continue;
            }
            targets.push((
                RelationTarget {
                    source_name: source.name.clone(),
                    target: target.clone(),
                    confidence: rel.confidence,
                    description: rel.description.clone(),
                },
                target.mention_count,
            ));
        }
        targets.sort_by(|a, b| {
            b.0.confidence
                .partial_cmp(&a.0.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.0.target.name.cmp(&b.0.target.name))
        });
        targets.truncate(limit);
        Ok(targets.into_iter().map(|(t, _)| t).collect())
    }

    fn put_text_unit(&self, unit: &TextUnit) -> Result<()> {
        write_poisoned(&self.text_units).insert(unit.id.clone(), unit.clone());
        Ok(())
    }

    fn get_text_unit(&self, id: &str) -> Result<Option<TextUnit>> {
        Ok(read_poisoned(&self.text_units).get(id).cloned())
    }

    fn create_mention(&self, mention: &EntityMention) -> Result<bool> {
        if !read_poisoned(&self.entities).contains_key(&mention.entity_id) {
            return Err(Error::NotFound {
                resource: "entity".to_string(),
                id: mention.entity_id.to_string(),
            });
        }
        if !read_poisoned(&self.text_units).contains_key(&mention.textunit_id) {
            return Err(Error::NotFound {
                resource: "text unit".to_string(),
                id: mention.textunit_id.clone(),
            });
        }
        Ok(write_poisoned(&self.mentions).insert(mention.clone()))
    }

    fn mention_texts(&self, id: &EntityId, limit: usize) -> Result<Vec<TextUnit>> {
        let text_units = read_poisoned(&self.text_units);
        let mut units: Vec<TextUnit> = read_poisoned(&self.mentions)
            .iter()
            .filter(|m| &m.entity_id == id)
            .filter_map(|m| text_units.get(&m.textunit_id).cloned())
            .collect();
        units.sort_by(|a, b| a.id.cmp(&b.id));
        units.truncate(limit);
        Ok(units)
    }

    fn entities_mentioned_by(&self, document_id: &str) -> Result<Vec<EntityId>> {
        let text_units = read_poisoned(&self.text_units);
        let mut ids: Vec<EntityId> = read_poisoned(&self.mentions)
            .iter()
            .filter(|m| {
                text_units
                    .get(&m.textunit_id)
                    .is_some_and(|tu| tu.document_id == document_id)
            })
            .map(|m| m.entity_id.clone())
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.dedup();
        Ok(ids)
    }

    fn upsert_claim(
        &self,
        claim: &Claim,
        subject_id: &EntityId,
        object_id: Option<&EntityId>,
        textunit_id: &str,
    ) -> Result<()> {
        if !read_poisoned(&self.text_units).contains_key(textunit_id) {
            return Err(Error::NotFound {
                resource: "text unit".to_string(),
                id: textunit_id.to_string(),
            });
        }
        let mut claims = write_poisoned(&self.claims);
        let mut claim_links = write_poisoned(&self.claim_links);
        match claims.get_mut(&claim.id) {
            Some(existing) => {
                existing.occurrence_count += 1;
            },
            None => {
                claims.insert(claim.id.clone(), claim.clone());
            },
        }
        let links = claim_links.entry(claim.id.clone()).or_insert(ClaimLinks {
            subject: subject_id.clone(),
            object: object_id.cloned(),
            sources: BTreeSet::new(),
        });
        links.sources.insert(textunit_id.to_string());
        Ok(())
    }

    fn query_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>> {
        let limit = if filter.limit == 0 { 100 } else { filter.limit };
        let subject_folded = filter.subject.as_ref().map(|s| s.trim().to_uppercase());
        let type_folded = filter.claim_type.as_ref().map(|t| t.trim().to_uppercase());
        let mut matched: Vec<Claim> = read_poisoned(&self.claims)
            .values()
            .filter(|c| {
                subject_folded.as_ref().is_none_or(|s| &c.subject == s)
                    && type_folded
                        .as_ref()
                        .is_none_or(|t| c.claim_type.to_uppercase() == *t)
                    && filter.status.is_none_or(|s| c.status == s)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched.truncate(limit);
        Ok(matched)
    }

    fn claim_sources(&self, claim_id: &str) -> Result<Vec<String>> {
        Ok(read_poisoned(&self.claim_links)
            .get(claim_id)
            .map(|links| links.sources.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_document_graph_data(&self, document_id: &str) -> Result<GraphDeletionStats> {
        let mut stats = GraphDeletionStats::default();

        let doomed_units: HashSet<String> = read_poisoned(&self.text_units)
            .values()
            .filter(|tu| tu.document_id == document_id)
            .map(|tu| tu.id.clone())
            .collect();
        if doomed_units.is_empty() {
            return Ok(stats);
        }
        stats.textunits_deleted = doomed_units.len();

        // Claims: deleted iff every source text unit is doomed.
        {
            let mut claims = write_poisoned(&self.claims);
            let mut claim_links = write_poisoned(&self.claim_links);
            let doomed_claims: Vec<String> = claim_links
                .iter()
                .filter(|(_, links)| links.sources.iter().all(|s| doomed_units.contains(s)))
                .map(|(id, _)| id.clone())
                .collect();
            for claim_id in &doomed_claims {
                claims.remove(claim_id);
                claim_links.remove(claim_id);
            }
            stats.claims_deleted = doomed_claims.len();
            for links in claim_links.values_mut() {
                links.sources.retain(|s| !doomed_units.contains(s));
            }
        }

        // Mentions: count per entity, then remove.
        let mut lost_mentions: HashMap<EntityId, u64> = HashMap::new();
        {
            let mut mentions = write_poisoned(&self.mentions);
            let doomed: Vec<EntityMention> = mentions
                .iter()
                .filter(|m| doomed_units.contains(&m.textunit_id))
                .cloned()
                .collect();
            for mention in doomed {
                *lost_mentions.entry(mention.entity_id.clone()).or_insert(0) += 1;
                mentions.remove(&mention);
            }
        }

        // Entities: decrement or delete.
        for (entity_id, lost) in lost_mentions {
            let remaining = {
                let mut entities = write_poisoned(&self.entities);
                match entities.get_mut(&entity_id) {
                    Some(entity) => {
                        entity.mention_count = entity.mention_count.saturating_sub(lost);
                        entity.updated_at = chrono::Utc::now();
                        Some(entity.mention_count)
                    },
                    None => None,
                }
            };
            match remaining {
                Some(0) => {
                    write_poisoned(&self.entities).remove(&entity_id);
                    self.remove_entity_everywhere(&entity_id);
                    stats.entities_deleted += 1;
                },
                Some(_) => stats.entities_affected += 1,
                None => {},
            }
        }

        write_poisoned(&self.text_units).retain(|id, _| !doomed_units.contains(id));
        Ok(stats)
    }

    fn upsert_community(&self, community: &Community) -> Result<()> {
        let mut communities = write_poisoned(&self.communities);
        match communities.get_mut(&(community.id, community.level)) {
            // An existing node keeps its summary fields across detection runs.
            Some(existing) => {
                existing.parent_id = community.parent_id;
                existing.member_count = community.member_count;
            },
            None => {
                communities.insert((community.id, community.level), community.clone());
            },
        }
        Ok(())
    }

    fn clear_community_memberships(&self, entity_ids: Option<&[EntityId]>) -> Result<()> {
        let mut memberships = write_poisoned(&self.memberships);
        match entity_ids {
            None => memberships.clear(),
            Some(ids) => {
                let set: HashSet<&EntityId> = ids.iter().collect();
                memberships.retain(|(_, _, entity), _| !set.contains(entity));
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
        if !read_poisoned(&self.communities).contains_key(&(community_id, level)) {
            return Err(Error::NotFound {
                resource: "community".to_string(),
                id: format!("{community_id}@L{level}"),
            });
        }
        write_poisoned(&self.memberships)
            .insert((community_id, level, entity_id.clone()), confidence);
        Ok(())
    }

    fn prune_empty_communities(&self) -> Result<usize> {
        let memberships = read_poisoned(&self.memberships);
        let populated: HashSet<(i64, u32)> = memberships
            .keys()
            .map(|(community, level, _)| (*community, *level))
            .collect();
        drop(memberships);
        let mut communities = write_poisoned(&self.communities);
        let before = communities.len();
        communities.retain(|key, _| populated.contains(key));
        Ok(before - communities.len())
    }

    fn list_communities(&self, level: Option<u32>) -> Result<Vec<Community>> {
        let mut out: Vec<Community> = read_poisoned(&self.communities)
            .values()
            .filter(|c| level.is_none_or(|l| c.level == l))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    fn get_community(&self, id: i64, level: u32) -> Result<Option<Community>> {
        Ok(read_poisoned(&self.communities).get(&(id, level)).cloned())
    }

    fn community_members(&self, id: i64, level: u32, limit: usize) -> Result<Vec<Entity>> {
        let entities = read_poisoned(&self.entities);
        let mut members: Vec<Entity> = read_poisoned(&self.memberships)
            .keys()
            .filter(|(community, l, _)| *community == id && *l == level)
            .filter_map(|(_, _, entity_id)| entities.get(entity_id).cloned())
            .collect();
        members.sort_by(|a, b| {
            b.mention_count
                .cmp(&a.mention_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        members.truncate(limit);
        Ok(members)
    }

    fn communities_of_entities(&self, ids: &[EntityId]) -> Result<Vec<(i64, u32)>> {
        let set: HashSet<&EntityId> = ids.iter().collect();
        let mut out: Vec<(i64, u32)> = read_poisoned(&self.memberships)
            .keys()
            .filter(|(_, _, entity)| set.contains(entity))
            .map(|(community, level, _)| (*community, *level))
            .collect();
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    fn update_community_report(
        &self,
        id: i64,
        level: u32,
        report: &CommunityReport,
    ) -> Result<()> {
        let mut communities = write_poisoned(&self.communities);
        let community = communities.get_mut(&(id, level)).ok_or_else(|| Error::NotFound {
            resource: "community".to_string(),
            id: format!("{id}@L{level}"),
        })?;
        community.title = Some(report.title.clone());
        community.summary = Some(report.summary.clone());
        community.themes = report.themes.clone();
        community.significance = Some(report.significance);
        community.rating = Some(report.rating.clamp(0.0, 10.0));
        community.summary_timestamp = Some(chrono::Utc::now());
        Ok(())
    }

    fn neighbor_ids(&self, ids: &[EntityId]) -> Result<Vec<EntityId>> {
        let set: HashSet<&EntityId> = ids.iter().collect();
        let mut out: HashSet<EntityId> = ids.iter().cloned().collect();
        for rel in read_poisoned(&self.relationships).values() {
            if set.contains(&rel.source_id) {
                out.insert(rel.target_id.clone());
            }
            if set.contains(&rel.target_id) {
                out.insert(rel.source_id.clone());
            }
        }
        let mut ordered: Vec<EntityId> = out.into_iter().collect();
        ordered.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ordered)
    }

    fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            entities: read_poisoned(&self.entities).len(),
            relationships: read_poisoned(&self.relationships).len(),
            text_units: read_poisoned(&self.text_units).len(),
            mentions: read_poisoned(&self.mentions).len(),
            claims: read_poisoned(&self.claims).len(),
            communities: read_poisoned(&self.communities).len(),
        })
    }
}
