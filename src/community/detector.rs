//! Hierarchical Leiden community detection over the entity subgraph.
//!
//! The projection is the undirected union of all typed relationships with
//! accumulated weights. Level 0 comes from modularity local moving followed
//! by connected-component refinement (the Leiden correction that keeps
//! communities internally connected); higher levels re-run the same step on
//! a super-graph whose nodes are the previous level's communities.
//!
//! Incremental mode re-clusters only the 1-hop neighborhood of a set of
//! affected entities, minting fresh community ids for the re-clustered
//! subgraph while untouched entities keep their assignments.

use crate::Result;
use crate::config::CommunityConfig;
use crate::models::{Community, EntityId};
use crate::storage::GraphStore;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};

/// Membership confidence written on detection edges.
const MEMBERSHIP_CONFIDENCE: f32 = 0.95;

/// Counters for one detection run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionStats {
    /// Hierarchy levels produced.
    pub levels: usize,
    /// Communities written.
    pub communities: usize,
    /// Entities that received at least one membership.
    pub entities_assigned: usize,
    /// Empty community nodes pruned afterwards.
    pub pruned: usize,
}

type Adjacency = HashMap<EntityId, HashMap<EntityId, f64>>;

/// Community detection service.
pub struct CommunityDetector {
    config: CommunityConfig,
}

impl CommunityDetector {
    /// Creates a detector.
    #[must_use]
    pub const fn new(config: CommunityConfig) -> Self {
        Self { config }
    }

    /// Full run over every entity with at least one relationship.
    ///
    /// Clears all membership edges, recreates community nodes per level, and
    /// prunes empties.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn run_full(&self, store: &dyn GraphStore) -> Result<DetectionStats> {
        let entities = store.list_entities(100_000, None)?;
        let ids: Vec<EntityId> = entities.into_iter().map(|e| e.id).collect();
        let adjacency = build_adjacency(store, &ids)?;

        store.clear_community_memberships(None)?;
        let stats = self.write_hierarchy(store, &adjacency, 0)?;
        Ok(stats)
    }

    /// Incremental run seeded by affected entities (deleted entities'
    /// neighbors and entities whose relationships changed).
    ///
    /// Expands to the 1-hop neighborhood, removes those entities'
    /// memberships, re-clusters the induced subgraph with fresh community
    /// ids, and prunes orphaned communities.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn run_incremental(
        &self,
        store: &dyn GraphStore,
        affected: &[EntityId],
    ) -> Result<DetectionStats> {
        if affected.is_empty() {
            return Ok(DetectionStats::default());
        }
        let neighborhood = store.neighbor_ids(affected)?;
        let adjacency = build_adjacency(store, &neighborhood)?;

        store.clear_community_memberships(Some(&neighborhood))?;
        // Fresh ids keep re-clustered communities distinct from survivors.
        let next_id = store
            .list_communities(None)?
            .iter()
            .map(|c| c.id)
            .max()
            .map_or(0, |max| max + 1);
        let mut stats = self.write_hierarchy(store, &adjacency, next_id)?;
        stats.pruned += store.prune_empty_communities()?;
        Ok(stats)
    }

    /// Detects the hierarchy over `adjacency` and writes it, numbering
    /// communities from `id_base`.
    fn write_hierarchy(
        &self,
        store: &dyn GraphStore,
        adjacency: &Adjacency,
        id_base: i64,
    ) -> Result<DetectionStats> {
        let mut stats = DetectionStats::default();
        let levels = self.detect_hierarchy(adjacency);
        stats.levels = levels.len();

        let mut assigned: HashSet<EntityId> = HashSet::new();
        // Walk top-down so parent ids are known when children are written.
        let mut parent_of: HashMap<(usize, usize), i64> = HashMap::new();
        let mut written_ids: Vec<Vec<i64>> = vec![Vec::new(); levels.len()];

        for (level_idx, level) in levels.iter().enumerate().rev() {
            for (community_idx, members) in level.iter().enumerate() {
                let community_id = id_base + next_offset(&written_ids);
                written_ids[level_idx].push(community_id);

                let mut community = Community::new(
                    community_id,
                    u32::try_from(level_idx).unwrap_or(u32::MAX),
                    members.len() as u64,
                );
                community.parent_id = parent_of.get(&(level_idx, community_idx)).copied();
                store.upsert_community(&community)?;
                for member in members {
                    store.add_community_member(
                        community_id,
                        community.level,
                        member,
                        MEMBERSHIP_CONFIDENCE,
                    )?;
                    assigned.insert(member.clone());
                }
                stats.communities += 1;

                // Record this community as parent of next-lower-level
                // communities fully contained in it.
                if level_idx > 0 {
                    let member_set: HashSet<&EntityId> = members.iter().collect();
                    for (child_idx, child) in levels[level_idx - 1].iter().enumerate() {
                        if child.iter().all(|id| member_set.contains(id)) {
                            parent_of.insert((level_idx - 1, child_idx), community_id);
                        }
                    }
                }
            }
        }

        stats.entities_assigned = assigned.len();
        stats.pruned += store.prune_empty_communities()?;
        Ok(stats)
    }

    /// Runs Leiden per level until the partition stops shrinking or the
    /// level cap is reached. Returns member lists per community per level.
    fn detect_hierarchy(&self, adjacency: &Adjacency) -> Vec<Vec<Vec<EntityId>>> {
        if adjacency.is_empty() {
            return Vec::new();
        }
        let level0 = self.detect_level(adjacency);
        if level0.is_empty() {
            return Vec::new();
        }

        let mut levels = vec![level0];
        for _ in 1..self.config.max_levels.max(1) {
            let Some(current) = levels.last() else {
                break;
            };
            if current.len() <= 1 {
                break;
            }
            let (super_adjacency, index_of) = build_super_adjacency(adjacency, current);
            let super_communities = self.detect_level(&super_adjacency);
            if super_communities.is_empty() || super_communities.len() >= current.len() {
                break;
            }

            let mut next: Vec<Vec<EntityId>> = Vec::with_capacity(super_communities.len());
            for super_members in &super_communities {
                let mut members: Vec<EntityId> = Vec::new();
                for super_node in super_members {
                    if let Some(&community_idx) = index_of.get(super_node) {
                        members.extend(current[community_idx].iter().cloned());
                    }
                }
                members.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                if !members.is_empty() {
                    next.push(members);
                }
            }
            if next.is_empty() || next.len() == current.len() {
                break;
            }
            levels.push(next);
        }
        levels
    }

    /// One Leiden pass: seeded local moving to a modularity optimum, then
    /// refinement splitting any disconnected community into its components.
    fn detect_level(&self, adjacency: &Adjacency) -> Vec<Vec<EntityId>> {
        let mut nodes: Vec<EntityId> = adjacency.keys().cloned().collect();
        if nodes.is_empty() {
            return Vec::new();
        }
        nodes.sort_by_cached_key(|id| seeded_order(self.config.leiden_seed, id));

        let total_weight = total_undirected_weight(adjacency);
        if total_weight <= f64::EPSILON {
            // No edges: every node is its own community.
            let mut singletons: Vec<Vec<EntityId>> = nodes.into_iter().map(|n| vec![n]).collect();
            singletons.sort_by(|a, b| a[0].as_str().cmp(b[0].as_str()));
            return singletons;
        }

        let mut assignment: HashMap<EntityId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let degrees: HashMap<EntityId, f64> = adjacency
            .iter()
            .map(|(id, neighbors)| (id.clone(), neighbors.values().sum()))
            .collect();

        for _ in 0..20 {
            let mut moved = false;
            for node in &nodes {
                let current = assignment[node];
                let mut candidates: Vec<usize> = vec![current];
                if let Some(neighbors) = adjacency.get(node) {
                    for neighbor in neighbors.keys() {
                        if let Some(&community) = assignment.get(neighbor) {
                            if !candidates.contains(&community) {
                                candidates.push(community);
                            }
                        }
                    }
                }
                candidates.sort_unstable();

                let mut best = current;
                let mut best_gain =
                    modularity_affinity(node, current, adjacency, &assignment, &degrees, total_weight);
                for &candidate in &candidates {
                    let gain = modularity_affinity(
                        node,
                        candidate,
                        adjacency,
                        &assignment,
                        &degrees,
                        total_weight,
                    );
                    if gain > best_gain + self.config.tolerance {
                        best_gain = gain;
                        best = candidate;
                    }
                }
                if best != current {
                    assignment.insert(node.clone(), best);
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }

        let refined = refine_connected(adjacency, &assignment);
        let mut grouped: BTreeMap<usize, Vec<EntityId>> = BTreeMap::new();
        for (node, community) in refined {
            grouped.entry(community).or_default().push(node);
        }
        let mut communities: Vec<Vec<EntityId>> = grouped
            .into_values()
            .map(|mut members| {
                members.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                members
            })
            .collect();
        communities.sort_by(|a, b| a[0].as_str().cmp(b[0].as_str()));
        communities
    }
}

/// Sequential id offset across all levels written so far.
fn next_offset(written: &[Vec<i64>]) -> i64 {
    written.iter().map(|level| level.len() as i64).sum()
}

/// Deterministic seeded ordering key for a node.
fn seeded_order(seed: u64, id: &EntityId) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    id.as_str().hash(&mut hasher);
    hasher.finish()
}

/// Projects the undirected entity graph: edge weights accumulate across
/// relationship types and directions.
fn build_adjacency(store: &dyn GraphStore, ids: &[EntityId]) -> Result<Adjacency> {
    let mut adjacency: Adjacency = ids.iter().map(|id| (id.clone(), HashMap::new())).collect();
    for rel in store.relationships_among(ids)? {
        let weight = rel.weight as f64;
        *adjacency
            .entry(rel.source_id.clone())
            .or_default()
            .entry(rel.target_id.clone())
            .or_insert(0.0) += weight;
        *adjacency
            .entry(rel.target_id)
            .or_default()
            .entry(rel.source_id)
            .or_insert(0.0) += weight;
    }
    Ok(adjacency)
}

/// Collapses a partition into a super-graph; returns adjacency between
/// synthetic community nodes and the community index of each synthetic node.
fn build_super_adjacency(
    adjacency: &Adjacency,
    communities: &[Vec<EntityId>],
) -> (Adjacency, HashMap<EntityId, usize>) {
    let mut community_of: HashMap<&EntityId, usize> = HashMap::new();
    for (idx, members) in communities.iter().enumerate() {
        for member in members {
            community_of.insert(member, idx);
        }
    }

    let super_node = |idx: usize| EntityId::new(format!("super_{idx}"));
    let mut super_adjacency: Adjacency = (0..communities.len())
        .map(|idx| (super_node(idx), HashMap::new()))
        .collect();
    let mut index_of: HashMap<EntityId, usize> = HashMap::new();
    for idx in 0..communities.len() {
        index_of.insert(super_node(idx), idx);
    }

    for (node, neighbors) in adjacency {
        let Some(&source) = community_of.get(node) else {
            continue;
        };
        for (neighbor, weight) in neighbors {
            let Some(&target) = community_of.get(neighbor) else {
                continue;
            };
            if source != target {
                *super_adjacency
                    .entry(super_node(source))
                    .or_default()
                    .entry(super_node(target))
                    .or_insert(0.0) += *weight / 2.0;
                *super_adjacency
                    .entry(super_node(target))
                    .or_default()
                    .entry(super_node(source))
                    .or_insert(0.0) += *weight / 2.0;
            }
        }
    }
    (super_adjacency, index_of)
}

fn total_undirected_weight(adjacency: &Adjacency) -> f64 {
    adjacency
        .values()
        .map(|neighbors| neighbors.values().sum::<f64>())
        .sum::<f64>()
        / 2.0
}

/// Modularity-oriented score of placing `node` in `candidate`.
fn modularity_affinity(
    node: &EntityId,
    candidate: usize,
    adjacency: &Adjacency,
    assignment: &HashMap<EntityId, usize>,
    degrees: &HashMap<EntityId, f64>,
    total_weight: f64,
) -> f64 {
    let Some(neighbors) = adjacency.get(node) else {
        return 0.0;
    };
    let k_i = degrees.get(node).copied().unwrap_or(0.0);
    if k_i <= f64::EPSILON {
        return 0.0;
    }

    let mut k_i_in = 0.0;
    for (neighbor, weight) in neighbors {
        if assignment.get(neighbor) == Some(&candidate) && neighbor != node {
            k_i_in += *weight;
        }
    }
    let mut sum_tot = 0.0;
    for (other, community) in assignment {
        if *community == candidate && other != node {
            sum_tot += degrees.get(other).copied().unwrap_or(0.0);
        }
    }
    k_i_in - (k_i * sum_tot) / (2.0 * total_weight)
}

/// Splits each community into its connected components.
fn refine_connected(
    adjacency: &Adjacency,
    assignment: &HashMap<EntityId, usize>,
) -> HashMap<EntityId, usize> {
    let mut by_community: BTreeMap<usize, Vec<EntityId>> = BTreeMap::new();
    for (node, community) in assignment {
        by_community.entry(*community).or_default().push(node.clone());
    }

    let mut refined = HashMap::new();
    let mut next_id = 0usize;
    for members in by_community.into_values() {
        let member_set: HashSet<&EntityId> = members.iter().collect();
        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut ordered = members.clone();
        ordered.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        for start in ordered {
            if visited.contains(&start) {
                continue;
            }
            let mut queue = VecDeque::from([start.clone()]);
            visited.insert(start);
            while let Some(node) = queue.pop_front() {
                refined.insert(node.clone(), next_id);
                if let Some(neighbors) = adjacency.get(&node) {
                    let mut neighbor_ids: Vec<&EntityId> = neighbors
                        .keys()
                        .filter(|n| member_set.contains(*n))
                        .collect();
                    neighbor_ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                    for neighbor in neighbor_ids {
                        if visited.insert(neighbor.clone()) {
                            queue.push_back(neighbor.clone());
                        }
                    }
                }
            }
            next_id += 1;
        }
    }
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, EntityType, Relationship};
    use crate::storage::InMemoryGraphStore;

    /// Two triangles joined by nothing: two clear communities.
    fn two_cluster_store() -> (InMemoryGraphStore, Vec<EntityId>) {
        let store = InMemoryGraphStore::new();
        let names = ["A1", "A2", "A3", "B1", "B2", "B3"];
        let ids: Vec<EntityId> = names
            .iter()
            .map(|n| {
                store
                    .upsert_entity(&Entity::new(*n, EntityType::Concept, "", 0.9))
                    .expect("entity")
                    .id
            })
            .collect();
        let edges = [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5)];
        for (s, t) in edges {
            store
                .upsert_relationship(&Relationship::new(
                    ids[s].clone(),
                    ids[t].clone(),
                    "RELATED_TO",
                    "",
                    0.9,
                ))
                .expect("rel");
        }
        (store, ids)
    }

    #[test]
    fn full_run_partitions_connected_entities() {
        let (store, ids) = two_cluster_store();
        let detector = CommunityDetector::new(CommunityConfig::default());
        let stats = detector.run_full(&store).expect("run");
        assert!(stats.levels >= 1);
        assert_eq!(stats.entities_assigned, 6);

        let level0 = store.list_communities(Some(0)).expect("list");
        assert_eq!(level0.len(), 2, "two triangles, two communities");

        // Every related entity holds a level-0 membership.
        let memberships = store.communities_of_entities(&ids).expect("memberships");
        assert!(memberships.iter().any(|(_, level)| *level == 0));
        for id in &ids {
            let mine = store
                .communities_of_entities(std::slice::from_ref(id))
                .expect("of entity");
            assert!(!mine.is_empty(), "{id} unassigned");
        }
    }

    #[test]
    fn detection_is_deterministic_for_a_fixed_seed() {
        let (store, _) = two_cluster_store();
        let detector = CommunityDetector::new(CommunityConfig::default());
        detector.run_full(&store).expect("first");
        let first: Vec<(i64, u64)> = store
            .list_communities(Some(0))
            .expect("list")
            .iter()
            .map(|c| (c.id, c.member_count))
            .collect();
        detector.run_full(&store).expect("second");
        let second: Vec<(i64, u64)> = store
            .list_communities(Some(0))
            .expect("list")
            .iter()
            .map(|c| (c.id, c.member_count))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn incremental_run_mints_fresh_ids_and_prunes() {
        let (store, ids) = two_cluster_store();
        let detector = CommunityDetector::new(CommunityConfig::default());
        detector.run_full(&store).expect("full");
        let max_before = store
            .list_communities(None)
            .expect("list")
            .iter()
            .map(|c| c.id)
            .max()
            .expect("some");

        // Touch only the A triangle.
        let stats = detector
            .run_incremental(&store, &ids[..1])
            .expect("incremental");
        assert!(stats.communities >= 1);
        let level0 = store.list_communities(Some(0)).expect("list");
        assert_eq!(level0.len(), 2, "B community survives, A re-minted");
        assert!(
            level0.iter().any(|c| c.id > max_before),
            "expected a freshly minted id"
        );
    }

    #[test]
    fn empty_graph_produces_no_communities() {
        let store = InMemoryGraphStore::new();
        let detector = CommunityDetector::new(CommunityConfig::default());
        let stats = detector.run_full(&store).expect("run");
        assert_eq!(stats.communities, 0);
    }
}
