// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::geo::{classify_turn, create_vector, Turn};
use crate::model::{MapData, Mask, Node, Relation, RelationKey, Via, ViaKey, Way};
use crate::topology::{find_common_node, pairwise};

/// Error conditions which abort [MaskApplier::apply].
///
/// Both variants indicate a mask inconsistent with the node collection.
/// No rollback is attempted; callers needing atomicity must clone the
/// [MapData] before applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("way {way} references node {node} absent from the node collection")]
    MissingWayNode { way: i64, node: i64 },

    #[error("mask references node {0} absent from the node collection")]
    MissingMaskNode(i64),
}

/// Prunes a [MapData] triple down to the subgraph described by a [Mask].
///
/// One application runs through five sequential stages:
/// node filtering, way filtering (with directional splitting), restriction
/// discovery and synthesis, way transformation around restriction via nodes,
/// and reconciliation of mask edges not represented by any surviving way.
/// Edge geometries are attached later, when the result is loaded into a
/// [RoadGraph](crate::RoadGraph).
///
/// The applier owns its working collections; process multiple masks with
/// independent instances.
pub struct MaskApplier {
    data: MapData,
}

impl MaskApplier {
    pub fn new(data: MapData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &MapData {
        &self.data
    }

    pub fn into_data(self) -> MapData {
        self.data
    }

    /// Applies the mask, mutating the owned collections in place.
    pub fn apply(&mut self, mask: &Mask) -> Result<(), ApplyError> {
        let MapData {
            nodes,
            ways,
            relations,
        } = &mut self.data;

        let next_way_id = ways.keys().next_back().copied().unwrap_or(0) + 1;
        let next_relation_id = relations.values().map(|r| r.id).max().unwrap_or(0) + 1;

        let mut stages = Stages {
            nodes,
            ways,
            relations,
            mask,
            next_way_id,
            next_relation_id,
        };
        stages.filter_nodes();
        stages.filter_ways()?;

        // Only restrictions present before discovery get their ways split;
        // synthesized ones already point at surviving ways
        let existing: Vec<RelationKey> = stages.relations.keys().cloned().collect();
        stages.find_restrictions()?;
        stages.transform_ways(&existing);

        stages.reconcile_edges();
        Ok(())
    }
}

/// Working state threaded through the pipeline stages. Way and relation id
/// counters are seeded from the highest pre-existing ids and only ever move
/// forward.
struct Stages<'a> {
    nodes: &'a mut BTreeMap<i64, Node>,
    ways: &'a mut BTreeMap<i64, Way>,
    relations: &'a mut BTreeMap<RelationKey, Relation>,
    mask: &'a Mask,
    next_way_id: i64,
    next_relation_id: i64,
}

impl<'a> Stages<'a> {
    fn take_way_id(&mut self) -> i64 {
        let id = self.next_way_id;
        self.next_way_id += 1;
        id
    }

    fn take_relation_id(&mut self) -> i64 {
        let id = self.next_relation_id;
        self.next_relation_id += 1;
        id
    }

    /// Retains only nodes permitted by the mask.
    fn filter_nodes(&mut self) {
        let mask = self.mask;
        self.nodes.retain(|id, _| mask.nodes.contains(id));
    }

    /// Trims every way to its mask-surviving edges, splitting bidirectional
    /// ways whose surviving directions disagree. Each surviving fragment is
    /// recorded on its member nodes.
    fn filter_ways(&mut self) -> Result<(), ApplyError> {
        let ids: Vec<i64> = self.ways.keys().copied().collect();
        for id in ids {
            let way = match self.ways.get(&id) {
                Some(w) => w.clone(),
                None => continue,
            };

            for fragment in self.filter_way(way) {
                for &node_id in &fragment.nodes {
                    let node =
                        self.nodes
                            .get_mut(&node_id)
                            .ok_or(ApplyError::MissingWayNode {
                                way: fragment.id,
                                node: node_id,
                            })?;
                    node.ways.push(fragment.id);
                }
                self.ways.insert(fragment.id, fragment);
            }
        }
        Ok(())
    }

    fn filter_way(&mut self, mut way: Way) -> Vec<Way> {
        if way.is_oneway() {
            let seq: Vec<i64> = if way.is_reversed() {
                way.nodes.iter().rev().copied().collect()
            } else {
                way.nodes.clone()
            };
            if way.is_reversed() {
                way.tags.insert("oneway".to_string(), "yes".to_string());
            }

            let pairs: Vec<(i64, i64)> = pairwise(&seq).collect();
            way.nodes = self.edges_to_seq(&pairs);
            return vec![way];
        }

        let reversed: Vec<i64> = way.nodes.iter().rev().copied().collect();
        let edges = self.surviving_pairs(&way.nodes);
        let reversed_edges = self.surviving_pairs(&reversed);

        // The backward survivors, re-expressed in forward orientation
        let flipped_back: Vec<(i64, i64)> = reversed_edges
            .iter()
            .rev()
            .map(|&(a, b)| (b, a))
            .collect();

        if edges == flipped_back {
            way.nodes = self.edges_to_seq(&edges);
            vec![way]
        } else {
            self.split_by_direction(edges, reversed_edges, flipped_back, way)
        }
    }

    /// Ordered, deduplicated consecutive pairs of `nodes` present in the mask.
    fn surviving_pairs(&self, nodes: &[i64]) -> Vec<(i64, i64)> {
        let mut pairs = Vec::new();
        for pair in pairwise(nodes) {
            if self.mask.edges.contains(&pair) && !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs
    }

    /// Collapses mask-surviving pairs into one ordered unique node sequence.
    fn edges_to_seq(&self, pairs: &[(i64, i64)]) -> Vec<i64> {
        let mut nodes: Vec<i64> = Vec::new();
        for &(a, b) in pairs {
            if !self.mask.edges.contains(&(a, b)) {
                continue;
            }
            if !nodes.contains(&a) {
                nodes.push(a);
            }
            if !nodes.contains(&b) {
                nodes.push(b);
            }
        }
        nodes
    }

    /// Handles a bidirectional way whose forward and backward surviving edge
    /// sets are not mirror images: the way collapses to a single
    /// one-directional way when one direction is empty, and is otherwise
    /// partitioned into bidirectional and one-directional fragments.
    fn split_by_direction(
        &mut self,
        edges: Vec<(i64, i64)>,
        reversed_edges: Vec<(i64, i64)>,
        flipped_back: Vec<(i64, i64)>,
        mut way: Way,
    ) -> Vec<Way> {
        debug_assert!(!edges.is_empty() || !flipped_back.is_empty());

        if edges.is_empty() {
            way.tags.insert("oneway".to_string(), "yes".to_string());
            way.nodes = self.edges_to_seq(&reversed_edges);
            return vec![way];
        }
        if flipped_back.is_empty() {
            way.tags.insert("oneway".to_string(), "yes".to_string());
            way.nodes = self.edges_to_seq(&edges);
            return vec![way];
        }

        let original_nodes = way.nodes.clone();

        let common: Vec<(i64, i64)> = edges
            .iter()
            .filter(|e| flipped_back.contains(e))
            .copied()
            .collect();
        let mut different: Vec<(i64, i64)> = edges
            .iter()
            .filter(|e| !flipped_back.contains(e))
            .copied()
            .collect();
        different.extend(flipped_back.iter().filter(|e| !edges.contains(e)));

        let mut fragments: Vec<Way> = Vec::new();

        for path in split_paths(&common) {
            let nodes = self.edges_to_seq(&path);
            if fragments.is_empty() {
                // First fragment keeps the original way's identity
                let mut first = way.clone();
                first.nodes = nodes;
                fragments.push(first);
            } else {
                let id = self.take_way_id();
                fragments.push(Way::new(id, nodes, way.tags.clone()));
            }
        }

        for path in split_paths(&different) {
            let mut nodes = self.edges_to_seq(&path);
            if nodes.is_empty() {
                // The run survives in the opposite direction only
                let inverted: Vec<(i64, i64)> =
                    path.iter().rev().map(|&(a, b)| (b, a)).collect();
                nodes = self.edges_to_seq(&inverted);
            }

            let mut tags = way.tags.clone();
            tags.insert("oneway".to_string(), "yes".to_string());

            if fragments.is_empty() {
                let mut first = way.clone();
                first.nodes = nodes;
                first.tags = tags;
                fragments.push(first);
            } else {
                let id = self.take_way_id();
                fragments.push(Way::new(id, nodes, tags));
            }
        }

        let new_ways: Vec<Way> = fragments
            .iter()
            .filter(|w| w.id != way.id)
            .cloned()
            .collect();
        if let Some(original_fragment) = fragments.iter().find(|w| w.id == way.id) {
            let original_fragment = original_fragment.clone();
            self.update_relations(&original_nodes, &original_fragment, &new_ways);
        }

        fragments
    }

    /// Scans every surviving way (in both directions) for mask edges leaving
    /// the way: each is a turn, and gets an existing restriction re-pointed
    /// or a new one synthesized.
    fn find_restrictions(&mut self) -> Result<(), ApplyError> {
        let ids: Vec<i64> = self.ways.keys().copied().collect();
        for id in ids {
            let nodes = match self.ways.get(&id) {
                Some(w) => w.nodes.clone(),
                None => continue,
            };
            self.find_restriction(&nodes, id)?;

            let reversed: Vec<i64> = nodes.iter().rev().copied().collect();
            self.find_restriction(&reversed, id)?;
        }
        Ok(())
    }

    fn find_restriction(&mut self, nodes: &[i64], from_way: i64) -> Result<(), ApplyError> {
        // The first node can only host a turn when coming from the opposite
        // direction, which the reversed scan covers
        for i in 1..nodes.len() {
            let node = nodes[i];

            let neighbours: Vec<i64> = self
                .mask
                .edges
                .range((node, i64::MIN)..=(node, i64::MAX))
                .map(|&(_, to)| to)
                .collect();

            for neighbour in neighbours {
                if nodes.contains(&neighbour) {
                    continue;
                }

                let from_node = nodes[i - 1];
                let seq = (from_node, node, neighbour);

                if self.mask.relations.contains(&seq)
                    || [from_node, node, neighbour]
                        .iter()
                        .any(|n| !self.mask.nodes.contains(n))
                    || !self.mask.edges.contains(&(from_node, node))
                    || !self.mask.edges.contains(&(node, neighbour))
                {
                    continue;
                }

                let neighbour_ways = self
                    .nodes
                    .get(&neighbour)
                    .ok_or(ApplyError::MissingMaskNode(neighbour))?
                    .ways
                    .clone();

                let mut to_way = None;
                for candidate in neighbour_ways {
                    if let Some(w) = self.ways.get(&candidate) {
                        if w.nodes.contains(&node) && w.nodes.contains(&neighbour) {
                            to_way = Some(candidate);
                        }
                    }
                }
                let Some(to_way) = to_way else { continue };

                let key = RelationKey {
                    from_node,
                    via: ViaKey::Node(node),
                    to_node: neighbour,
                };
                if let Some(existing) = self.relations.get_mut(&key) {
                    existing.from_node = from_node;
                    existing.to_node = neighbour;
                } else {
                    let turn = self.direction_between(seq)?;
                    let id = self.take_relation_id();
                    let tags: HashMap<String, String> = [
                        ("type".to_string(), "restriction".to_string()),
                        ("restriction".to_string(), turn.as_tag_value().to_string()),
                        ("version".to_string(), "1".to_string()),
                    ]
                    .into();

                    self.relations.insert(
                        key,
                        Relation {
                            id,
                            from_way,
                            from_node,
                            to_way,
                            to_node: neighbour,
                            via: Via::Node(node),
                            tags,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn direction_between(&self, seq: (i64, i64, i64)) -> Result<Turn, ApplyError> {
        let coord = |id: i64| {
            self.nodes
                .get(&id)
                .map(|n| n.coord)
                .ok_or(ApplyError::MissingMaskNode(id))
        };
        let v1 = create_vector(&[coord(seq.0)?, coord(seq.1)?]);
        let v2 = create_vector(&[coord(seq.1)?, coord(seq.2)?]);
        Ok(classify_turn(&v1, &v2).expect("displacement vectors are 2-dimensional"))
    }

    /// Validates the given via-node restrictions and splits their from/to
    /// ways at the via node when the via is interior; invalid restrictions
    /// are deleted. Ways left without nodes are dropped afterwards.
    fn transform_ways(&mut self, keys: &[RelationKey]) {
        for key in keys {
            let Some(relation) = self.relations.get(key) else {
                continue;
            };
            let Via::Node(via) = &relation.via else {
                // TODO: split via-way restrictions once they can be synthesized
                continue;
            };
            let via = *via;

            let (from_way, from_node) = (relation.from_way, relation.from_node);
            let (to_way, to_node) = (relation.to_way, relation.to_node);

            let valid = self.is_relation_valid(via, from_way, from_node)
                && self.is_relation_valid(via, to_way, to_node);
            if !valid {
                warn!(
                    "deleting restriction {:?}: via node {} is not adjacent within its ways",
                    key, via
                );
                self.relations.remove(key);
                continue;
            }

            self.split_way_at_restriction(via, from_way);
            // Splitting the from way may have re-pointed this restriction
            if let Some(relation) = self.relations.get(key) {
                let to_way = relation.to_way;
                self.split_way_at_restriction(via, to_way);
            }
        }

        self.ways.retain(|id, w| {
            if w.nodes.is_empty() {
                debug!("dropping way {}: no nodes survived the mask", id);
                false
            } else {
                true
            }
        });
    }

    /// A restriction leg is valid when (via, node) is an edge of the way,
    /// in either direction.
    fn is_relation_valid(&self, via: i64, way_id: i64, node_id: i64) -> bool {
        let Some(way) = self.ways.get(&way_id) else {
            return false;
        };
        pairwise(&way.nodes)
            .any(|pair| pair == (via, node_id) || pair == (node_id, via))
    }

    fn split_way_at_restriction(&mut self, via: i64, way_id: i64) {
        let Some(way) = self.ways.get(&way_id) else {
            return;
        };
        let ends_at_via = match (way.nodes.first(), way.nodes.last()) {
            (Some(&first), Some(&last)) => first == via || last == via,
            _ => return,
        };
        if !ends_at_via {
            self.split_way(way_id, via);
        }
    }

    /// Splits a way at `via`: the prefix up to and including `via` keeps the
    /// original id, the suffix starting at `via` becomes a new way. Every
    /// relation referencing the way is re-pointed at the fragment containing
    /// its nodes. A via absent from the way is a no-op.
    fn split_way(&mut self, way_id: i64, via: i64) {
        let (original_nodes, tags) = match self.ways.get(&way_id) {
            Some(w) => (w.nodes.clone(), w.tags.clone()),
            None => return,
        };

        let Some(index) = original_nodes.iter().position(|&n| n == via) else {
            debug_assert!(false, "split point must lie on the way");
            return;
        };

        let prefix = original_nodes[..=index].to_vec();
        let suffix = original_nodes[index..].to_vec();

        let new_id = self.take_way_id();
        let new_way = Way::new(new_id, suffix, tags);
        self.ways.insert(new_id, new_way.clone());

        let original_way = match self.ways.get_mut(&way_id) {
            Some(w) => {
                w.nodes = prefix;
                w.clone()
            }
            None => return,
        };

        self.update_relations(&original_nodes, &original_way, std::slice::from_ref(&new_way));
    }

    fn update_relations(
        &mut self,
        original_nodes: &[i64],
        original_way: &Way,
        new_ways: &[Way],
    ) {
        for relation in self.relations.values_mut() {
            if relation.from_way == original_way.id {
                if let Some(new_id) = updated_way_id(
                    &relation.via,
                    relation.from_node,
                    original_way,
                    new_ways,
                    original_nodes,
                ) {
                    relation.from_way = new_id;
                }
            }

            if relation.to_way == original_way.id {
                if let Some(new_id) = updated_way_id(
                    &relation.via,
                    relation.to_node,
                    original_way,
                    new_ways,
                    original_nodes,
                ) {
                    relation.to_way = new_id;
                }
            }

            if let Via::Ways { ways, .. } = &mut relation.via {
                if ways.contains(&original_way.id) {
                    ways.extend(new_ways.iter().map(|w| w.id));
                }
            }
        }
    }

    /// Synthesizes a minimal one-directional way for every mask edge not
    /// covered by any surviving way. Edges with endpoints missing from the
    /// node collection are skipped.
    fn reconcile_edges(&mut self) {
        let edges: Vec<(i64, i64)> = self.mask.edges.iter().copied().collect();
        for (a, b) in edges {
            if self.edge_is_covered(a, b) {
                continue;
            }
            if !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
                warn!("skipping mask edge ({}, {}): endpoint not in node collection", a, b);
                continue;
            }

            let id = self.take_way_id();
            let tags: HashMap<String, String> =
                [("oneway".to_string(), "yes".to_string())].into();
            for node_id in [a, b] {
                if let Some(node) = self.nodes.get_mut(&node_id) {
                    node.ways.push(id);
                }
            }
            self.ways.insert(id, Way::new(id, vec![a, b], tags));
        }
    }

    fn edge_is_covered(&self, a: i64, b: i64) -> bool {
        self.ways.values().any(|w| {
            let oneway = w.is_oneway();
            pairwise(&w.nodes).any(|(x, y)| (x, y) == (a, b) || (!oneway && (y, x) == (a, b)))
        })
    }
}

/// Partitions an ordered edge list into maximal contiguous runs: an edge
/// extends the current run iff its start matches the previous edge's end.
fn split_paths(edges: &[(i64, i64)]) -> Vec<Vec<(i64, i64)>> {
    let Some((&first, rest)) = edges.split_first() else {
        return Vec::new();
    };

    let mut paths = Vec::new();
    let mut path = vec![first];
    let mut end = first.1;

    for &edge in rest {
        let last_in_path = end;
        let (start, new_end) = edge;
        end = new_end;

        if start == last_in_path {
            path.push(edge);
        } else {
            paths.push(path);
            path = vec![edge];
        }
    }
    paths.push(path);

    paths
}

fn updated_way_id(
    via: &Via,
    node_id: i64,
    original_way: &Way,
    new_ways: &[Way],
    original_nodes: &[i64],
) -> Option<i64> {
    let relation_nodes: Vec<i64> = match via {
        Via::Node(id) => vec![node_id, *id],
        Via::Ways { nodes, .. } => match find_common_node(original_nodes, nodes) {
            Some(common) => vec![node_id, common],
            None => vec![node_id],
        },
    };

    if original_way
        .nodes
        .iter()
        .all(|n| relation_nodes.contains(n))
    {
        return None;
    }

    new_ways
        .iter()
        .find(|w| w.nodes.iter().all(|n| relation_nodes.contains(n)))
        .map(|w| w.id)
}
