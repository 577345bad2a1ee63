// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, HashSet};

use crate::graph::RoadGraph;
use crate::GeoCoordinate;

/// Ordered geometry of a maximal straight-line chain together with the
/// HD-lane ids of the segments it traverses. Consumed by external
/// map-matching services.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub geometry: Vec<GeoCoordinate>,
    pub edge_ids: Vec<String>,
}

/// Decomposes a [RoadGraph] into maximal simple chains.
///
/// Every edge is visited exactly once in depth-first order and greedily
/// appended to the current chain while continuity holds. Chains shorter than
/// `minimum_path_length` edges are extended by walking outward along
/// predecessor/successor links before emission. Lane-change segments (those
/// without an `hd_lane_id` tag) contribute no geometry point and no edge id;
/// chains consisting only of lane-changes are dropped.
pub struct PathExtractor<'a> {
    graph: &'a RoadGraph,
    minimum_path_length: usize,
}

impl<'a> PathExtractor<'a> {
    pub fn new(graph: &'a RoadGraph) -> Self {
        Self {
            graph,
            minimum_path_length: 6,
        }
    }

    pub fn with_minimum_path_length(graph: &'a RoadGraph, minimum_path_length: usize) -> Self {
        Self {
            graph,
            minimum_path_length,
        }
    }

    pub fn generate(&self) -> Vec<Path> {
        let edges = self.edge_dfs();
        if edges.is_empty() {
            return Vec::new();
        }

        let (mut chains, short_chains) = self.create_chains(&edges);
        chains.extend(self.splice_short_chains(&short_chains));

        let mut paths = Vec::new();
        for chain in chains {
            if let Some((geometry, edge_ids)) = self.coord_mapping(&chain) {
                paths.push(Path { geometry, edge_ids });
            }
        }
        paths
    }

    /// Walks every edge of the graph exactly once, depth-first, starting
    /// from each node in ascending id order.
    fn edge_dfs(&self) -> Vec<(i64, i64)> {
        let mut visited: HashSet<(i64, i64)> = HashSet::new();
        let mut out = Vec::new();

        for root in self.graph.iter_nodes().map(|n| n.id) {
            let mut stack = vec![(root, 0usize)];
            while let Some((node, idx)) = stack.pop() {
                let edges = self.graph.get_edges(node);
                if idx >= edges.len() {
                    continue;
                }
                stack.push((node, idx + 1));

                let edge = (node, edges[idx].to);
                if visited.insert(edge) {
                    out.push(edge);
                    stack.push((edge.1, 0));
                }
            }
        }
        out
    }

    fn create_chains(
        &self,
        edges: &[(i64, i64)],
    ) -> (Vec<Vec<(i64, i64)>>, Vec<Vec<(i64, i64)>>) {
        let mut chains = Vec::new();
        let mut short_chains = Vec::new();

        let mut chain = vec![edges[0]];
        let mut end = edges[0].1;

        for &edge in &edges[1..] {
            let last_in_chain = end;
            let (start, new_end) = edge;
            end = new_end;

            if start == last_in_chain {
                chain.push(edge);
            } else {
                self.add_chain(&mut chains, &mut short_chains, chain);
                chain = vec![edge];
            }
        }
        self.add_chain(&mut chains, &mut short_chains, chain);

        (chains, short_chains)
    }

    fn add_chain(
        &self,
        chains: &mut Vec<Vec<(i64, i64)>>,
        short_chains: &mut Vec<Vec<(i64, i64)>>,
        chain: Vec<(i64, i64)>,
    ) {
        if chain.len() >= self.minimum_path_length {
            chains.push(chain);
        } else {
            short_chains.push(chain);
        }
    }

    /// Re-emits each short chain extended with unique predecessor and
    /// successor walks from its endpoints.
    fn splice_short_chains(&self, short_chains: &[Vec<(i64, i64)>]) -> Vec<Vec<(i64, i64)>> {
        let mut predecessors: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for (from, to, _) in self.graph.iter_edges() {
            predecessors.entry(to).or_default().push(from);
        }

        let mut chains = Vec::new();
        for edges in short_chains {
            let first_node = edges[0].0;
            let last_node = edges[edges.len() - 1].1;

            let walked_back = self.walk(first_node, |id| {
                predecessors.get(&id).cloned().unwrap_or_default()
            });
            let walked_forward = self.walk(last_node, |id| {
                self.graph.get_edges(id).iter().map(|e| e.to).collect()
            });

            let mut nodes: Vec<i64> = walked_back.into_iter().rev().collect();
            nodes.extend(edges.iter().skip(1).map(|e| e.0));
            nodes.extend(walked_forward);

            let chain: Vec<(i64, i64)> =
                nodes.windows(2).map(|pair| (pair[0], pair[1])).collect();
            debug_assert!(chain
                .iter()
                .all(|&(from, to)| self.graph.has_edge(from, to)));
            chains.push(chain);
        }
        chains
    }

    /// Walks outward from `start`, taking at each step the first neighbour
    /// that can be continued from (or the last dead end otherwise), until a
    /// revisit or 5 accumulated hops. The result includes `start`.
    fn walk<F: Fn(i64) -> Vec<i64>>(&self, start: i64, next: F) -> Vec<i64> {
        let mut neighbours = vec![start];
        let mut nodes: Vec<i64> = Vec::new();

        while !neighbours.is_empty() {
            let mut node = neighbours[0];
            let mut found = Vec::new();
            for &candidate in &neighbours {
                node = candidate;
                found = next(candidate);
                if !found.is_empty() {
                    break;
                }
            }
            neighbours = found;

            if nodes.contains(&node) || nodes.len() > 5 {
                break;
            }
            nodes.push(node);
        }
        nodes
    }

    /// Derives the geometry and HD-lane-id list of a chain, skipping
    /// lane-change edges. Returns `None` for all-lane-change chains.
    fn coord_mapping(&self, chain: &[(i64, i64)]) -> Option<(Vec<GeoCoordinate>, Vec<String>)> {
        let mut edge_ids = Vec::new();
        let mut transitions: Vec<usize> = Vec::new();

        for (index, &(from, to)) in chain.iter().enumerate() {
            let lane_id = self
                .graph
                .get_edge(from, to)
                .and_then(|s| s.tags.get("hd_lane_id"));
            match lane_id {
                Some(id) => edge_ids.push(id.clone()),
                None => transitions.push(index),
            }
        }

        if edge_ids.is_empty() {
            return None;
        }

        let coord = |id: i64| {
            self.graph
                .get_node(id)
                .expect("edge endpoints exist in the graph")
                .coord
        };

        let mut geometry: Vec<GeoCoordinate> = chain
            .iter()
            .enumerate()
            .filter(|(index, _)| !transitions.contains(index))
            .map(|(_, &(from, _))| coord(from))
            .collect();
        geometry.push(coord(chain[chain.len() - 1].1));

        debug_assert_eq!(geometry.len(), edge_ids.len() + 1);
        Some((geometry, edge_ids))
    }
}
