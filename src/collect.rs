// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Assembly of [MapData] collections from a stream of raw map features.
//!
//! Parsing of concrete formats is left to external collaborators; they only
//! need to drive a [FeatureSink] with raw nodes, ways and relations.

use std::collections::HashMap;

use log::warn;

use crate::model::{MapData, Mask, Node, Relation, Via, Way};
use crate::topology::{find_common_node, get_adjacent_node, pairwise, sort_nodes};
use crate::GeoCoordinate;

/// Type of a raw map feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureType {
    Node,
    Way,
    Relation,
}

impl std::fmt::Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Way => write!(f, "way"),
            Self::Relation => write!(f, "relation"),
        }
    }
}

/// Represents a member of a raw relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMember {
    pub type_: FeatureType,
    pub ref_: i64,
    pub role: String,
}

/// A node as delivered by a map-format parser.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub id: i64,
    pub coord: GeoCoordinate,
    pub tags: HashMap<String, String>,
}

/// A way as delivered by a map-format parser.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWay {
    pub id: i64,
    pub nodes: Vec<i64>,
    pub tags: HashMap<String, String>,
}

/// A relation as delivered by a map-format parser.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRelation {
    pub id: i64,
    pub members: Vec<RelationMember>,
    pub tags: HashMap<String, String>,
}

/// Visitor interface driven by an external streaming parser.
///
/// Features must arrive nodes first, then ways, then relations, as
/// relations are resolved against the already-collected ways and nodes.
pub trait FeatureSink {
    fn on_node(&mut self, node: RawNode);
    fn on_way(&mut self, way: RawWay);
    fn on_relation(&mut self, relation: RawRelation);
}

/// Collects raw features into a [MapData] triple.
///
/// When constructed with a [Mask], ways are pre-filtered at collection time:
/// only highway-tagged ways with at least one consecutive node pair (in
/// either direction) present in the mask's edge set are kept. Restriction
/// relations are resolved into [Relation] values; anything unresolvable is
/// dropped with a warning.
pub struct MapBuilder {
    data: MapData,
    mask: Option<Mask>,
}

impl MapBuilder {
    pub fn new(mask: Option<Mask>) -> Self {
        Self {
            data: MapData::default(),
            mask,
        }
    }

    /// Consumes the builder, returning the collected data.
    pub fn into_data(self) -> MapData {
        self.data
    }

    pub fn data(&self) -> &MapData {
        &self.data
    }

    fn hd_edges_tag(&self, node_id: i64) -> String {
        let ids = self
            .mask
            .as_ref()
            .and_then(|m| m.hd_mapping.get(&node_id).cloned())
            .unwrap_or_default();
        serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
    }

    fn way_survives_mask(&self, nodes: &[i64]) -> bool {
        let Some(mask) = &self.mask else {
            return true;
        };
        let reversed: Vec<i64> = nodes.iter().rev().copied().collect();
        pairwise(nodes).any(|pair| mask.edges.contains(&pair))
            || pairwise(&reversed).any(|pair| mask.edges.contains(&pair))
    }

    fn resolve_relation(&self, r: &RawRelation) -> Option<Relation> {
        let mut from_way: Option<i64> = None;
        let mut to_way: Option<i64> = None;
        let mut via: Option<Via> = None;

        for m in &r.members {
            match (m.role.as_str(), m.type_) {
                ("from", _) => {
                    if !self.data.ways.contains_key(&m.ref_) {
                        return None;
                    }
                    from_way = Some(m.ref_);
                }
                ("to", _) => {
                    if !self.data.ways.contains_key(&m.ref_) {
                        return None;
                    }
                    to_way = Some(m.ref_);
                }
                ("via", FeatureType::Node) => {
                    if !self.data.nodes.contains_key(&m.ref_) {
                        return None;
                    }
                    via = Some(Via::Node(m.ref_));
                }
                ("via", FeatureType::Way) => {
                    let way = self.data.ways.get(&m.ref_)?;
                    let (nodes, mut ways) = match via.take() {
                        Some(Via::Ways { nodes, ways }) => (nodes, ways),
                        _ => (Vec::new(), Vec::new()),
                    };
                    ways.push(m.ref_);
                    via = Some(Via::Ways {
                        nodes: sort_nodes(&nodes, &way.nodes),
                        ways,
                    });
                }
                _ => {}
            }
        }

        let (from_way, to_way, via) = (from_way?, to_way?, via?);

        let adjacent = |way_id: i64| -> Option<i64> {
            let way_nodes = &self.data.ways.get(&way_id)?.nodes;
            match &via {
                Via::Node(id) => get_adjacent_node(way_nodes, *id),
                Via::Ways { nodes, .. } => {
                    get_adjacent_node(way_nodes, find_common_node(way_nodes, nodes)?)
                }
            }
        };
        let from_node = adjacent(from_way)?;
        let to_node = adjacent(to_way)?;

        Some(Relation {
            id: r.id,
            from_way,
            from_node,
            to_way,
            to_node,
            via,
            tags: r.tags.clone(),
        })
    }
}

impl FeatureSink for MapBuilder {
    fn on_node(&mut self, node: RawNode) {
        let mut tags = node.tags;
        tags.insert("hd_edges".to_string(), self.hd_edges_tag(node.id));
        self.data.nodes.insert(
            node.id,
            Node {
                id: node.id,
                coord: node.coord,
                ways: Vec::new(),
                tags,
            },
        );
    }

    fn on_way(&mut self, way: RawWay) {
        if !way.tags.contains_key("highway") || !self.way_survives_mask(&way.nodes) {
            return;
        }
        self.data
            .ways
            .insert(way.id, Way::new(way.id, way.nodes, way.tags));
    }

    fn on_relation(&mut self, relation: RawRelation) {
        let is_restriction = relation
            .tags
            .get("type")
            .is_some_and(|t| t.starts_with("restriction"))
            || relation.tags.contains_key("restriction");
        if !is_restriction {
            return;
        }

        match self.resolve_relation(&relation) {
            Some(resolved) => self.data.insert_relation(resolved),
            None => warn!("dropping unresolvable restriction {}", relation.id),
        }
    }
}
