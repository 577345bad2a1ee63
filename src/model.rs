// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;

use serde::{Deserialize, Serialize};

use crate::GeoCoordinate;

/// Represents a map node: a position with identity.
///
/// `ways` lists the ids of every way referencing this node; it is only
/// appended to during mask application. The coordinate is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub coord: GeoCoordinate,
    #[serde(default)]
    pub ways: Vec<i64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Node {
    pub fn new(id: i64, coord: GeoCoordinate) -> Self {
        Self {
            id,
            coord,
            ways: Vec::new(),
            tags: HashMap::new(),
        }
    }
}

/// Represents a way: an ordered sequence of node ids with tags.
///
/// A way with an empty node sequence is considered deleted and is dropped
/// at the end of mask application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub id: i64,
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Way {
    pub fn new(id: i64, nodes: Vec<i64>, tags: HashMap<String, String>) -> Self {
        Self { id, nodes, tags }
    }

    /// Whether the way is traversable in one direction only.
    /// Any `oneway` value other than `no`, `0` or `false` counts.
    pub fn is_oneway(&self) -> bool {
        match self.tags.get("oneway").map(String::as_str) {
            None => false,
            Some("no") | Some("0") | Some("false") => false,
            Some(_) => true,
        }
    }

    /// Whether the `oneway` tag points against the node sequence.
    pub fn is_reversed(&self) -> bool {
        matches!(
            self.tags.get("oneway").map(String::as_str),
            Some("-1") | Some("reverse")
        )
    }
}

/// The pivot of a turn restriction: either a single node, or an ordered
/// chain of ways together with the deduplicated node path along them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Via {
    Node(i64),
    Ways { nodes: Vec<i64>, ways: Vec<i64> },
}

impl Via {
    /// The via identity used in [RelationKey]: the node id, or the node path.
    pub fn key(&self) -> ViaKey {
        match self {
            Self::Node(id) => ViaKey::Node(*id),
            Self::Ways { nodes, .. } => ViaKey::Path(nodes.clone()),
        }
    }
}

/// Via part of a [RelationKey].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViaKey {
    Node(i64),
    Path(Vec<i64>),
}

/// Key of a [Relation] in a [MapData] collection:
/// the (from node, via identity, to node) triplet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationKey {
    pub from_node: i64,
    pub via: ViaKey,
    pub to_node: i64,
}

/// Represents a turn restriction between two ways.
///
/// `from_node` and `to_node` are the nodes adjacent to the via point within
/// the from/to way, on the far side from the via point. Tags carry
/// `type=restriction` and a `restriction` value naming the turn kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub from_way: i64,
    pub from_node: i64,
    pub to_way: i64,
    pub to_node: i64,
    pub via: Via,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Relation {
    pub fn key(&self) -> RelationKey {
        RelationKey {
            from_node: self.from_node,
            via: self.via.key(),
            to_node: self.to_node,
        }
    }
}

/// The operational-design-domain specification used to prune a base graph:
/// permitted nodes, permitted directed edges, permitted turn triplets, and
/// an optional HD-map lane mapping per node. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub nodes: BTreeSet<i64>,
    pub edges: BTreeSet<(i64, i64)>,
    pub relations: BTreeSet<(i64, i64, i64)>,
    #[serde(default)]
    pub hd_mapping: BTreeMap<i64, Vec<String>>,
}

impl Mask {
    /// Loads a mask from JSON.
    pub fn from_json<R: io::Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}

/// The node/way/relation triple every pipeline stage works on.
///
/// Keyed by id (relations by their [RelationKey]); `BTreeMap` keeps every
/// stage's iteration order deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "MapDataRepr", into = "MapDataRepr")]
pub struct MapData {
    pub nodes: BTreeMap<i64, Node>,
    pub ways: BTreeMap<i64, Way>,
    pub relations: BTreeMap<RelationKey, Relation>,
}

impl MapData {
    /// Inserts a relation under its derived key, replacing any previous
    /// relation with the same key.
    pub fn insert_relation(&mut self, relation: Relation) {
        self.relations.insert(relation.key(), relation);
    }

    /// Loads a previously saved graph from JSON.
    pub fn from_json<R: io::Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }

    /// Saves the graph as JSON.
    pub fn to_json<W: io::Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }
}

/// Serialized shape of [MapData]: relations are stored as a list, as their
/// in-memory keys are not valid JSON object keys.
#[derive(Serialize, Deserialize)]
struct MapDataRepr {
    nodes: BTreeMap<i64, Node>,
    ways: BTreeMap<i64, Way>,
    relations: Vec<Relation>,
}

impl From<MapDataRepr> for MapData {
    fn from(repr: MapDataRepr) -> Self {
        let mut data = MapData {
            nodes: repr.nodes,
            ways: repr.ways,
            relations: BTreeMap::new(),
        };
        for relation in repr.relations {
            data.insert_relation(relation);
        }
        data
    }
}

impl From<MapData> for MapDataRepr {
    fn from(data: MapData) -> Self {
        Self {
            nodes: data.nodes,
            ways: data.ways,
            relations: data.relations.into_values().collect(),
        }
    }
}
