// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::{MapData, Node};
use crate::topology::pairwise;
use crate::{earth_distance, GeoCoordinate};

/// Role of a graph edge within the road network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeType {
    ConnectionTurnLeft,
    ConnectionTurnRight,
    ConnectionUTurn,
    ConnectionMerge,
    ConnectionFork,
    ConnectionStraight,
    LaneStraight,
    LaneChange,
}

impl EdgeType {
    /// Whether this edge represents a junction connection rather than
    /// travel along a lane.
    pub fn is_connection(self) -> bool {
        matches!(
            self,
            Self::ConnectionTurnLeft
                | Self::ConnectionTurnRight
                | Self::ConnectionUTurn
                | Self::ConnectionMerge
                | Self::ConnectionFork
                | Self::ConnectionStraight
        )
    }

    pub fn is_lane_change(self) -> bool {
        matches!(self, Self::LaneChange)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionTurnLeft => "CONNECTION_TURN_LEFT",
            Self::ConnectionTurnRight => "CONNECTION_TURN_RIGHT",
            Self::ConnectionUTurn => "CONNECTION_UTURN",
            Self::ConnectionMerge => "CONNECTION_MERGE",
            Self::ConnectionFork => "CONNECTION_FORK",
            Self::ConnectionStraight => "CONNECTION_STRAIGHT",
            Self::LaneStraight => "LANE_STRAIGHT",
            Self::LaneChange => "LANE_CHANGE",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse road classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadClass {
    Highway,
    MajorRoad,
    LocalRoad,
    DirtRoad,
}

impl RoadClass {
    /// Maps an OSM `highway` tag value to a road class. Unknown and missing
    /// values default to [RoadClass::Highway], as provenance-free edges do.
    pub fn from_highway_tag(value: Option<&str>) -> Self {
        match value {
            Some("motorway") | Some("motorway_link") | Some("trunk") | Some("trunk_link") => {
                Self::Highway
            }
            Some("primary") | Some("primary_link") | Some("secondary")
            | Some("secondary_link") => Self::MajorRoad,
            Some("tertiary") | Some("tertiary_link") | Some("unclassified")
            | Some("residential") => Self::LocalRoad,
            Some("service") | Some("living_street") => Self::DirtRoad,
            _ => Self::Highway,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadAccessibility {
    NoRestriction,
    Private,
    Service,
    Hov,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleType {
    Car,
    Bus,
    Taxi,
    Emergency,
    Truck,
    All,
}

/// Payload of a directed [RoadGraph] edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub edge_type: EdgeType,
    pub road_class: RoadClass,
    pub road_accessibility: RoadAccessibility,
    pub vehicle_types: Vec<VehicleType>,
    pub geometry: Vec<GeoCoordinate>,
    pub tags: HashMap<String, String>,
}

/// An outgoing connection from a specific [RoadGraph] node.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub to: i64,
    pub segment: Segment,
}

/// Error conditions raised by [RoadGraph] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("node {0} does not exist in the graph")]
    MissingNode(i64),

    #[error("no edge from {0} to {1}")]
    MissingEdge(i64, i64),
}

/// Represents a road network as a directed graph of [Nodes](Node) and
/// [Segments](Segment) between them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RoadGraph(BTreeMap<i64, (Node, Vec<GraphEdge>)>);

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over all [Nodes](Node) in the graph.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.0.values().map(|(node, _)| node)
    }

    /// Returns an iterator over all edges as (from, to, segment) triples.
    pub fn iter_edges(&self) -> impl Iterator<Item = (i64, i64, &Segment)> {
        self.0
            .iter()
            .flat_map(|(&from, (_, edges))| edges.iter().map(move |e| (from, e.to, &e.segment)))
    }

    pub fn edge_count(&self) -> usize {
        self.0.values().map(|(_, edges)| edges.len()).sum()
    }

    /// Retrieves the [Node] with the provided id.
    pub fn get_node(&self, id: i64) -> Option<&Node> {
        self.0.get(&id).map(|(node, _)| node)
    }

    /// Adds a node under a freshly assigned id (one above the current
    /// maximum, or 0 for an empty graph) and returns that id.
    pub fn add_node(&mut self, mut data: Node) -> i64 {
        let id = self.0.keys().next_back().map_or(0, |&max| max + 1);
        data.id = id;
        self.0.insert(id, (data, Vec::new()));
        id
    }

    /// Creates or updates a [Node] under `node.id`.
    /// All outgoing and incoming edges are preserved.
    pub fn set_node(&mut self, node: Node) {
        match self.0.entry(node.id) {
            Entry::Vacant(e) => {
                e.insert((node, Vec::new()));
            }
            Entry::Occupied(mut e) => {
                e.get_mut().0 = node;
            }
        }
    }

    /// Gets all outgoing [edges](GraphEdge) of a node with a given id.
    pub fn get_edges(&self, from_id: i64) -> &[GraphEdge] {
        self.0
            .get(&from_id)
            .map(|(_, e)| e.as_slice())
            .unwrap_or_default()
    }

    /// Gets the [Segment] of the edge between two nodes.
    pub fn get_edge(&self, from_id: i64, to_id: i64) -> Option<&Segment> {
        self.0
            .get(&from_id)
            .and_then(|(_, edges)| edges.iter().find(|e| e.to == to_id).map(|e| &e.segment))
    }

    pub fn has_edge(&self, from_id: i64, to_id: i64) -> bool {
        self.get_edge(from_id, to_id).is_some()
    }

    /// Creates or replaces the edge between two existing nodes.
    pub fn add_edge(
        &mut self,
        from_id: i64,
        to_id: i64,
        segment: Segment,
    ) -> Result<(), GraphError> {
        if !self.0.contains_key(&to_id) {
            return Err(GraphError::MissingNode(to_id));
        }
        let (_, edges) = self
            .0
            .get_mut(&from_id)
            .ok_or(GraphError::MissingNode(from_id))?;

        if let Some(existing) = edges.iter_mut().find(|e| e.to == to_id) {
            existing.segment = segment;
        } else {
            edges.push(GraphEdge { to: to_id, segment });
        }
        Ok(())
    }

    /// Calculates the length of the edge between two connected nodes by
    /// summing the haversine distance along its geometry. Returns meters.
    pub fn distance(&self, from_id: i64, to_id: i64) -> Result<f64, GraphError> {
        let segment = self
            .get_edge(from_id, to_id)
            .ok_or(GraphError::MissingEdge(from_id, to_id))?;

        let km: f64 = segment
            .geometry
            .windows(2)
            .map(|pair| earth_distance(pair[0], pair[1]))
            .sum();
        Ok(km * 1000.0)
    }

    /// Basic health check: true iff every node is reachable from every other
    /// following edge directions. Graphs with at most one node count as
    /// connected.
    pub fn is_strongly_connected(&self) -> bool {
        let Some(&start) = self.0.keys().next() else {
            return true;
        };
        if self.0.len() == 1 {
            return true;
        }

        let mut reverse: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for (from, to, _) in self.iter_edges() {
            reverse.entry(to).or_default().push(from);
        }

        let forward = self.reach(start, |id| self.get_edges(id).iter().map(|e| e.to).collect());
        if forward.len() != self.0.len() {
            return false;
        }

        let backward = self.reach(start, |id| reverse.get(&id).cloned().unwrap_or_default());
        backward.len() == self.0.len()
    }

    fn reach<F: Fn(i64) -> Vec<i64>>(&self, start: i64, neighbours: F) -> HashSet<i64> {
        let mut seen = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            for next in neighbours(id) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    /// Loads a masked [MapData] triple into a graph: every consecutive node
    /// pair of every way becomes an edge (both directions for bidirectional
    /// ways) carrying a 2-point geometry from the endpoint node coordinates.
    ///
    /// A way node missing from the node collection is a fatal error.
    pub fn from_map_data(data: &MapData) -> Result<Self, GraphError> {
        let mut g = Self::default();
        for node in data.nodes.values() {
            g.set_node(node.clone());
        }

        for way in data.ways.values() {
            let oneway = way.is_oneway();
            let road_class =
                RoadClass::from_highway_tag(way.tags.get("highway").map(String::as_str));

            for (a, b) in pairwise(&way.nodes) {
                g.link(a, b, way.id, road_class)?;
                if !oneway {
                    g.link(b, a, way.id, road_class)?;
                }
            }
        }
        Ok(g)
    }

    fn link(
        &mut self,
        from: i64,
        to: i64,
        way_id: i64,
        road_class: RoadClass,
    ) -> Result<(), GraphError> {
        let from_coord = self
            .get_node(from)
            .map(|n| n.coord)
            .ok_or(GraphError::MissingNode(from))?;
        let to_coord = self
            .get_node(to)
            .map(|n| n.coord)
            .ok_or(GraphError::MissingNode(to))?;

        let segment = Segment {
            edge_type: EdgeType::LaneStraight,
            road_class,
            road_accessibility: RoadAccessibility::NoRestriction,
            vehicle_types: vec![VehicleType::Car],
            geometry: vec![from_coord, to_coord],
            tags: HashMap::from([("way_id".to_string(), way_id.to_string())]),
        };
        self.add_edge(from, to, segment)
    }
}
