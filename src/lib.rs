// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Road-network graph masking against an operational design domain (ODD).
//!
//! An ODD [Mask] names the nodes, directed edges and permitted turns a
//! vehicle may use. The [MaskApplier] prunes a base map — nodes, ways and
//! turn restrictions, as populated by a map-format adapter through the
//! [collect] visitor seam — down to exactly that subgraph: ways are trimmed
//! and split to the surviving edges, turn restrictions are re-pointed at the
//! resulting fragments, and restrictions are synthesized for turns the mask
//! does not permit. The result loads into a [RoadGraph] for path extraction
//! ([PathExtractor]) and export to interchange formats ([export]).
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//!
//! let data = oddmask::MapData::from_json(File::open("graph.json").unwrap())
//!     .expect("failed to load graph.json");
//! let mask = oddmask::Mask::from_json(File::open("mask.json").unwrap())
//!     .expect("failed to load mask.json");
//!
//! let mut applier = oddmask::MaskApplier::new(data);
//! applier.apply(&mask).expect("failed to apply mask");
//!
//! let graph = oddmask::RoadGraph::from_map_data(applier.data())
//!     .expect("masked data must be consistent");
//! let paths = oddmask::PathExtractor::new(&graph).generate();
//!
//! println!("{} paths over {} edges", paths.len(), graph.edge_count());
//! ```

pub mod collect;
pub mod export;
mod geo;
mod graph;
mod mask;
mod model;
mod paths;
mod topology;

pub use geo::{classify_turn, create_vector, earth_distance, GeoCoordinate, GeoError, Turn};
pub use graph::{
    EdgeType, GraphEdge, GraphError, RoadAccessibility, RoadClass, RoadGraph, Segment,
    VehicleType,
};
pub use mask::{ApplyError, MaskApplier};
pub use model::{MapData, Mask, Node, Relation, RelationKey, Via, ViaKey, Way};
pub use paths::{Path, PathExtractor};
pub use topology::{find_common_node, get_adjacent_node, reconstruct_chains, sort_nodes};
