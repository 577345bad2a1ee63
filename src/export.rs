// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Thin writers for common interchange formats. These only reformat already
//! consistent data; all topological work happens before export.

use std::collections::BTreeMap;
use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::json;

use crate::graph::{GraphError, RoadGraph, Segment};
use crate::model::{MapData, Via};
use crate::paths::Path;
use crate::GeoCoordinate;

/// Error conditions raised by the export writers.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Writes a [RoadGraph] as a GeoJSON feature collection: one Point per node
/// and one LineString per edge, colored by edge type.
pub fn graph_to_geojson<W: Write>(g: &RoadGraph, writer: W) -> Result<(), ExportError> {
    let mut features = Vec::new();

    for node in g.iter_nodes() {
        features.push(json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [node.coord.lng, node.coord.lat],
            },
            "properties": {
                "id": node.id,
                "marker-symbol": "marker",
            },
        }));
    }

    for (from, to, segment) in g.iter_edges() {
        let coordinates = edge_coordinates(g, from, to, segment)?;

        let stroke = if segment.edge_type.is_connection() {
            "green"
        } else if segment.edge_type.is_lane_change() {
            "blue"
        } else {
            "red"
        };

        let mut properties = serde_json::Map::new();
        for (k, v) in sorted_tags(&segment.tags) {
            properties.insert(k.clone(), json!(v));
        }
        properties.insert("type".to_string(), json!(segment.edge_type.as_str()));
        properties.insert("stroke".to_string(), json!(stroke));
        properties.insert("stroke-width".to_string(), json!(2));

        features.push(json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": coordinates,
            },
            "properties": properties,
        }));
    }

    let doc = json!({"type": "FeatureCollection", "features": features});
    serde_json::to_writer(writer, &doc)?;
    Ok(())
}

fn edge_coordinates(
    g: &RoadGraph,
    from: i64,
    to: i64,
    segment: &Segment,
) -> Result<Vec<[f64; 2]>, ExportError> {
    if !segment.geometry.is_empty() {
        return Ok(segment.geometry.iter().map(|c| [c.lng, c.lat]).collect());
    }

    // Fall back to the endpoint node positions
    let node = |id: i64| {
        g.get_node(id)
            .map(|n| n.coord)
            .ok_or(GraphError::MissingNode(id))
    };
    let (a, b) = (node(from)?, node(to)?);
    Ok(vec![[a.lng, a.lat], [b.lng, b.lat]])
}

/// Writes the compacted form of a [RoadGraph] as GraphML: nodes carry x/y
/// position attributes, edges a boolean `connection` flag.
pub fn graph_to_graphml<W: Write>(g: &RoadGraph, writer: W) -> Result<(), ExportError> {
    let mut xml = Writer::new_with_indent(writer, b' ', 2);
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut graphml = BytesStart::new("graphml");
    graphml.push_attribute(("xmlns", "http://graphml.graphdrawing.org/xmlns"));
    xml.write_event(Event::Start(graphml))?;

    for (id, target, name, type_) in [
        ("d0", "node", "x", "double"),
        ("d1", "node", "y", "double"),
        ("d2", "edge", "connection", "boolean"),
    ] {
        let mut key = BytesStart::new("key");
        key.push_attribute(("id", id));
        key.push_attribute(("for", target));
        key.push_attribute(("attr.name", name));
        key.push_attribute(("attr.type", type_));
        xml.write_event(Event::Empty(key))?;
    }

    let mut graph = BytesStart::new("graph");
    graph.push_attribute(("id", "G"));
    graph.push_attribute(("edgedefault", "directed"));
    xml.write_event(Event::Start(graph))?;

    for node in g.iter_nodes() {
        let mut el = BytesStart::new("node");
        el.push_attribute(("id", node.id.to_string().as_str()));
        xml.write_event(Event::Start(el))?;
        write_data(&mut xml, "d0", &node.coord.lng.to_string())?;
        write_data(&mut xml, "d1", &node.coord.lat.to_string())?;
        xml.write_event(Event::End(BytesEnd::new("node")))?;
    }

    for (from, to, segment) in g.iter_edges() {
        let mut el = BytesStart::new("edge");
        el.push_attribute(("source", from.to_string().as_str()));
        el.push_attribute(("target", to.to_string().as_str()));
        xml.write_event(Event::Start(el))?;
        write_data(
            &mut xml,
            "d2",
            if segment.edge_type.is_connection() {
                "true"
            } else {
                "false"
            },
        )?;
        xml.write_event(Event::End(BytesEnd::new("edge")))?;
    }

    xml.write_event(Event::End(BytesEnd::new("graph")))?;
    xml.write_event(Event::End(BytesEnd::new("graphml")))?;
    Ok(())
}

fn write_data<W: Write>(xml: &mut Writer<W>, key: &str, value: &str) -> Result<(), ExportError> {
    let mut el = BytesStart::new("data");
    el.push_attribute(("key", key));
    xml.write_event(Event::Start(el))?;
    xml.write_event(Event::Text(BytesText::new(value)))?;
    xml.write_event(Event::End(BytesEnd::new("data")))?;
    Ok(())
}

/// Writes a [MapData] triple as OSM XML.
pub fn map_data_to_osm_xml<W: Write>(data: &MapData, writer: W) -> Result<(), ExportError> {
    let mut xml = Writer::new_with_indent(writer, b' ', 2);
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut osm = BytesStart::new("osm");
    osm.push_attribute(("version", "0.6"));
    osm.push_attribute(("generator", "oddmask"));
    xml.write_event(Event::Start(osm))?;

    for node in data.nodes.values() {
        let mut el = BytesStart::new("node");
        el.push_attribute(("id", node.id.to_string().as_str()));
        el.push_attribute(("lat", node.coord.lat.to_string().as_str()));
        el.push_attribute(("lon", node.coord.lng.to_string().as_str()));

        if node.tags.is_empty() {
            xml.write_event(Event::Empty(el))?;
        } else {
            xml.write_event(Event::Start(el))?;
            write_tags(&mut xml, &node.tags)?;
            xml.write_event(Event::End(BytesEnd::new("node")))?;
        }
    }

    for way in data.ways.values() {
        let mut el = BytesStart::new("way");
        el.push_attribute(("id", way.id.to_string().as_str()));
        xml.write_event(Event::Start(el))?;
        for node_id in &way.nodes {
            let mut nd = BytesStart::new("nd");
            nd.push_attribute(("ref", node_id.to_string().as_str()));
            xml.write_event(Event::Empty(nd))?;
        }
        write_tags(&mut xml, &way.tags)?;
        xml.write_event(Event::End(BytesEnd::new("way")))?;
    }

    for relation in data.relations.values() {
        let mut el = BytesStart::new("relation");
        el.push_attribute(("id", relation.id.to_string().as_str()));
        xml.write_event(Event::Start(el))?;

        write_member(&mut xml, "way", "from", relation.from_way)?;
        match &relation.via {
            Via::Node(id) => write_member(&mut xml, "node", "via", *id)?,
            Via::Ways { ways, .. } => {
                for &way_id in ways {
                    write_member(&mut xml, "way", "via", way_id)?;
                }
            }
        }
        write_member(&mut xml, "way", "to", relation.to_way)?;

        write_tags(&mut xml, &relation.tags)?;
        xml.write_event(Event::End(BytesEnd::new("relation")))?;
    }

    xml.write_event(Event::End(BytesEnd::new("osm")))?;
    Ok(())
}

/// Writes a [MapData] triple as gzip-compressed OSM XML.
pub fn map_data_to_osm_xml_gz<W: Write>(data: &MapData, writer: W) -> Result<(), ExportError> {
    let mut encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
    map_data_to_osm_xml(data, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

fn write_member<W: Write>(
    xml: &mut Writer<W>,
    type_: &str,
    role: &str,
    ref_: i64,
) -> Result<(), ExportError> {
    let mut member = BytesStart::new("member");
    member.push_attribute(("type", type_));
    member.push_attribute(("role", role));
    member.push_attribute(("ref", ref_.to_string().as_str()));
    xml.write_event(Event::Empty(member))?;
    Ok(())
}

fn write_tags<W: Write>(
    xml: &mut Writer<W>,
    tags: &std::collections::HashMap<String, String>,
) -> Result<(), ExportError> {
    // The hd_edges entry is internal bookkeeping, not an OSM tag
    for (k, v) in sorted_tags(tags) {
        if k == "hd_edges" {
            continue;
        }
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", k.as_str()));
        tag.push_attribute(("v", v.as_str()));
        xml.write_event(Event::Empty(tag))?;
    }
    Ok(())
}

fn sorted_tags(tags: &std::collections::HashMap<String, String>) -> BTreeMap<&String, &String> {
    tags.iter().collect()
}

/// Writes extracted [Paths](Path) as a GeoJSON feature collection of
/// LineStrings, ready to be sent to a map-matching service.
pub fn paths_to_geojson<W: Write>(paths: &[Path], writer: W) -> Result<(), ExportError> {
    let features: Vec<serde_json::Value> = paths
        .iter()
        .map(|path| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": path
                        .geometry
                        .iter()
                        .map(|c: &GeoCoordinate| [c.lng, c.lat])
                        .collect::<Vec<_>>(),
                },
                "properties": {"edge_ids": path.edge_ids},
            })
        })
        .collect();

    let doc = json!({"type": "FeatureCollection", "features": features});
    serde_json::to_writer(writer, &doc)?;
    Ok(())
}
