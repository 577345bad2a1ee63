// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

mod apply;

pub use apply::{ApplyError, MaskApplier};

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet, HashMap};

    use super::*;
    use crate::model::{MapData, Mask, Node, Relation, RelationKey, Via, ViaKey, Way};
    use crate::GeoCoordinate;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node(id: i64, lng: f64, lat: f64) -> Node {
        Node {
            id,
            coord: GeoCoordinate { lat, lng, alt: 0.0 },
            ways: Vec::new(),
            tags: tags(&[("hd_edges", "[]")]),
        }
    }

    fn data(nodes: Vec<Node>, ways: Vec<Way>, relations: Vec<Relation>) -> MapData {
        let mut data = MapData {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
            ways: ways.into_iter().map(|w| (w.id, w)).collect(),
            relations: BTreeMap::new(),
        };
        for relation in relations {
            data.insert_relation(relation);
        }
        data
    }

    fn apply(base: MapData, mask: &Mask) -> MapData {
        let mut applier = MaskApplier::new(base);
        applier.apply(mask).expect("mask must apply cleanly");
        applier.into_data()
    }

    fn way_nodes(data: &MapData) -> BTreeMap<i64, Vec<i64>> {
        data.ways
            .iter()
            .map(|(&id, w)| (id, w.nodes.clone()))
            .collect()
    }

    fn node_way_refs(data: &MapData) -> BTreeMap<i64, Vec<i64>> {
        data.nodes
            .iter()
            .map(|(&id, n)| (id, n.ways.clone()))
            .collect()
    }

    /// OSM base graph used by the base-case fixture:
    ///
    /// ```text
    /// 1---2---3
    ///         |
    ///         4
    ///         |
    /// 7---6---5
    /// |
    /// 8
    /// ```
    fn base_case() -> (MapData, Mask) {
        let nodes = vec![
            node(1, 0.0, 0.0),
            node(2, 1.0, 0.0),
            node(3, 2.0, 0.0),
            node(4, 2.0, -1.0),
            node(5, 2.0, 2.0),
            node(6, 1.0, -2.0),
            node(7, 0.0, -2.0),
            node(8, 0.0, -3.0),
        ];
        let ways = vec![
            Way::new(1, vec![1, 2, 3], tags(&[("highway", "primary")])),
            Way::new(2, vec![3, 4, 5], tags(&[("highway", "primary")])),
            Way::new(3, vec![7, 6, 5], tags(&[("highway", "primary")])),
            Way::new(4, vec![7, 8], tags(&[("highway", "primary")])),
        ];
        let relations = vec![
            Relation {
                id: 1,
                from_way: 1,
                from_node: 2,
                to_way: 2,
                to_node: 4,
                via: Via::Node(3),
                tags: tags(&[("type", "restriction"), ("restriction", "no_right_turn")]),
            },
            Relation {
                id: 2,
                from_way: 1,
                from_node: 2,
                to_way: 3,
                to_node: 6,
                via: Via::Ways {
                    nodes: vec![3, 4, 5],
                    ways: vec![2],
                },
                tags: tags(&[("type", "restriction"), ("restriction", "no_u_turn")]),
            },
            Relation {
                id: 3,
                from_way: 3,
                from_node: 6,
                to_way: 4,
                to_node: 8,
                via: Via::Node(7),
                tags: tags(&[("type", "restriction"), ("restriction", "no_left_turn")]),
            },
        ];
        let mask = Mask {
            nodes: [1, 2, 3, 4, 5, 6, 7].into(),
            edges: [(1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7)].into(),
            relations: [(1, 2, 3), (3, 4, 5), (4, 5, 6), (5, 6, 7)].into(),
            hd_mapping: BTreeMap::new(),
        };
        (data(nodes, ways, relations), mask)
    }

    #[test]
    fn base_case_prunes_and_reorients() {
        let (base, mask) = base_case();
        let result = apply(base, &mask);

        // Node 8 is outside the mask
        assert_eq!(
            result.nodes.keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 6, 7]
        );

        // Every surviving way becomes one-directional; way 3 is reassembled
        // against its original node order, way 4 disappears entirely
        let expected_tags = tags(&[("highway", "primary"), ("oneway", "yes")]);
        let expected_ways: BTreeMap<i64, Way> = [
            Way::new(1, vec![1, 2, 3], expected_tags.clone()),
            Way::new(2, vec![3, 4, 5], expected_tags.clone()),
            Way::new(3, vec![5, 6, 7], expected_tags.clone()),
        ]
        .into_iter()
        .map(|w| (w.id, w))
        .collect();
        assert_eq!(result.ways, expected_ways);

        // The via-node restriction at 3 and the via-ways restriction survive;
        // the one through deleted way 4 does not
        assert_eq!(
            result.relations.keys().cloned().collect::<Vec<_>>(),
            vec![
                RelationKey {
                    from_node: 2,
                    via: ViaKey::Node(3),
                    to_node: 4
                },
                RelationKey {
                    from_node: 2,
                    via: ViaKey::Path(vec![3, 4, 5]),
                    to_node: 6
                },
            ]
        );
        let kept = &result.relations[&RelationKey {
            from_node: 2,
            via: ViaKey::Node(3),
            to_node: 4,
        }];
        assert_eq!((kept.id, kept.from_way, kept.to_way), (1, 1, 2));
    }

    /// Turns at a crossing of two oneway ways:
    ///
    /// ```text
    ///     4
    ///     |
    /// 1---2-->3
    ///     |
    ///     v
    ///     5
    /// ```
    #[test]
    fn new_turn_restrictions_are_created() {
        let nodes = vec![
            node(1, -1.0, 0.0),
            node(2, 0.0, 0.0),
            node(3, 1.0, 0.0),
            node(4, 0.0, 1.0),
            node(5, 0.0, -1.0),
        ];
        let ways = vec![
            Way::new(
                1,
                vec![1, 2, 3],
                tags(&[("highway", "primary"), ("oneway", "yes")]),
            ),
            Way::new(
                2,
                vec![4, 2, 5],
                tags(&[("highway", "primary"), ("oneway", "yes")]),
            ),
        ];
        let mask = Mask {
            nodes: [1, 2, 3, 4, 5].into(),
            edges: [(1, 2), (2, 3), (4, 2), (2, 5)].into(),
            relations: [(1, 2, 3), (4, 2, 5), (4, 2, 1)].into(),
            hd_mapping: BTreeMap::new(),
        };

        let result = apply(data(nodes, ways, vec![]), &mask);

        // Ways stay untouched, but the two turns not permitted by the mask
        // get synthesized restrictions with fresh ids 1 and 2
        assert_eq!(
            way_nodes(&result),
            [(1, vec![1, 2, 3]), (2, vec![4, 2, 5])].into()
        );

        let expected: BTreeMap<RelationKey, Relation> = [
            Relation {
                id: 1,
                from_way: 1,
                from_node: 1,
                to_way: 2,
                to_node: 5,
                via: Via::Node(2),
                tags: tags(&[
                    ("type", "restriction"),
                    ("restriction", "no_right_turn"),
                    ("version", "1"),
                ]),
            },
            Relation {
                id: 2,
                from_way: 2,
                from_node: 4,
                to_way: 1,
                to_node: 3,
                via: Via::Node(2),
                tags: tags(&[
                    ("type", "restriction"),
                    ("restriction", "no_left_turn"),
                    ("version", "1"),
                ]),
            },
        ]
        .into_iter()
        .map(|r| (r.key(), r))
        .collect();
        assert_eq!(result.relations, expected);

        assert_eq!(
            node_way_refs(&result),
            [
                (1, vec![1]),
                (2, vec![1, 2]),
                (3, vec![1]),
                (4, vec![2]),
                (5, vec![2])
            ]
            .into()
        );
    }

    #[test]
    fn bidirectional_way_becomes_onedirectional() {
        let nodes = vec![node(1, -1.0, 0.0), node(2, 0.0, 0.0), node(3, 1.0, 0.0)];
        let ways = vec![Way::new(1, vec![1, 2, 3], tags(&[("highway", "primary")]))];
        let mask = Mask {
            nodes: [1, 2, 3].into(),
            edges: [(1, 2), (2, 3)].into(),
            relations: [(1, 2, 3)].into(),
            hd_mapping: BTreeMap::new(),
        };

        let result = apply(data(nodes, ways, vec![]), &mask);

        let expected: BTreeMap<i64, Way> = [(
            1,
            Way::new(
                1,
                vec![1, 2, 3],
                tags(&[("highway", "primary"), ("oneway", "yes")]),
            ),
        )]
        .into();
        assert_eq!(result.ways, expected);
        assert!(result.relations.is_empty());
    }

    #[test]
    fn nodes_in_way_get_filtered_out() {
        // Way nodes 4 and 5 were prefiltered away; the mask only covers 1-2-3
        let nodes = vec![node(1, -1.0, 0.0), node(2, 0.0, 0.0), node(3, 1.0, 0.0)];
        let ways = vec![Way::new(
            1,
            vec![1, 2, 3, 4, 5],
            tags(&[("highway", "primary")]),
        )];
        let mask = Mask {
            nodes: [1, 2, 3].into(),
            edges: [(1, 2), (2, 1), (2, 3), (3, 2)].into(),
            relations: [(1, 2, 3), (3, 2, 1)].into(),
            hd_mapping: BTreeMap::new(),
        };

        let result = apply(data(nodes, ways, vec![]), &mask);

        // Symmetric survival: the way is trimmed but stays bidirectional
        let expected: BTreeMap<i64, Way> = [(
            1,
            Way::new(1, vec![1, 2, 3], tags(&[("highway", "primary")])),
        )]
        .into();
        assert_eq!(result.ways, expected);
        assert_eq!(
            node_way_refs(&result),
            [(1, vec![1]), (2, vec![1]), (3, vec![1])].into()
        );
    }

    /// A bidirectional ring way with direction-dependent survival:
    ///
    /// ```text
    /// ---1-------2---
    ///    |       |
    ///    5       |
    ///    |       |
    ///    4-------3
    /// ```
    fn ring() -> (Vec<Node>, Vec<Way>) {
        let nodes = vec![
            node(1, -2.0, 0.0),
            node(2, 0.0, 0.0),
            node(3, 0.0, -2.0),
            node(4, -2.0, -2.0),
            node(5, -2.0, -1.0),
        ];
        let ways = vec![
            Way::new(1, vec![1, 2], tags(&[("highway", "primary")])),
            Way::new(2, vec![1, 5, 4, 3, 2], tags(&[("highway", "primary")])),
        ];
        (nodes, ways)
    }

    #[test]
    fn ways_get_split_and_nodes_are_in_right_order() {
        let (nodes, ways) = ring();
        let mask = Mask {
            nodes: [1, 2, 3, 4, 5].into(),
            edges: [(1, 2), (2, 1), (2, 3), (3, 2), (3, 4), (4, 5), (5, 1)].into(),
            relations: [(1, 2, 3), (2, 3, 4), (3, 4, 5), (4, 5, 1), (3, 2, 1), (5, 1, 2)]
                .into(),
            hd_mapping: BTreeMap::new(),
        };

        let result = apply(data(nodes, ways, vec![]), &mask);

        let expected: BTreeMap<i64, Way> = [
            Way::new(1, vec![1, 2], tags(&[("highway", "primary")])),
            Way::new(2, vec![3, 2], tags(&[("highway", "primary")])),
            Way::new(
                3,
                vec![3, 4, 5, 1],
                tags(&[("highway", "primary"), ("oneway", "yes")]),
            ),
        ]
        .into_iter()
        .map(|w| (w.id, w))
        .collect();
        assert_eq!(result.ways, expected);
        assert!(result.relations.is_empty());

        assert_eq!(
            node_way_refs(&result),
            [
                (1, vec![1, 3]),
                (2, vec![1, 2]),
                (3, vec![2, 3]),
                (4, vec![3]),
                (5, vec![3])
            ]
            .into()
        );
    }

    #[test]
    fn way_gets_split_into_multiple_ways() {
        let (nodes, ways) = ring();
        let mask = Mask {
            nodes: [1, 2, 3, 4, 5].into(),
            edges: [
                (1, 2),
                (2, 1),
                (2, 3),
                (3, 2),
                (3, 4),
                (4, 5),
                (5, 4),
                (5, 1),
                (1, 5),
            ]
            .into(),
            relations: [
                (1, 2, 3),
                (2, 3, 4),
                (3, 4, 5),
                (4, 5, 1),
                (3, 2, 1),
                (5, 1, 2),
                (2, 1, 5),
                (1, 5, 4),
            ]
            .into(),
            hd_mapping: BTreeMap::new(),
        };

        let result = apply(data(nodes, ways, vec![]), &mask);

        // Two bidirectional runs survive plus one forward-only run
        let expected: BTreeMap<i64, Way> = [
            Way::new(1, vec![1, 2], tags(&[("highway", "primary")])),
            Way::new(2, vec![1, 5, 4], tags(&[("highway", "primary")])),
            Way::new(3, vec![3, 2], tags(&[("highway", "primary")])),
            Way::new(
                4,
                vec![3, 4],
                tags(&[("highway", "primary"), ("oneway", "yes")]),
            ),
        ]
        .into_iter()
        .map(|w| (w.id, w))
        .collect();
        assert_eq!(result.ways, expected);

        assert_eq!(
            node_way_refs(&result),
            [
                (1, vec![1, 2]),
                (2, vec![1, 3]),
                (3, vec![3, 4]),
                (4, vec![2, 4]),
                (5, vec![2])
            ]
            .into()
        );
    }

    /// Crossing of two oneway ways with restrictions through interior node 2:
    ///
    /// ```text
    ///     4
    ///     |
    /// 1---2-->3
    ///     |
    ///     v
    ///     5
    /// ```
    #[test]
    fn ways_get_split_and_referring_relations_are_updated() {
        let nodes = vec![
            node(1, -1.0, 0.0),
            node(2, 0.0, 0.0),
            node(3, 1.0, 0.0),
            node(4, 0.0, 1.0),
            node(5, 0.0, -1.0),
        ];
        let ways = vec![
            Way::new(
                1,
                vec![1, 2, 3],
                tags(&[("highway", "primary"), ("oneway", "yes")]),
            ),
            Way::new(
                2,
                vec![4, 2, 5],
                tags(&[("highway", "primary"), ("oneway", "yes")]),
            ),
        ];
        let relations = vec![
            Relation {
                id: 1,
                from_way: 1,
                from_node: 1,
                to_way: 2,
                to_node: 5,
                via: Via::Node(2),
                tags: tags(&[("type", "restriction"), ("restriction", "no_right_turn")]),
            },
            Relation {
                id: 2,
                from_way: 2,
                from_node: 4,
                to_way: 1,
                to_node: 3,
                via: Via::Node(2),
                tags: tags(&[("type", "restriction"), ("restriction", "no_left_turn")]),
            },
        ];
        let mask = Mask {
            nodes: [1, 2, 3, 4, 5].into(),
            edges: [(1, 2), (2, 3), (4, 2), (2, 5)].into(),
            relations: BTreeSet::new(),
            hd_mapping: BTreeMap::new(),
        };

        let result = apply(data(nodes, ways, relations), &mask);

        // Both ways split at the interior via node; the restrictions follow
        // the fragments carrying their from/to nodes
        let oneway = tags(&[("highway", "primary"), ("oneway", "yes")]);
        let expected: BTreeMap<i64, Way> = [
            Way::new(1, vec![1, 2], oneway.clone()),
            Way::new(2, vec![4, 2], oneway.clone()),
            Way::new(3, vec![2, 3], oneway.clone()),
            Way::new(4, vec![2, 5], oneway.clone()),
        ]
        .into_iter()
        .map(|w| (w.id, w))
        .collect();
        assert_eq!(result.ways, expected);

        assert_eq!(result.relations.len(), 2);
        let first = &result.relations[&RelationKey {
            from_node: 1,
            via: ViaKey::Node(2),
            to_node: 5,
        }];
        assert_eq!((first.from_way, first.to_way), (1, 4));

        let second = &result.relations[&RelationKey {
            from_node: 4,
            via: ViaKey::Node(2),
            to_node: 3,
        }];
        assert_eq!((second.from_way, second.to_way), (2, 3));
    }

    /// Splitting a via way extends via-ways restrictions:
    ///
    /// ```text
    ///         6
    ///         |
    ///     1---2---3
    ///     |       |
    ///     4       5
    /// ```
    #[test]
    fn ways_get_split_and_via_ways_are_updated() {
        let nodes = vec![
            node(1, -1.0, 0.0),
            node(2, 0.0, 0.0),
            node(3, 1.0, 0.0),
            node(4, -1.0, -1.0),
            node(5, 1.0, -1.0),
            node(6, 0.0, 1.0),
        ];
        let oneway = tags(&[("highway", "primary"), ("oneway", "yes")]);
        let ways = vec![
            Way::new(1, vec![1, 2, 3], oneway.clone()),
            Way::new(2, vec![4, 1], oneway.clone()),
            Way::new(3, vec![3, 5], oneway.clone()),
            Way::new(4, vec![2, 6], tags(&[("highway", "primary")])),
        ];
        let relations = vec![
            Relation {
                id: 1,
                from_way: 2,
                from_node: 1,
                to_way: 3,
                to_node: 5,
                via: Via::Ways {
                    nodes: vec![1, 2, 3],
                    ways: vec![1],
                },
                tags: tags(&[("type", "restriction"), ("restriction", "no_u_turn")]),
            },
            Relation {
                id: 2,
                from_way: 4,
                from_node: 6,
                to_way: 1,
                to_node: 3,
                via: Via::Node(2),
                tags: tags(&[("type", "restriction"), ("restriction", "no_left_turn")]),
            },
        ];
        let mask = Mask {
            nodes: [1, 2, 3, 4, 5, 6].into(),
            edges: [(1, 2), (2, 3), (4, 1), (3, 5), (2, 6), (6, 2)].into(),
            relations: [(1, 2, 6), (2, 3, 5), (4, 1, 2)].into(),
            hd_mapping: BTreeMap::new(),
        };

        let result = apply(data(nodes, ways, relations), &mask);

        let expected: BTreeMap<i64, Way> = [
            Way::new(1, vec![1, 2], oneway.clone()),
            Way::new(2, vec![4, 1], oneway.clone()),
            Way::new(3, vec![3, 5], oneway.clone()),
            Way::new(4, vec![2, 6], tags(&[("highway", "primary")])),
            Way::new(5, vec![2, 3], oneway.clone()),
        ]
        .into_iter()
        .map(|w| (w.id, w))
        .collect();
        assert_eq!(result.ways, expected);

        let via_ways = &result.relations[&RelationKey {
            from_node: 1,
            via: ViaKey::Path(vec![1, 2, 3]),
            to_node: 5,
        }];
        assert_eq!(
            via_ways.via,
            Via::Ways {
                nodes: vec![1, 2, 3],
                ways: vec![1, 5]
            }
        );
        assert_eq!((via_ways.from_way, via_ways.to_way), (2, 3));

        let via_node = &result.relations[&RelationKey {
            from_node: 6,
            via: ViaKey::Node(2),
            to_node: 3,
        }];
        assert_eq!((via_node.from_way, via_node.to_way), (4, 5));
    }

    /// Restrictions whose via is no longer adjacent within the surviving
    /// ways are deleted:
    ///
    /// ```text
    /// 1   4
    ///  \  |
    ///   2 |
    ///    \|
    ///     3
    /// ```
    #[test]
    fn relations_with_edges_outside_mask_get_deleted() {
        let nodes = vec![
            node(1, 0.0, 0.0),
            node(2, 1.0, -1.0),
            node(3, 2.0, -2.0),
            node(4, 2.0, 0.0),
        ];
        let ways = vec![
            Way::new(1, vec![1, 2], tags(&[("highway", "primary")])),
            Way::new(2, vec![3, 4], tags(&[("highway", "primary")])),
        ];
        let relations = vec![Relation {
            id: 1,
            from_way: 1,
            from_node: 2,
            to_way: 2,
            to_node: 4,
            via: Via::Node(3),
            tags: tags(&[("type", "restriction"), ("restriction", "no_right_turn")]),
        }];
        let mask = Mask {
            nodes: [1, 2, 3, 4, 5].into(),
            edges: [(1, 2), (2, 1), (2, 3), (3, 2), (3, 4), (4, 5), (5, 1)].into(),
            relations: [(1, 2, 3), (2, 3, 4), (3, 4, 5), (4, 5, 1), (3, 2, 1), (5, 1, 2)]
                .into(),
            hd_mapping: BTreeMap::new(),
        };

        let result = apply(data(nodes, ways, relations), &mask);

        assert!(result.relations.is_empty());

        // Ways 1 and 2 keep their surviving edges; the (2,3) and (3,2) mask
        // edges are not represented by any way, so minimal oneway ways are
        // synthesized for them. Mask edges touching node 5 are skipped as 5
        // is not in the node collection.
        let expected: BTreeMap<i64, Way> = [
            Way::new(1, vec![1, 2], tags(&[("highway", "primary")])),
            Way::new(
                2,
                vec![3, 4],
                tags(&[("highway", "primary"), ("oneway", "yes")]),
            ),
            Way::new(3, vec![2, 3], tags(&[("oneway", "yes")])),
            Way::new(4, vec![3, 2], tags(&[("oneway", "yes")])),
        ]
        .into_iter()
        .map(|w| (w.id, w))
        .collect();
        assert_eq!(result.ways, expected);
    }

    #[test]
    fn reversed_oneway_round_trips() {
        let nodes = vec![node(1, -1.0, 0.0), node(2, 0.0, 0.0), node(3, 1.0, 0.0)];
        let mask = Mask {
            nodes: [1, 2, 3].into(),
            edges: [(3, 2), (2, 1)].into(),
            relations: [(3, 2, 1)].into(),
            hd_mapping: BTreeMap::new(),
        };

        let reversed = apply(
            data(
                nodes.clone(),
                vec![Way::new(
                    1,
                    vec![1, 2, 3],
                    tags(&[("highway", "primary"), ("oneway", "-1")]),
                )],
                vec![],
            ),
            &mask,
        );
        let forward = apply(
            data(
                nodes,
                vec![Way::new(
                    1,
                    vec![3, 2, 1],
                    tags(&[("highway", "primary"), ("oneway", "yes")]),
                )],
                vec![],
            ),
            &mask,
        );

        assert_eq!(reversed.ways, forward.ways);
        assert_eq!(reversed.ways[&1].nodes, vec![3, 2, 1]);
        assert_eq!(reversed.ways[&1].tags["oneway"], "yes");
    }

    #[test]
    fn application_is_deterministic() {
        let (base, mask) = base_case();
        let first = apply(base.clone(), &mask);
        let second = apply(base, &mask);
        assert_eq!(first, second);
    }

    #[test]
    fn inconsistent_mask_aborts() {
        // Node 2 is referenced by a mask edge surviving on way 1, but is
        // absent from the node collection
        let base = data(
            vec![node(1, 0.0, 0.0)],
            vec![Way::new(1, vec![1, 2], tags(&[("highway", "primary")]))],
            vec![],
        );
        let mask = Mask {
            nodes: [1, 2].into(),
            edges: [(1, 2)].into(),
            relations: BTreeSet::new(),
            hd_mapping: BTreeMap::new(),
        };

        let mut applier = MaskApplier::new(base);
        assert_eq!(
            applier.apply(&mask),
            Err(ApplyError::MissingWayNode { way: 1, node: 2 })
        );
    }
}
