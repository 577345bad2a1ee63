// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Helpers over ordered node-id sequences, as used by ways and
//! turn restrictions.

/// Returns all consecutive pairs of a node sequence.
pub(crate) fn pairwise(nodes: &[i64]) -> impl Iterator<Item = (i64, i64)> + '_ {
    nodes.windows(2).map(|w| (w[0], w[1]))
}

/// Returns the first element of `a` which is also present in `b`,
/// scanning `a` in order.
pub fn find_common_node(a: &[i64], b: &[i64]) -> Option<i64> {
    a.iter().find(|node| b.contains(node)).copied()
}

/// Returns the neighbor of `via_node` within `nodes`, but only when
/// `via_node` is the first or last element. Restrictions only attach at
/// way endpoints; an interior or absent via node yields `None`.
pub fn get_adjacent_node(nodes: &[i64], via_node: i64) -> Option<i64> {
    let index = nodes.iter().position(|&n| n == via_node)?;
    if index == 0 && nodes.len() > 1 {
        Some(nodes[1])
    } else if index > 0 && index == nodes.len() - 1 {
        Some(nodes[index - 1])
    } else {
        None
    }
}

/// Concatenates `current` and `new`, removing later duplicates while
/// preserving first-seen order.
pub fn sort_nodes(current: &[i64], new: &[i64]) -> Vec<i64> {
    let mut joined = Vec::with_capacity(current.len() + new.len());
    for &node in current.iter().chain(new.iter()) {
        if !joined.contains(&node) {
            joined.push(node);
        }
    }
    joined
}

/// Merges an unordered list of 2-node edges into maximal ordered chains.
///
/// Edges are repeatedly joined whenever one chain's endpoint matches another
/// chain's start. Disjoint components come out as separate chains; a cycle
/// leaves the shortest closing residual as its own chain.
pub fn reconstruct_chains(edges: &[(i64, i64)]) -> Vec<Vec<i64>> {
    let chains: Vec<Vec<i64>> = edges.iter().map(|&(a, b)| vec![a, b]).collect();
    reorder(chains)
}

fn reorder(chains: Vec<Vec<i64>>) -> Vec<Vec<i64>> {
    if chains.len() <= 1 {
        return chains;
    }

    for j in 0..chains.len() - 1 {
        let remaining = &chains[j..];
        let first = &remaining[0];

        for i in 1..remaining.len() {
            let merged = if first.last() == remaining[i].first() {
                let mut m = first.clone();
                m.extend_from_slice(&remaining[i][1..]);
                Some(m)
            } else if first.first() == remaining[i].last() {
                let mut m = remaining[i].clone();
                m.extend_from_slice(&first[1..]);
                Some(m)
            } else {
                None
            };

            if let Some(m) = merged {
                let mut next: Vec<Vec<i64>> = Vec::with_capacity(remaining.len() - 1);
                next.extend_from_slice(&remaining[1..i]);
                next.push(m);
                next.extend_from_slice(&remaining[i + 1..]);

                let mut out = chains[..j].to_vec();
                out.extend(reorder(next));
                return out;
            }
        }
    }

    chains
}
