// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transitive reduction of one-to-one relations (Hsu).
//!
//! The relations of the reduced type span a directed graph over element ids.
//! After an acyclicity check the reachability closure is built as a boolean
//! matrix; an edge `(i, k)` is redundant iff some `j` satisfies
//! `closure[i][j] && closure[j][k]`.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::ident::ElementType;

use super::filter::Included;
use super::FilterError;

struct Edge {
    relation_id: String,
    from: usize,
    to: usize,
}

/// Ids of the relations of `relation_type` that the reduction removes.
///
/// Only relations with a single element on each side take part; self loops
/// are left alone. Parallel relations over the same edge share its fate.
pub(crate) fn redundant_relations(
    included: &Included,
    relation_type: ElementType,
) -> Result<BTreeSet<String>, FilterError> {
    let mut nodes: BTreeMap<&str, usize> = BTreeMap::new();
    let mut edges = Vec::new();
    for (id, element) in included {
        if !element.element_type().is_subtype_of(relation_type) {
            continue;
        }
        let Some((a, b)) = element.relation().and_then(|ep| ep.a().zip(ep.b())) else {
            continue;
        };
        if a.id() == b.id() {
            continue;
        }
        let next = nodes.len();
        let from = *nodes.entry(a.id()).or_insert(next);
        let next = nodes.len();
        let to = *nodes.entry(b.id()).or_insert(next);
        edges.push(Edge {
            relation_id: id.clone(),
            from,
            to,
        });
    }
    if edges.is_empty() {
        return Ok(BTreeSet::new());
    }

    let n = nodes.len();
    let mut adjacency = vec![vec![false; n]; n];
    for edge in &edges {
        adjacency[edge.from][edge.to] = true;
    }

    if let Some(index) = find_cycle_member(&adjacency) {
        let element = nodes
            .iter()
            .find_map(|(id, i)| (*i == index).then(|| (*id).to_owned()))
            .unwrap_or_default();
        return Err(FilterError::Cycle {
            relation_type,
            element,
        });
    }

    let closure = transitive_closure(adjacency);
    Ok(edges
        .into_iter()
        .filter(|e| (0..n).any(|j| closure[e.from][j] && closure[j][e.to]))
        .map(|e| e.relation_id)
        .collect())
}

/// Kahn's algorithm; returns a node left on a cycle, if any.
fn find_cycle_member(adjacency: &[Vec<bool>]) -> Option<usize> {
    let n = adjacency.len();
    let mut in_degree = vec![0usize; n];
    for row in adjacency {
        for (to, edge) in row.iter().enumerate() {
            if *edge {
                in_degree[to] += 1;
            }
        }
    }
    let mut queue: VecDeque<usize> = (0..n).filter(|i| in_degree[*i] == 0).collect();
    while let Some(node) = queue.pop_front() {
        for (to, edge) in adjacency[node].iter().enumerate() {
            if *edge {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    queue.push_back(to);
                }
            }
        }
    }
    (0..n).find(|i| in_degree[*i] > 0)
}

/// Warshall's closure; `closure[i][k]` iff a non-empty path leads from i to k.
fn transitive_closure(mut m: Vec<Vec<bool>>) -> Vec<Vec<bool>> {
    for j in 0..m.len() {
        let via = m[j].clone();
        for row in &mut m {
            if row[j] {
                for (cell, reachable) in row.iter_mut().zip(&via) {
                    *cell |= *reachable;
                }
            }
        }
    }
    m
}
