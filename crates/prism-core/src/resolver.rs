//! Dependency resolution: deterministic topological order with cycle fallback

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::condensation;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::model::{Node, NodeId};
use crate::store::ProjectStore;

/// A dependency cycle among requested nodes, emitted in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleWarning {
    pub members: Vec<NodeId>,
}

/// A complete order plus any cycles that had to be broken to produce it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub order: Vec<NodeId>,
    pub cycles: Vec<CycleWarning>,
}

impl Resolution {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// Order `ids` so every node follows the nodes it depends on.
///
/// Edges to nodes outside `ids` are ignored. Among ready nodes the lowest
/// `(ordinal_position, id)` goes first. Each strongly-connected component is
/// emitted as one block in source order, at the position of its earliest
/// member, and reported as a [`CycleWarning`].
pub fn resolve_order<'a, I>(ids: I, store: &ProjectStore) -> Result<Resolution, ResolveError>
where
    I: IntoIterator<Item = &'a NodeId>,
{
    let mut requested: Vec<&Node> = Vec::new();
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            continue;
        }
        let node = store
            .get(id)
            .ok_or_else(|| ResolveError::UnknownNode(id.clone()))?;
        requested.push(node);
    }
    requested.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    // Edges point from dependency to dependent.
    let mut graph: DiGraph<&Node, ()> = DiGraph::with_capacity(requested.len(), requested.len());
    let mut index: HashMap<&NodeId, NodeIndex> = HashMap::with_capacity(requested.len());
    for node in &requested {
        index.insert(&node.id, graph.add_node(*node));
    }
    for node in &requested {
        let dependent = index[&node.id];
        for dep in &node.dependency_ids {
            match index.get(dep) {
                Some(&dependency) if dependency != dependent => {
                    graph.update_edge(dependency, dependent, ());
                }
                Some(_) => {}
                None => debug!("Dependency {} of {} is outside the requested set", dep, node.id),
            }
        }
    }

    let mut components = condensation(graph, true);
    for members in components.node_weights_mut() {
        members.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    let mut in_degree: Vec<usize> = components
        .node_indices()
        .map(|ix| components.neighbors_directed(ix, Direction::Incoming).count())
        .collect();

    let mut ready = BinaryHeap::new();
    for ix in components.node_indices() {
        if in_degree[ix.index()] == 0 {
            ready.push(Reverse((block_key(&components[ix]), ix)));
        }
    }

    let mut resolution = Resolution {
        order: Vec::with_capacity(requested.len()),
        cycles: Vec::new(),
    };

    while let Some(Reverse((_, ix))) = ready.pop() {
        let members = &components[ix];
        if members.len() > 1 {
            let ids: Vec<NodeId> = members.iter().map(|n| n.id.clone()).collect();
            warn!(
                "Dependency cycle among {} nodes; falling back to source order: {}",
                ids.len(),
                members
                    .iter()
                    .map(|n| n.qualified_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            resolution.cycles.push(CycleWarning { members: ids.clone() });
            resolution.order.extend(ids);
        } else {
            resolution.order.extend(members.iter().map(|n| n.id.clone()));
        }

        for next in components.neighbors_directed(ix, Direction::Outgoing) {
            let degree = &mut in_degree[next.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse((block_key(&components[next]), next)));
            }
        }
    }

    Ok(resolution)
}

/// A block sorts by its earliest member.
fn block_key(members: &[&Node]) -> (usize, NodeId) {
    members
        .first()
        .map(|n| (n.ordinal_position, n.id.clone()))
        .unwrap_or_default()
}
