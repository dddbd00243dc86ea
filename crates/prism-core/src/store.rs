//! Project store: owns every node plus the per-file views over them

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Node, NodeId};

/// A node whose content changed under an unchanged id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Superseded {
    pub id: NodeId,
    pub previous_hash: String,
    pub current_hash: String,
}

/// What a single `upsert_file` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertResult {
    /// Ids seen for the first time.
    pub inserted: Vec<NodeId>,
    /// Ids already present with identical content.
    pub unchanged: Vec<NodeId>,
    /// Ids already present with different content; the new content wins.
    pub superseded: Vec<Superseded>,
    /// Ids removed by the orphan sweep that follows the upsert.
    pub pruned: Vec<NodeId>,
}

impl UpsertResult {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.superseded.is_empty() && self.pruned.is_empty()
    }
}

/// The node graph. Every mutation goes through `&mut self`, so the store has
/// exactly one writer at a time; readers borrow it immutably.
#[derive(Debug, Clone, Default)]
pub struct ProjectStore {
    nodes: BTreeMap<NodeId, Node>,
    /// file path -> ids in source order
    files: BTreeMap<String, Vec<NodeId>>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        nodes: BTreeMap<NodeId, Node>,
        files: BTreeMap<String, Vec<NodeId>>,
    ) -> Self {
        ProjectStore { nodes, files }
    }

    /// Replace a file's view with freshly extracted nodes.
    pub fn upsert_file(&mut self, file_path: impl Into<String>, nodes: Vec<Node>) -> UpsertResult {
        let file_path = file_path.into();
        let mut result = UpsertResult::default();
        let mut index = Vec::with_capacity(nodes.len());
        let mut seen = HashSet::new();

        for node in nodes {
            if !seen.insert(node.id.clone()) {
                debug!("Duplicate node {} in batch for {}", node.id, file_path);
                continue;
            }
            index.push(node.id.clone());

            match self.nodes.get(&node.id) {
                None => {
                    result.inserted.push(node.id.clone());
                    self.nodes.insert(node.id.clone(), node);
                }
                Some(existing) => {
                    let previous_hash = existing.content_hash();
                    let current_hash = node.content_hash();
                    if previous_hash == current_hash {
                        result.unchanged.push(node.id.clone());
                        // Same content; dependency edges may still have moved.
                        self.nodes.insert(node.id.clone(), node);
                    } else {
                        warn!(
                            "Identity conflict for {} ({}): content changed, keeping latest extraction",
                            node.id, node.qualified_name
                        );
                        result.superseded.push(Superseded {
                            id: node.id.clone(),
                            previous_hash,
                            current_hash,
                        });
                        self.nodes.insert(node.id.clone(), node);
                    }
                }
            }
        }

        debug!("Indexed {} nodes for {}", index.len(), file_path);
        self.files.insert(file_path, index);
        result.pruned = self.prune_orphans();
        result
    }

    /// Drop a file's view, then sweep orphans.
    pub fn remove_file(&mut self, file_path: &str) -> Vec<NodeId> {
        if self.files.remove(file_path).is_none() {
            return Vec::new();
        }
        self.prune_orphans()
    }

    /// Keep only the listed files' views, then sweep orphans.
    pub fn retain_files(&mut self, keep: &HashSet<String>) -> Vec<NodeId> {
        let before = self.files.len();
        self.files.retain(|path, _| keep.contains(path));
        if self.files.len() == before {
            return Vec::new();
        }
        debug!("Dropped {} vanished files", before - self.files.len());
        self.prune_orphans()
    }

    /// Remove nodes that no file lists and no live node depends on.
    pub fn prune_orphans(&mut self) -> Vec<NodeId> {
        let mut live: HashSet<NodeId> = self.files.values().flatten().cloned().collect();
        let mut to_visit: Vec<NodeId> = live.iter().cloned().collect();

        while let Some(current) = to_visit.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for dep in &node.dependency_ids {
                    if live.insert(dep.clone()) {
                        to_visit.push(dep.clone());
                    }
                }
            }
        }

        let orphans: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        for id in &orphans {
            self.nodes.remove(id);
        }
        if !orphans.is_empty() {
            debug!("Pruned {} orphan nodes", orphans.len());
        }
        orphans
    }

    /// Get a node by id.
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Look up several nodes; unknown ids are skipped.
    pub fn get_nodes<'a, I>(&self, ids: I) -> Vec<&Node>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        ids.into_iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Ordered ids extracted from a file.
    pub fn get_file_index(&self, file_path: &str) -> Option<&[NodeId]> {
        self.files.get(file_path).map(Vec::as_slice)
    }

    /// Iterate over every file view, sorted by path.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[NodeId])> {
        self.files
            .iter()
            .map(|(path, ids)| (path.as_str(), ids.as_slice()))
    }

    /// Iterate over every node, sorted by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}
