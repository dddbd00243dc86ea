//! Model file persistence

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::{Node, NodeId, NodeKind, NodeMetadata, OriginContext};
use crate::store::ProjectStore;

/// Model directory: .prism/
pub const MODEL_DIR: &str = ".prism";

/// Model file
pub const MODEL_FILE: &str = "model.json";

/// Get model directory path
pub fn model_dir(root: &Path) -> PathBuf {
    root.join(MODEL_DIR)
}

/// Get model file path
pub fn model_path(root: &Path) -> PathBuf {
    root.join(MODEL_DIR).join(MODEL_FILE)
}

/// On-disk shape of the store.
#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    generated_at: Option<String>,
    nodes: BTreeMap<NodeId, NodeRecord>,
    files: BTreeMap<String, Vec<NodeId>>,
}

/// A node keyed by its id, so the id itself is not repeated.
#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    kind: NodeKind,
    #[serde(default)]
    qualified_name: String,
    content: String,
    dependency_ids: Vec<NodeId>,
    ordinal_position: usize,
    origin_context: OriginContext,
    metadata: NodeMetadata,
}

impl NodeRecord {
    fn from_node(node: &Node) -> Self {
        NodeRecord {
            kind: node.kind,
            qualified_name: node.qualified_name.clone(),
            content: node.content.clone(),
            dependency_ids: node.dependency_ids.clone(),
            ordinal_position: node.ordinal_position,
            origin_context: node.origin_context,
            metadata: node.metadata.clone(),
        }
    }

    fn into_node(self, id: NodeId) -> Node {
        Node {
            id,
            kind: self.kind,
            qualified_name: self.qualified_name,
            content: self.content,
            origin_context: self.origin_context,
            dependency_ids: self.dependency_ids,
            ordinal_position: self.ordinal_position,
            metadata: self.metadata,
        }
    }
}

/// Serialize the store as pretty JSON, creating parent directories.
pub fn save_model(store: &ProjectStore, path: &Path) -> Result<(), ModelError> {
    let io_err = |source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let model = ModelFile {
        version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: Some(chrono::Utc::now().to_rfc3339()),
        nodes: store
            .nodes()
            .map(|n| (n.id.clone(), NodeRecord::from_node(n)))
            .collect(),
        files: store
            .files()
            .map(|(path, ids)| (path.to_string(), ids.to_vec()))
            .collect(),
    };

    let json_str = serde_json::to_string_pretty(&model).map_err(|source| ModelError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json_str).map_err(io_err)?;

    tracing::debug!(
        "Model saved to {} ({} nodes, {} files)",
        path.display(),
        store.node_count(),
        store.file_count()
    );
    Ok(())
}

/// Load a store from a model file. `Ok(None)` when the file does not exist.
pub fn load_model(path: &Path) -> Result<Option<ProjectStore>, ModelError> {
    if !path.exists() {
        return Ok(None);
    }

    let json_str = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let model: ModelFile = serde_json::from_str(&json_str).map_err(|source| ModelError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    for (file, ids) in &model.files {
        if let Some(missing) = ids.iter().find(|id| !model.nodes.contains_key(*id)) {
            return Err(ModelError::UnknownIndexedNode {
                file: file.clone(),
                id: missing.clone(),
            });
        }
    }

    let nodes = model
        .nodes
        .into_iter()
        .map(|(id, record)| (id.clone(), record.into_node(id)))
        .collect();

    tracing::debug!("Model loaded from: {}", path.display());
    Ok(Some(ProjectStore::from_parts(nodes, model.files)))
}

/// Clear the model directory
pub fn clear_cache(root: &Path) -> std::io::Result<()> {
    let dir = model_dir(root);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}
