//! Core data structures for the node graph

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unique, stable identifier for a node.
///
/// Hex digest of `(kind, qualified_name, occurrence)`, where `occurrence`
/// counts earlier declarations of the same kind and name in the file. Moving a
/// declaration keeps its id; editing its body keeps its id and changes its
/// content hash. SHA-256 keeps the id stable across toolchains, which
/// `DefaultHasher` does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(kind: NodeKind, qualified_name: &str, occurrence: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(qualified_name.as_bytes());
        hasher.update([0u8]);
        hasher.update((occurrence as u64).to_le_bytes());
        let digest = hasher.finalize();
        NodeId(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

/// Discriminates what kind of unit a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    // ── Code entities (tree-sitter extracted) ───────────────
    Import,
    Function,
    Class,
    Constant,

    // ── Document / config entities ──────────────────────────
    DocSection,
    ConfigSection,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Import => "Import",
            NodeKind::Function => "Function",
            NodeKind::Class => "Class",
            NodeKind::Constant => "Constant",
            NodeKind::DocSection => "DocSection",
            NodeKind::ConfigSection => "ConfigSection",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported languages for extraction and projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Markdown,
    Toml,
    Other,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") | Some("pyi") => Language::Python,
            Some("md") | Some("markdown") => Language::Markdown,
            Some("toml") => Language::Toml,
            _ => Language::Other,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Language::Other)
    }
}

/// Where a node's file lives. Used for grouping and reports only, never for identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginContext {
    Source,
    Test,
    Script,
    Documentation,
    Configuration,
}

impl OriginContext {
    pub fn classify(path: &Path, language: Language) -> Self {
        let in_dir = |names: &[&str]| {
            path.parent().is_some_and(|parent| {
                parent
                    .components()
                    .any(|c| names.iter().any(|n| c.as_os_str() == *n))
            })
        };
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");

        if in_dir(&["tests", "test"]) || stem.starts_with("test_") || stem.ends_with("_test") {
            return OriginContext::Test;
        }
        match language {
            Language::Markdown => OriginContext::Documentation,
            Language::Toml => OriginContext::Configuration,
            _ if in_dir(&["scripts", "bin"]) => OriginContext::Script,
            _ => OriginContext::Source,
        }
    }
}

/// Kind-specific attributes of a node.
///
/// Closed per kind so formatting rules can match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeMetadata {
    Import {
        module: String,
        is_from_import: bool,
    },
    Function {
        is_async: bool,
        has_docstring: bool,
        decorators: Vec<String>,
        /// Called from the file's `__main__` guard.
        is_entry_point: bool,
        /// Verbatim text of that guard, carried by the entry point.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry_guard: Option<String>,
    },
    Class {
        has_docstring: bool,
        bases: Vec<String>,
        decorators: Vec<String>,
    },
    Constant {
        is_upper_case: bool,
    },
    DocSection {
        /// Heading level; 0 for the preamble before the first heading.
        level: u8,
        title: String,
    },
    ConfigSection {
        table: String,
        is_array_table: bool,
    },
}

impl NodeMetadata {
    /// The node kind this metadata variant belongs to.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeMetadata::Import { .. } => NodeKind::Import,
            NodeMetadata::Function { .. } => NodeKind::Function,
            NodeMetadata::Class { .. } => NodeKind::Class,
            NodeMetadata::Constant { .. } => NodeKind::Constant,
            NodeMetadata::DocSection { .. } => NodeKind::DocSection,
            NodeMetadata::ConfigSection { .. } => NodeKind::ConfigSection,
        }
    }
}

/// A single extracted unit: one definition, import or section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub qualified_name: String,
    /// Verbatim source span.
    pub content: String,
    pub origin_context: OriginContext,
    /// Definition nodes this node references, in first-use order.
    pub dependency_ids: Vec<NodeId>,
    /// Zero-based line of the node's first line in its source file.
    pub ordinal_position: usize,
    pub metadata: NodeMetadata,
}

impl Node {
    /// Build a node, deriving its id from kind, qualified name and occurrence.
    pub fn new(
        qualified_name: String,
        content: String,
        ordinal_position: usize,
        occurrence: usize,
        origin_context: OriginContext,
        metadata: NodeMetadata,
    ) -> Self {
        let kind = metadata.kind();
        Node {
            id: NodeId::new(kind, &qualified_name, occurrence),
            kind,
            qualified_name,
            content,
            origin_context,
            dependency_ids: Vec::new(),
            ordinal_position,
            metadata,
        }
    }

    /// SHA-256 of the node's content, hex encoded.
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }

    /// Name without the file qualifier.
    pub fn local_name(&self) -> &str {
        self.qualified_name
            .split_once("::")
            .map_or(self.qualified_name.as_str(), |(_, name)| name)
    }

    /// Deterministic ordering key: original line, then id.
    pub fn sort_key(&self) -> (usize, &NodeId) {
        (self.ordinal_position, &self.id)
    }
}

/// Per-file counter handing out occurrence numbers for repeated names.
#[derive(Debug, Default)]
pub struct Occurrences(HashMap<(NodeKind, String), usize>);

impl Occurrences {
    pub fn next(&mut self, kind: NodeKind, qualified_name: &str) -> usize {
        let count = self.0.entry((kind, qualified_name.to_string())).or_insert(0);
        let occurrence = *count;
        *count += 1;
        occurrence
    }
}

/// Join a file path and a local name into a qualified name.
pub fn qualify(file_path: &str, name: &str) -> String {
    format!("{}::{}", file_path, name)
}
