//! Test utilities for Prism core

use crate::model::{Node, NodeId, NodeMetadata, OriginContext, qualify};
use crate::store::ProjectStore;

pub const FILE: &str = "pkg/app.py";

pub fn import_node(file: &str, text: &str, line: usize) -> Node {
    Node::new(
        qualify(file, text),
        text.to_string(),
        line,
        0,
        OriginContext::Source,
        NodeMetadata::Import {
            module: text.split_whitespace().nth(1).unwrap_or("").to_string(),
            is_from_import: text.starts_with("from "),
        },
    )
}

pub fn function_node(file: &str, name: &str, line: usize, deps: &[&Node]) -> Node {
    let mut node = Node::new(
        qualify(file, name),
        format!("def {}():\n    pass", name),
        line,
        0,
        OriginContext::Source,
        NodeMetadata::Function {
            is_async: false,
            has_docstring: false,
            decorators: Vec::new(),
            is_entry_point: false,
            entry_guard: None,
        },
    );
    node.dependency_ids = deps.iter().map(|d| d.id.clone()).collect();
    node
}

pub fn class_node(file: &str, name: &str, line: usize) -> Node {
    Node::new(
        qualify(file, name),
        format!("class {}:\n    pass", name),
        line,
        0,
        OriginContext::Source,
        NodeMetadata::Class {
            has_docstring: false,
            bases: Vec::new(),
            decorators: Vec::new(),
        },
    )
}

pub fn constant_node(file: &str, name: &str, value: &str, line: usize) -> Node {
    Node::new(
        qualify(file, name),
        format!("{} = {}", name, value),
        line,
        0,
        OriginContext::Source,
        NodeMetadata::Constant {
            is_upper_case: name.chars().all(|c| !c.is_lowercase()),
        },
    )
}

pub fn section_node(file: &str, title: &str, body: &str, line: usize) -> Node {
    Node::new(
        qualify(file, title),
        format!("# {}\n\n{}", title, body),
        line,
        0,
        OriginContext::Documentation,
        NodeMetadata::DocSection {
            level: 1,
            title: title.to_string(),
        },
    )
}

/// Store holding one file built from `nodes`.
pub fn store_with(file: &str, nodes: Vec<Node>) -> ProjectStore {
    let mut store = ProjectStore::new();
    store.upsert_file(file, nodes);
    store
}

pub fn ids(nodes: &[&Node]) -> Vec<NodeId> {
    nodes.iter().map(|n| n.id.clone()).collect()
}
