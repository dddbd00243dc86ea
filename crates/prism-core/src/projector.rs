//! Projection: render an ordered node subset back into file text

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProjectError;
use crate::model::{Language, Node, NodeId, NodeKind};
use crate::store::ProjectStore;
use crate::triggers::{ProjectionTarget, TriggerRule, default_rules};

/// Spacing and header/footer rules for projected files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectionConfig {
    pub blank_lines_after_imports: usize,
    /// Around top-level classes and functions.
    pub blank_lines_between_definitions: usize,
    pub blank_lines_between_constants: usize,
    /// Between Markdown or TOML sections.
    pub blank_lines_between_sections: usize,
    pub rules: Vec<TriggerRule>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        ProjectionConfig {
            blank_lines_after_imports: 1,
            blank_lines_between_definitions: 2,
            blank_lines_between_constants: 0,
            blank_lines_between_sections: 1,
            rules: default_rules(),
        }
    }
}

/// A dependency edge whose target is not in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingDependency {
    pub node: NodeId,
    pub missing: NodeId,
}

/// A dependency that kind grouping placed after the node that needs it,
/// such as a function referenced from a constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInversion {
    pub node: NodeId,
    pub dependency: NodeId,
}

/// Rendered text plus the warnings gathered while rendering it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub text: String,
    pub dangling: Vec<DanglingDependency>,
    pub inversions: Vec<GroupInversion>,
    /// Names of the trigger rules that contributed a header or footer.
    pub applied_rules: Vec<String>,
}

/// Output groups, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Group {
    Imports,
    Constants,
    Classes,
    Functions,
    Sections,
}

impl Group {
    fn for_kind(kind: NodeKind, language: Language) -> Option<Group> {
        match (language, kind) {
            (Language::Python, NodeKind::Import) => Some(Group::Imports),
            (Language::Python, NodeKind::Constant) => Some(Group::Constants),
            (Language::Python, NodeKind::Class) => Some(Group::Classes),
            (Language::Python, NodeKind::Function) => Some(Group::Functions),
            (Language::Markdown, NodeKind::DocSection) => Some(Group::Sections),
            (Language::Toml, NodeKind::ConfigSection) => Some(Group::Sections),
            _ => None,
        }
    }

    fn is_definition(self) -> bool {
        matches!(self, Group::Classes | Group::Functions)
    }
}

/// Render `ordered_ids` for `target`.
///
/// Nodes are grouped by kind, keeping the given relative order inside each
/// group except imports, which follow source order. Every id must resolve to a
/// node whose kind fits the target; nothing is dropped silently.
pub fn project(
    ordered_ids: &[NodeId],
    store: &ProjectStore,
    target: &ProjectionTarget,
    config: &ProjectionConfig,
) -> Result<Projection, ProjectError> {
    let mut projection = Projection::default();
    let mut grouped: Vec<(Group, &Node)> = Vec::with_capacity(ordered_ids.len());
    let mut seen = HashSet::new();

    for id in ordered_ids {
        if !seen.insert(id) {
            continue;
        }
        let node = store
            .get(id)
            .ok_or_else(|| ProjectError::MissingNode(id.clone()))?;
        let group = Group::for_kind(node.kind, target.language).ok_or_else(|| {
            ProjectError::KindNotPlaceable {
                id: id.clone(),
                kind: node.kind,
                language: target.language,
            }
        })?;

        for dep in &node.dependency_ids {
            if !store.contains(dep) {
                warn!(
                    "Dangling dependency: {} depends on missing node {}",
                    node.qualified_name, dep
                );
                projection.dangling.push(DanglingDependency {
                    node: id.clone(),
                    missing: dep.clone(),
                });
            }
        }
        grouped.push((group, node));
    }

    // Stable sort keeps the resolver's order within each group.
    grouped.sort_by_key(|(group, _)| *group);
    let import_end = grouped
        .iter()
        .position(|(group, _)| *group != Group::Imports)
        .unwrap_or(grouped.len());
    grouped[..import_end].sort_by(|(_, a), (_, b)| a.sort_key().cmp(&b.sort_key()));

    let group_of: HashMap<&NodeId, Group> = grouped.iter().map(|(group, node)| (&node.id, *group)).collect();
    for (group, node) in &grouped {
        for dep in &node.dependency_ids {
            if group_of.get(dep).is_some_and(|dep_group| dep_group > group) {
                warn!(
                    "{} is emitted before its dependency {} because of kind grouping",
                    node.qualified_name, dep
                );
                projection.inversions.push(GroupInversion {
                    node: node.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut body = String::new();
    let mut previous: Option<Group> = None;
    for (group, node) in &grouped {
        if let Some(prev) = previous {
            body.push('\n');
            for _ in 0..blank_lines_between(prev, *group, config) {
                body.push('\n');
            }
        }
        body.push_str(node.content.trim_end_matches(['\n', '\r']));
        previous = Some(*group);
    }

    let mut headers = Vec::new();
    let mut footers = Vec::new();
    for rule in &config.rules {
        if !rule.when.matches(target) {
            continue;
        }
        debug!("Trigger rule {} applies to {}", rule.name, target.file_path);
        let header = rule.render_header(target);
        let footer = rule.render_footer(target);
        if header.is_some() || footer.is_some() {
            projection.applied_rules.push(rule.name.clone());
        }
        headers.extend(header);
        footers.extend(footer);
    }

    let mut text = String::new();
    for header in &headers {
        text.push_str(header.trim_end_matches('\n'));
        text.push('\n');
    }
    if !body.is_empty() {
        text.push_str(&body);
        text.push('\n');
    }
    for footer in &footers {
        if !body.is_empty() {
            for _ in 0..config.blank_lines_between_definitions {
                text.push('\n');
            }
        }
        text.push_str(footer.trim_end_matches('\n'));
        text.push('\n');
    }

    projection.text = text;
    Ok(projection)
}

fn blank_lines_between(prev: Group, next: Group, config: &ProjectionConfig) -> usize {
    match (prev, next) {
        (Group::Imports, Group::Imports) => 0,
        (Group::Imports, _) => config.blank_lines_after_imports,
        (Group::Sections, Group::Sections) => config.blank_lines_between_sections,
        (a, b) if a.is_definition() || b.is_definition() => config.blank_lines_between_definitions,
        (Group::Constants, Group::Constants) => config.blank_lines_between_constants,
        _ => config.blank_lines_between_definitions,
    }
}
