//! Declarative header/footer rules for projected files

use std::path::Path;

use globset::Glob;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SettingsError;
use crate::model::{Language, Node, NodeMetadata};

/// The file a projection is written for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionTarget {
    pub file_path: String,
    pub language: Language,
    /// Local name of the function the file's `__main__` guard calls.
    pub entry_point: Option<String>,
    /// The guard as written in the source, when it is known.
    pub entry_guard: Option<String>,
}

impl ProjectionTarget {
    pub fn new(file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let language = Language::from_path(Path::new(&file_path));
        ProjectionTarget {
            file_path,
            language,
            entry_point: None,
            entry_guard: None,
        }
    }

    /// Target for a file, taking the entry point from its function nodes.
    pub fn for_file(file_path: impl Into<String>, nodes: &[&Node]) -> Self {
        let entry = nodes.iter().find_map(|node| match &node.metadata {
            NodeMetadata::Function {
                is_entry_point: true,
                entry_guard,
                ..
            } => Some((node.local_name().to_string(), entry_guard.clone())),
            _ => None,
        });
        match entry {
            Some((name, guard)) => Self::new(file_path).with_entry_point(Some(name)).with_entry_guard(guard),
            None => Self::new(file_path),
        }
    }

    pub fn with_entry_point(mut self, entry_point: Option<String>) -> Self {
        self.entry_point = entry_point;
        self
    }

    pub fn with_entry_guard(mut self, entry_guard: Option<String>) -> Self {
        self.entry_guard = entry_guard;
        self
    }

    /// The recorded guard, or a bare call of the entry point.
    fn guard(&self) -> String {
        match (&self.entry_guard, &self.entry_point) {
            (Some(guard), _) => guard.clone(),
            (None, Some(name)) => format!("if __name__ == \"__main__\":\n    {}()", name),
            (None, None) => String::new(),
        }
    }

    fn file_name(&self) -> &str {
        Path::new(&self.file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.file_path)
    }
}

/// When a rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPredicate {
    Language(Language),
    /// Glob over the target's relative path.
    FileName(String),
    HasEntryPoint,
    All(Vec<TriggerPredicate>),
    Any(Vec<TriggerPredicate>),
}

impl TriggerPredicate {
    pub fn matches(&self, target: &ProjectionTarget) -> bool {
        match self {
            TriggerPredicate::Language(language) => target.language == *language,
            TriggerPredicate::FileName(pattern) => match Glob::new(pattern) {
                Ok(glob) => glob.compile_matcher().is_match(&target.file_path),
                Err(e) => {
                    warn!("Ignoring trigger with invalid glob {:?}: {}", pattern, e);
                    false
                }
            },
            TriggerPredicate::HasEntryPoint => target.entry_point.is_some(),
            TriggerPredicate::All(predicates) => predicates.iter().all(|p| p.matches(target)),
            TriggerPredicate::Any(predicates) => predicates.iter().any(|p| p.matches(target)),
        }
    }

    /// Reject globs that would never compile.
    pub fn validate(&self) -> Result<(), SettingsError> {
        match self {
            TriggerPredicate::FileName(pattern) => Glob::new(pattern)
                .map(|_| ())
                .map_err(|source| SettingsError::InvalidGlob {
                    pattern: pattern.clone(),
                    source,
                }),
            TriggerPredicate::All(predicates) | TriggerPredicate::Any(predicates) => {
                predicates.iter().try_for_each(TriggerPredicate::validate)
            }
            TriggerPredicate::Language(_) | TriggerPredicate::HasEntryPoint => Ok(()),
        }
    }
}

/// One row of the trigger table.
///
/// Templates may use `{entry_point}`, `{entry_guard}` and `{file_name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerRule {
    pub name: String,
    pub when: TriggerPredicate,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
}

impl TriggerRule {
    pub fn render_header(&self, target: &ProjectionTarget) -> Option<String> {
        self.header.as_deref().map(|t| render(t, target))
    }

    pub fn render_footer(&self, target: &ProjectionTarget) -> Option<String> {
        self.footer.as_deref().map(|t| render(t, target))
    }
}

// The guard goes in last so placeholders inside its source text stay literal.
fn render(template: &str, target: &ProjectionTarget) -> String {
    template
        .replace("{entry_point}", target.entry_point.as_deref().unwrap_or(""))
        .replace("{file_name}", target.file_name())
        .replace("{entry_guard}", &target.guard())
}

/// Rules applied when `prism.toml` does not supply its own table.
pub fn default_rules() -> Vec<TriggerRule> {
    vec![
        TriggerRule {
            name: "python-entry-point".to_string(),
            when: TriggerPredicate::All(vec![
                TriggerPredicate::Language(Language::Python),
                TriggerPredicate::HasEntryPoint,
            ]),
            header: Some("#!/usr/bin/env python3".to_string()),
            footer: Some("{entry_guard}".to_string()),
        },
        TriggerRule {
            name: "generated-python".to_string(),
            when: TriggerPredicate::All(vec![
                TriggerPredicate::Language(Language::Python),
                TriggerPredicate::FileName("**/generated/*.py".to_string()),
            ]),
            header: Some("# {file_name} is generated by prism from the node graph; do not edit.".to_string()),
            footer: None,
        },
    ]
}
