//! Python language extractor using tree-sitter
//!
//! Extraction makes two passes over the module. The first turns each top-level
//! statement into a node and records which names it binds. The second walks
//! every declaration's subtree for identifiers and keeps the ones that hit a
//! binding from the first pass. Call sites never become nodes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use prism_core::{Language, Node, NodeId, NodeKind, NodeMetadata, Occurrences, OriginContext, qualify};
use tree_sitter::Node as SyntaxNode;

use crate::extractor::{Diagnostic, ExtractionResult, LanguageExtractor};
use crate::parser_pool::{FileType, ParseRequest, ParserPool};

#[derive(Debug)]
pub struct PythonExtractor {
    parser_pool: ParserPool,
}

impl PythonExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self { parser_pool }
    }
}

/// A top-level declaration found by the first pass.
struct Declaration<'tree> {
    /// Statement searched for references in the second pass.
    syntax: SyntaxNode<'tree>,
    /// Names the statement binds at module level.
    names: Vec<String>,
    node: Node,
}

/// Everything the first pass learns about a module.
struct ModuleScan<'tree> {
    declarations: Vec<Declaration<'tree>>,
    diagnostics: Vec<Diagnostic>,
    /// The last `if __name__ == "__main__":` block, if any.
    entry_guard: Option<EntryGuard>,
}

/// A `__main__` guard found by the first pass.
struct EntryGuard {
    /// Verbatim guard text.
    text: String,
    /// Plain function calls, one list per statement of the guard body.
    calls: Vec<Vec<String>>,
    /// Index of the guard's SkippedStatement diagnostic.
    diagnostic: usize,
}

/// Per-file context threaded through the first pass.
struct FileContext<'a> {
    file_path: &'a str,
    source: &'a str,
    origin: OriginContext,
    occurrences: Occurrences,
}

impl LanguageExtractor for PythonExtractor {
    fn extract(&self, file_path: &str, source: &str) -> ExtractionResult {
        let request = ParseRequest {
            file_type: FileType::Python,
            content: source.to_string(),
            path: PathBuf::from(file_path),
        };

        let parse_result = match self.parser_pool.parse_blocking(request) {
            Ok(result) => result,
            Err(e) => {
                return ExtractionResult::failed(Diagnostic::parse_error(file_path, None, e.to_string()));
            }
        };
        let root = parse_result.tree.root_node();

        if root.has_error() {
            let error = first_error(root);
            let line = error.map(|n| n.start_position().row);
            let message = match error.map(|n| node_text(n, source).lines().next().unwrap_or("").trim()) {
                Some(near) if !near.is_empty() => format!("invalid syntax near `{}`", near),
                _ => "invalid syntax".to_string(),
            };
            return ExtractionResult::failed(Diagnostic::parse_error(file_path, line, message));
        }

        let mut context = FileContext {
            file_path,
            source,
            origin: OriginContext::classify(Path::new(file_path), Language::Python),
            occurrences: Occurrences::default(),
        };
        let mut scan = scan_module(root, &mut context);
        link_definitions(&mut scan.declarations, source);
        if let Some(guard) = scan.entry_guard.take() {
            if !mark_entry_point(&mut scan.declarations, &guard) {
                scan.diagnostics[guard.diagnostic].message =
                    "`if __name__ == \"__main__\"` guard calls no module-level function; it is dropped".to_string();
            }
        }

        tracing::trace!(
            "Extracted {} nodes from {} ({} skipped statements)",
            scan.declarations.len(),
            file_path,
            scan.diagnostics.len()
        );

        ExtractionResult {
            nodes: scan.declarations.into_iter().map(|d| d.node).collect(),
            diagnostics: scan.diagnostics,
        }
    }
}

/// First pass: one node per top-level declaration.
fn scan_module<'tree>(root: SyntaxNode<'tree>, context: &mut FileContext<'_>) -> ModuleScan<'tree> {
    let mut scan = ModuleScan {
        declarations: Vec::new(),
        diagnostics: Vec::new(),
        entry_guard: None,
    };

    // First comment of a run of own-line comments, and the run's last row.
    let mut comment_run: Option<(SyntaxNode<'tree>, usize)> = None;

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() == "comment" {
            let row = child.start_position().row;
            let own_line = child.start_position().column == 0;
            let shebang = row == 0 && node_text(child, context.source).starts_with("#!");
            comment_run = match comment_run {
                _ if !own_line || shebang => None,
                Some((first, last)) if row == last + 1 => Some((first, row)),
                _ => Some((child, row)),
            };
            continue;
        }

        // Comments directly above a statement belong to it.
        let leading = comment_run
            .take()
            .filter(|(_, last)| child.start_position().row == last + 1)
            .map(|(first, _)| first);

        if let Some(declaration) = declaration(child, leading.unwrap_or(child), context) {
            scan.declarations.push(declaration);
            continue;
        }

        let row = child.start_position().row;
        if let Some(calls) = main_guard_calls(child, context.source) {
            scan.entry_guard = Some(EntryGuard {
                text: node_text(child, context.source).trim_end().to_string(),
                calls,
                diagnostic: scan.diagnostics.len(),
            });
            scan.diagnostics.push(Diagnostic::skipped(
                context.file_path,
                row,
                "`if __name__ == \"__main__\"` guard; kept with its entry point",
            ));
        } else {
            scan.diagnostics.push(Diagnostic::skipped(
                context.file_path,
                row,
                format!("top-level `{}` is not a declaration", child.kind()),
            ));
        }
    }

    scan
}

/// Build the node for a statement, if it is a declaration. `start` is where
/// its content begins, which is earlier than `stmt` when comments lead it.
fn declaration<'tree>(
    stmt: SyntaxNode<'tree>,
    start: SyntaxNode<'tree>,
    context: &mut FileContext<'_>,
) -> Option<Declaration<'tree>> {
    let source = context.source;
    let (local_name, names, metadata) = match stmt.kind() {
        "import_statement" | "import_from_statement" | "future_import_statement" => {
            let text = node_text(stmt, source).split_whitespace().collect::<Vec<_>>().join(" ");
            (text, Vec::new(), import_metadata(stmt, source))
        }
        "function_definition" | "class_definition" => {
            let (name, metadata) = definition(stmt, Vec::new(), source)?;
            (name.clone(), vec![name], metadata)
        }
        "decorated_definition" => {
            let decorators = decorators(stmt, source);
            let (name, metadata) = definition(stmt.child_by_field_name("definition")?, decorators, source)?;
            (name.clone(), vec![name], metadata)
        }
        "expression_statement" => {
            if stmt.named_child_count() != 1 {
                return None;
            }
            let assignment = stmt.named_child(0).filter(|n| n.kind() == "assignment")?;
            let names = bound_names(assignment.child_by_field_name("left")?, source)?;
            let metadata = NodeMetadata::Constant {
                is_upper_case: names.iter().all(|n| is_upper_case(n)),
            };
            (names.join(", "), names, metadata)
        }
        _ => return None,
    };

    let qualified_name = qualify(context.file_path, &local_name);
    let occurrence = context.occurrences.next(metadata.kind(), &qualified_name);
    let content = source
        .get(start.start_byte()..stmt.end_byte())
        .unwrap_or("")
        .trim_end()
        .to_string();

    let node = Node::new(
        qualified_name,
        content,
        start.start_position().row,
        occurrence,
        context.origin,
        metadata,
    );

    Some(Declaration {
        syntax: stmt,
        names,
        node,
    })
}

fn import_metadata(stmt: SyntaxNode<'_>, source: &str) -> NodeMetadata {
    let module = match stmt.kind() {
        "import_statement" => stmt
            .child_by_field_name("name")
            .map(|name| match name.kind() {
                "aliased_import" => name.child_by_field_name("name").unwrap_or(name),
                _ => name,
            })
            .map(|name| node_text(name, source).to_string()),
        "future_import_statement" => Some("__future__".to_string()),
        _ => stmt
            .child_by_field_name("module_name")
            .map(|name| node_text(name, source).to_string()),
    };

    NodeMetadata::Import {
        module: module.unwrap_or_default(),
        is_from_import: stmt.kind() != "import_statement",
    }
}

/// Name and metadata of a function or class definition.
fn definition(def: SyntaxNode<'_>, decorators: Vec<String>, source: &str) -> Option<(String, NodeMetadata)> {
    let name = node_text(def.child_by_field_name("name")?, source).to_string();
    let has_docstring = has_docstring(def);

    let metadata = match def.kind() {
        "function_definition" => NodeMetadata::Function {
            is_async: def.child(0).is_some_and(|c| c.kind() == "async"),
            has_docstring,
            decorators,
            is_entry_point: false,
            entry_guard: None,
        },
        "class_definition" => NodeMetadata::Class {
            has_docstring,
            bases: superclasses(def, source),
            decorators,
        },
        _ => return None,
    };

    Some((name, metadata))
}

fn decorators(decorated: SyntaxNode<'_>, source: &str) -> Vec<String> {
    let mut cursor = decorated.walk();
    decorated
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "decorator")
        .map(|child| node_text(child, source).trim_start_matches('@').trim().to_string())
        .collect()
}

fn superclasses(class: SyntaxNode<'_>, source: &str) -> Vec<String> {
    let Some(arguments) = class.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    let mut cursor = arguments.walk();
    arguments
        .named_children(&mut cursor)
        .filter(|arg| arg.kind() != "comment" && arg.kind() != "keyword_argument")
        .map(|arg| node_text(arg, source).to_string())
        .collect()
}

fn has_docstring(def: SyntaxNode<'_>) -> bool {
    let Some(body) = def.child_by_field_name("body") else {
        return false;
    };
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).find(|n| n.kind() != "comment");
    first.is_some_and(|stmt| {
        stmt.kind() == "expression_statement"
            && stmt.named_child(0).is_some_and(|expr| expr.kind() == "string")
    })
}

/// Names bound by the left side of a module-level assignment. Only plain
/// names and flat tuples of names count; `obj.attr = ...` and `xs[0] = ...`
/// mutate rather than declare.
fn bound_names(left: SyntaxNode<'_>, source: &str) -> Option<Vec<String>> {
    match left.kind() {
        "identifier" => Some(vec![node_text(left, source).to_string()]),
        "pattern_list" | "tuple_pattern" => {
            let mut cursor = left.walk();
            let mut names = Vec::new();
            for element in left.named_children(&mut cursor) {
                if element.kind() != "identifier" {
                    return None;
                }
                names.push(node_text(element, source).to_string());
            }
            (!names.is_empty()).then_some(names)
        }
        _ => None,
    }
}

fn is_upper_case(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic()) && !name.chars().any(|c| c.is_lowercase())
}

/// Names of plain functions called inside `if __name__ == "__main__":`,
/// grouped by the guard body statement they appear in.
fn main_guard_calls(stmt: SyntaxNode<'_>, source: &str) -> Option<Vec<Vec<String>>> {
    if stmt.kind() != "if_statement" {
        return None;
    }
    let condition = stmt.child_by_field_name("condition")?;
    let condition: String = node_text(condition, source)
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '\'' { '"' } else { c })
        .collect();
    if condition != "__name__==\"__main__\"" && condition != "\"__main__\"==__name__" {
        return None;
    }

    let body = stmt.child_by_field_name("consequence")?;
    let mut cursor = body.walk();
    let calls = body
        .named_children(&mut cursor)
        .filter(|statement| statement.kind() != "comment")
        .map(|statement| {
            let mut calls = Vec::new();
            walk(statement, &mut |node| {
                if node.kind() == "call" {
                    if let Some(function) = node.child_by_field_name("function").filter(|f| f.kind() == "identifier")
                    {
                        calls.push(node_text(function, source).to_string());
                    }
                }
            });
            calls
        })
        .collect();
    Some(calls)
}

/// Second pass: fill in each declaration's dependencies.
fn link_definitions(declarations: &mut [Declaration<'_>], source: &str) {
    // A name bound twice resolves to its last binding, as at runtime.
    let mut definitions: HashMap<String, NodeId> = HashMap::new();
    for declaration in declarations.iter() {
        for name in &declaration.names {
            definitions.insert(name.clone(), declaration.node.id.clone());
        }
    }

    for declaration in declarations.iter_mut() {
        if declaration.node.kind == NodeKind::Import {
            continue;
        }

        let mut dependencies: Vec<NodeId> = Vec::new();
        for reference in references(declaration.syntax, source) {
            let Some(id) = definitions.get(reference) else {
                continue;
            };
            if *id != declaration.node.id && !dependencies.contains(id) {
                dependencies.push(id.clone());
            }
        }
        declaration.node.dependency_ids = dependencies;
    }
}

/// Identifiers in `syntax` that read a name, in document order.
fn references<'s>(syntax: SyntaxNode<'_>, source: &'s str) -> Vec<&'s str> {
    let mut found = Vec::new();
    walk(syntax, &mut |node| {
        if node.kind() == "identifier" && !is_binding(node) {
            found.push(node_text(node, source));
        }
    });
    found
}

/// Whether an identifier names something rather than reading it: a def or
/// class name, a parameter, an assignment target, an attribute or keyword.
fn is_binding(identifier: SyntaxNode<'_>) -> bool {
    let Some(parent) = identifier.parent() else {
        return false;
    };
    let is_field = |field: &str| parent.child_by_field_name(field) == Some(identifier);

    match parent.kind() {
        "function_definition" | "class_definition" => is_field("name"),
        "attribute" => is_field("attribute"),
        "keyword_argument" => is_field("name"),
        "default_parameter" | "typed_default_parameter" => is_field("name"),
        "assignment" | "augmented_assignment" | "for_statement" | "for_in_clause" => is_field("left"),
        "named_expression" => is_field("name"),
        "parameters" | "lambda_parameters" | "typed_parameter" | "list_splat_pattern"
        | "dictionary_splat_pattern" | "pattern_list" | "tuple_pattern" | "as_pattern_target"
        | "dotted_name" | "global_statement" | "nonlocal_statement" => true,
        "aliased_import" => is_field("alias"),
        _ => false,
    }
}

fn walk<'tree, F: FnMut(SyntaxNode<'tree>)>(node: SyntaxNode<'tree>, visit: &mut F) {
    visit(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, visit);
    }
}

/// Hand the guard to the function it runs. That is the outermost call of a
/// module-level function in the last guard statement that has one, so
/// `args = parse_args()` followed by `main(args)` picks `main`.
fn mark_entry_point(declarations: &mut [Declaration<'_>], guard: &EntryGuard) -> bool {
    let Some(target) = guard
        .calls
        .iter()
        .rev()
        .find_map(|calls| calls.iter().find(|name| declarations.iter().any(|d| is_function_named(d, name))))
    else {
        return false;
    };

    let Some(declaration) = declarations.iter_mut().rev().find(|d| is_function_named(d, target)) else {
        return false;
    };
    if let NodeMetadata::Function {
        is_entry_point,
        entry_guard,
        ..
    } = &mut declaration.node.metadata
    {
        *is_entry_point = true;
        *entry_guard = Some(guard.text.clone());
    }
    true
}

fn is_function_named(declaration: &Declaration<'_>, name: &str) -> bool {
    declaration.node.kind == NodeKind::Function && declaration.names.iter().any(|n| n == name)
}

fn first_error<'tree>(node: SyntaxNode<'tree>) -> Option<SyntaxNode<'tree>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

fn node_text<'s>(node: SyntaxNode<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}
