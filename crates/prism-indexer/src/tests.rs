//! Unit tests for prism-indexer module

use crate::*;
use prism_core::{
    Node, NodeId, NodeKind, NodeMetadata, ProjectStore, ProjectionConfig, ProjectionTarget, Settings, project,
    resolve_order,
};
use std::fs;
use std::sync::Arc;

const FILE: &str = "pkg/app.py";

const EXAMPLE: &str = "import os\nimport sys\n\n\ndef f():\n    return g()\n\n\ndef g():\n    return 1\n";

fn extractors() -> Extractors {
    Extractors::new(ParserPool::new(2))
}

fn ids(nodes: &[Node]) -> Vec<NodeId> {
    nodes.iter().map(|n| n.id.clone()).collect()
}

fn named<'a>(nodes: &'a [Node], local_name: &str) -> &'a Node {
    nodes
        .iter()
        .find(|n| n.local_name() == local_name)
        .unwrap_or_else(|| panic!("no node named {}", local_name))
}

/// Extract, store, resolve and project one file the way the CLI does.
fn round_trip(extractors: &Extractors, file_path: &str, source: &str) -> (ProjectStore, Vec<NodeId>, String) {
    let result = extractors.extract(file_path, source);
    assert!(result.parse_error().is_none(), "{:?}", result.diagnostics);

    let mut store = ProjectStore::new();
    store.upsert_file(file_path, result.nodes);
    let file_ids = store.get_file_index(file_path).unwrap().to_vec();
    let resolution = resolve_order(&file_ids, &store).unwrap();
    let target = ProjectionTarget::for_file(file_path, &store.get_nodes(&file_ids));
    let projection = project(&resolution.order, &store, &target, &ProjectionConfig::default()).unwrap();
    (store, resolution.order, projection.text)
}

// ── Python extraction ────────────────────────────────────

#[test]
fn test_python_definitions_and_dependencies() {
    let result = extractors().extract(FILE, EXAMPLE);
    assert!(result.diagnostics.is_empty());

    let kinds: Vec<_> = result.nodes.iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![NodeKind::Import, NodeKind::Import, NodeKind::Function, NodeKind::Function]
    );

    let f = named(&result.nodes, "f");
    let g = named(&result.nodes, "g");
    assert_eq!(f.qualified_name, "pkg/app.py::f");
    assert_eq!(f.content, "def f():\n    return g()");
    assert_eq!(f.ordinal_position, 4);
    assert_eq!(f.dependency_ids, vec![g.id.clone()]);
    assert!(g.dependency_ids.is_empty());

    let import = named(&result.nodes, "import os");
    assert_eq!(
        import.metadata,
        NodeMetadata::Import {
            module: "os".to_string(),
            is_from_import: false,
        }
    );
}

#[test]
fn test_example_round_trip_keeps_ids() {
    let extractors = extractors();
    let original = extractors.extract(FILE, EXAMPLE);
    let (_, order, text) = round_trip(&extractors, FILE, EXAMPLE);

    let expected_order: Vec<NodeId> = ["import os", "import sys", "g", "f"]
        .iter()
        .map(|name| named(&original.nodes, name).id.clone())
        .collect();
    assert_eq!(order, expected_order);
    assert_eq!(
        text,
        "import os\nimport sys\n\ndef g():\n    return 1\n\n\ndef f():\n    return g()\n"
    );

    let reextracted = extractors.extract(FILE, &text);
    assert_eq!(ids(&reextracted.nodes), expected_order);
}

#[test]
fn test_repeated_extraction_does_not_duplicate() {
    let extractors = extractors();
    let mut store = ProjectStore::new();

    let first = store.upsert_file(FILE, extractors.extract(FILE, EXAMPLE).nodes);
    assert_eq!(first.inserted.len(), 4);

    let second = store.upsert_file(FILE, extractors.extract(FILE, EXAMPLE).nodes);
    assert!(second.is_empty());
    assert_eq!(second.unchanged.len(), 4);
    assert_eq!(store.node_count(), 4);
}

#[test]
fn test_edited_body_supersedes_same_id() {
    let extractors = extractors();
    let mut store = ProjectStore::new();
    store.upsert_file(FILE, extractors.extract(FILE, EXAMPLE).nodes);

    let edited = EXAMPLE.replace("return 1", "return 2");
    let result = store.upsert_file(FILE, extractors.extract(FILE, &edited).nodes);

    assert_eq!(result.superseded.len(), 1);
    assert!(result.inserted.is_empty());
    assert_eq!(store.node_count(), 4);
}

#[test]
fn test_references_skip_bindings() {
    let source = "\
LIMIT = 10


class Config:
    limit = LIMIT

    def helper(self):
        return self.helper


def helper(value=LIMIT, *, key=None):
    return Config(limit=value)
";
    let result = extractors().extract(FILE, source);
    let limit = named(&result.nodes, "LIMIT");
    let config = named(&result.nodes, "Config");
    let helper = named(&result.nodes, "helper");

    assert_eq!(config.dependency_ids, vec![limit.id.clone()]);
    assert_eq!(helper.dependency_ids, vec![limit.id.clone(), config.id.clone()]);
    assert_eq!(limit.metadata, NodeMetadata::Constant { is_upper_case: true });
}

#[test]
fn test_python_metadata() {
    let source = "\
import functools
from .models import Base


@functools.cache
async def fetch():
    \"\"\"Docs.\"\"\"
    return 1


class User(Base, metaclass=Meta):
    pass
";
    let result = extractors().extract(FILE, source);

    assert_eq!(
        named(&result.nodes, "from .models import Base").metadata,
        NodeMetadata::Import {
            module: ".models".to_string(),
            is_from_import: true,
        }
    );

    let fetch = named(&result.nodes, "fetch");
    assert_eq!(
        fetch.metadata,
        NodeMetadata::Function {
            is_async: true,
            has_docstring: true,
            decorators: vec!["functools.cache".to_string()],
            is_entry_point: false,
            entry_guard: None,
        }
    );
    assert!(fetch.content.starts_with("@functools.cache\nasync def fetch():"));
    assert!(fetch.dependency_ids.is_empty());

    assert_eq!(
        named(&result.nodes, "User").metadata,
        NodeMetadata::Class {
            has_docstring: false,
            bases: vec!["Base".to_string()],
            decorators: Vec::new(),
        }
    );
}

#[test]
fn test_leading_comments_fold_into_declaration() {
    let source = "X = 1  # note\n# helper docs\n# continued\ndef helper():\n    return X\n";
    let result = extractors().extract(FILE, source);
    let x = named(&result.nodes, "X");
    let helper = named(&result.nodes, "helper");

    assert_eq!(helper.content, "# helper docs\n# continued\ndef helper():\n    return X");
    assert_eq!(helper.ordinal_position, 1);
    assert_eq!(helper.dependency_ids, vec![x.id.clone()]);
}

#[test]
fn test_shebang_is_not_folded() {
    let source = "#!/usr/bin/env python3\ndef main():\n    pass\n";
    let result = extractors().extract(FILE, source);
    assert_eq!(result.nodes.len(), 1);
    assert_eq!(result.nodes[0].content, "def main():\n    pass");
    assert_eq!(result.nodes[0].ordinal_position, 1);
}

#[test]
fn test_tuple_assignment_binds_every_name() {
    let source = "A, B = 1, 2\nC = A + B\n";
    let result = extractors().extract(FILE, source);
    assert_eq!(result.nodes.len(), 2);

    let pair = named(&result.nodes, "A, B");
    let c = named(&result.nodes, "C");
    assert_eq!(c.dependency_ids, vec![pair.id.clone()]);
}

#[test]
fn test_rebinding_resolves_to_last_definition() {
    let source = "def f():\n    return 1\n\n\ndef f():\n    return 2\n\n\ndef g():\n    return f()\n";
    let result = extractors().extract(FILE, source);
    let fs: Vec<&Node> = result.nodes.iter().filter(|n| n.local_name() == "f").collect();

    assert_eq!(fs.len(), 2);
    assert_ne!(fs[0].id, fs[1].id);
    assert_eq!(named(&result.nodes, "g").dependency_ids, vec![fs[1].id.clone()]);
}

#[test]
fn test_mutual_recursion_projects_with_cycle_warning() {
    let source = "def a():\n    return b()\n\n\ndef b():\n    return a()\n";
    let extractors = extractors();
    let result = extractors.extract(FILE, source);
    let a = named(&result.nodes, "a").id.clone();
    let b = named(&result.nodes, "b").id.clone();

    let mut store = ProjectStore::new();
    store.upsert_file(FILE, result.nodes);
    let resolution = resolve_order(&[b.clone(), a.clone()], &store).unwrap();

    assert_eq!(resolution.order, vec![a.clone(), b.clone()]);
    assert_eq!(resolution.cycles.len(), 1);
    assert_eq!(resolution.cycles[0].members, vec![a, b]);

    let (_, _, text) = round_trip(&extractors, FILE, source);
    assert_eq!(text, source);
}

#[test]
fn test_main_guard_marks_entry_point() {
    let file = "pkg/cli.py";
    let source = "import sys\n\n\ndef main():\n    return 0\n\n\nif __name__ == \"__main__\":\n    main()\n";
    let extractors = extractors();
    let result = extractors.extract(file, source);

    assert_eq!(result.nodes.len(), 2);
    assert!(matches!(
        named(&result.nodes, "main").metadata,
        NodeMetadata::Function { is_entry_point: true, .. }
    ));
    assert_eq!(result.diagnostics.len(), 1);
    insta::assert_snapshot!(
        result.diagnostics[0].to_string(),
        @r#"pkg/cli.py:8: SkippedStatement: `if __name__ == "__main__"` guard; kept with its entry point"#
    );

    let (_, _, text) = round_trip(&extractors, file, source);
    assert_eq!(
        text,
        "#!/usr/bin/env python3\nimport sys\n\ndef main():\n    return 0\n\n\nif __name__ == \"__main__\":\n    main()\n"
    );
    assert!(check_syntax(&extractors, file, &text).is_ok());
}

#[test]
fn test_main_guard_with_several_statements_is_kept_verbatim() {
    let file = "pkg/cli.py";
    let source = "\
def parse_args():
    return []


def main(args):
    return len(args)


if __name__ == \"__main__\":
    args = parse_args()
    main(args)
";
    let extractors = extractors();
    let result = extractors.extract(file, source);

    let main = named(&result.nodes, "main");
    assert!(matches!(
        &main.metadata,
        NodeMetadata::Function { is_entry_point: true, entry_guard: Some(guard), .. }
            if guard == "if __name__ == \"__main__\":\n    args = parse_args()\n    main(args)"
    ));
    assert!(matches!(
        named(&result.nodes, "parse_args").metadata,
        NodeMetadata::Function { is_entry_point: false, entry_guard: None, .. }
    ));

    let (_, _, text) = round_trip(&extractors, file, source);
    assert!(text.ends_with("if __name__ == \"__main__\":\n    args = parse_args()\n    main(args)\n"));
    assert!(check_syntax(&extractors, file, &text).is_ok());
}

#[test]
fn test_async_main_guard_keeps_event_loop_call() {
    let file = "pkg/serve.py";
    let source = "import asyncio\n\n\nasync def main():\n    await asyncio.sleep(0)\n\n\nif __name__ == \"__main__\":\n    asyncio.run(main())\n";
    let extractors = extractors();

    let (_, _, text) = round_trip(&extractors, file, source);
    assert_eq!(
        text,
        "#!/usr/bin/env python3\nimport asyncio\n\nasync def main():\n    await asyncio.sleep(0)\n\n\nif __name__ == \"__main__\":\n    asyncio.run(main())\n"
    );
}

#[test]
fn test_main_guard_without_local_call_is_reported_dropped() {
    let source = "import cli\n\n\nif __name__ == \"__main__\":\n    cli.run()\n";
    let result = extractors().extract("pkg/run.py", source);

    assert_eq!(result.nodes.len(), 1);
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.diagnostics[0].message.contains("dropped"));
}

#[test]
fn test_other_top_level_statements_are_skipped() {
    let source = "import logging\n\nlogging.basicConfig()\nCONFIG.value = 3\n";
    let result = extractors().extract(FILE, source);

    assert_eq!(result.nodes.len(), 1);
    assert_eq!(result.diagnostics.len(), 2);
    assert!(result.diagnostics.iter().all(|d| d.kind == DiagnosticKind::SkippedStatement));
    assert_eq!(result.diagnostics[0].line, Some(2));
}

#[test]
fn test_syntax_error_yields_parse_error() {
    let result = extractors().extract(FILE, "def broken(:\n    pass\n");

    assert!(result.nodes.is_empty());
    let diagnostic = result.parse_error().unwrap();
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.file_path, FILE);
    assert!(diagnostic.line.is_some());
}

#[test]
fn test_unsupported_extension_is_a_parse_error() {
    let result = extractors().extract("src/main.rs", "fn main() {}\n");
    assert!(result.nodes.is_empty());
    assert!(result.parse_error().is_some());
}

// ── Markdown and TOML ────────────────────────────────────

const GUIDE: &str = "Intro text.\n\n# Guide\n\nBody.\n\n## Install\n\n```sh\n# not a heading\n```\n\n# Reference\n\nSee the API.\n";

#[test]
fn test_markdown_sections() {
    let file = "docs/guide.md";
    let result = extractors().extract(file, GUIDE);

    let names: Vec<&str> = result.nodes.iter().map(|n| n.local_name()).collect();
    assert_eq!(names, vec!["preamble", "Guide", "Guide/Install", "Reference"]);

    let install = named(&result.nodes, "Guide/Install");
    assert_eq!(install.ordinal_position, 6);
    assert_eq!(install.content, "## Install\n\n```sh\n# not a heading\n```");
    assert_eq!(
        install.metadata,
        NodeMetadata::DocSection {
            level: 2,
            title: "Install".to_string(),
        }
    );

    let (_, _, text) = round_trip(&extractors(), file, GUIDE);
    assert_eq!(text, GUIDE);
}

#[test]
fn test_markdown_unterminated_fence() {
    let result = extractors().extract("README.md", "# Title\n\n```\ncode\n");
    assert!(result.nodes.is_empty());
    assert_eq!(result.parse_error().unwrap().line, Some(2));
}

const PYPROJECT: &str = "name = \"demo\"\n\n# Build settings\n[build]\njobs = 4\nscript = \"\"\"\n[not.a.table]\n\"\"\"\n\n[[bin]]\npath = \"a\"\n\n[[bin]]\npath = \"b\"\n";

#[test]
fn test_toml_sections() {
    let file = "pyproject.toml";
    let result = extractors().extract(file, PYPROJECT);

    let tables: Vec<(&str, usize)> = result
        .nodes
        .iter()
        .map(|n| (n.local_name(), n.ordinal_position))
        .collect();
    assert_eq!(tables, vec![("root", 0), ("build", 2), ("bin", 9), ("bin", 12)]);

    let build = named(&result.nodes, "build");
    assert!(build.content.starts_with("# Build settings\n[build]"));
    assert!(build.content.ends_with("[not.a.table]\n\"\"\""));
    assert_ne!(result.nodes[2].id, result.nodes[3].id);
    assert_eq!(
        result.nodes[2].metadata,
        NodeMetadata::ConfigSection {
            table: "bin".to_string(),
            is_array_table: true,
        }
    );

    let (_, _, text) = round_trip(&extractors(), file, PYPROJECT);
    assert_eq!(text, PYPROJECT);
}

#[test]
fn test_toml_quoted_table_keys() {
    let source = "a = 1\n\n[\"x]y\"]\nb = 2\n\n[ server . \"v1.2\" ]\nport = 80\n\n[[\"odd]]name\"]]\nc = 3\n";
    let result = extractors().extract("settings.toml", source);

    let names: Vec<&str> = result.nodes.iter().map(|n| n.local_name()).collect();
    assert_eq!(names, vec!["root", "\"x]y\"", "server.\"v1.2\"", "\"odd]]name\""]);
    assert_eq!(
        result.nodes[3].metadata,
        NodeMetadata::ConfigSection {
            table: "\"odd]]name\"".to_string(),
            is_array_table: true,
        }
    );
}

#[test]
fn test_invalid_toml() {
    let result = extractors().extract("Cargo.toml", "[package]\nname = \n");
    assert!(result.nodes.is_empty());
    assert_eq!(result.parse_error().unwrap().line, Some(1));
}

// ── Validator ────────────────────────────────────────────

#[test]
fn test_validator_verdicts() {
    let extractors = extractors();
    let (_, _, projected) = round_trip(&extractors, FILE, EXAMPLE);

    let identical = validate(&extractors, "docs/guide.md", GUIDE, GUIDE);
    assert_eq!(identical.verdict, Verdict::Identical);
    assert_eq!(identical.similarity_ratio, 1.0);

    let reordered = validate(&extractors, FILE, EXAMPLE, &projected);
    assert_eq!(reordered.verdict, Verdict::StructurallyEquivalent);
    assert!(reordered.deltas.is_zero());
    assert_eq!(reordered.structural_counts.original.functions, 2);

    let partial = validate(&extractors, FILE, EXAMPLE, "import os\nimport sys\n\ndef f():\n    return g()\n");
    assert_eq!(partial.verdict, Verdict::PartiallyEquivalent);
    assert_eq!(partial.deltas.functions, -1);

    let invalid = validate(&extractors, FILE, EXAMPLE, "def (:\n");
    assert_eq!(invalid.verdict, Verdict::Invalid);
    assert!(invalid.syntax_error.is_some());
}

#[test]
fn test_fidelity_report_fields() {
    let extractors = extractors();
    let report = validate(&extractors, FILE, EXAMPLE, EXAMPLE);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["verdict"], "identical");
    assert_eq!(json["identical"], true);
    assert_eq!(json["structural_counts"]["projected"]["imports"], 2);
    assert_eq!(json["deltas"]["classes"], 0);
    assert!(json["syntax_error"].is_null());
    assert!(json.get("original_parse_error").is_none());
}

#[test]
fn test_similarity_ratio() {
    assert_eq!(similarity_ratio("a\nb\n", "b\nc\n"), 0.5);
    assert_eq!(similarity_ratio("", ""), 1.0);
    assert_eq!(similarity_ratio("", "a\n"), 0.0);
}

#[test]
fn test_check_syntax_rejects_broken_output() {
    let extractors = extractors();
    let err = check_syntax(&extractors, FILE, "class (:\n").unwrap_err();
    assert_eq!(err.file_path, FILE);
    assert!(check_syntax(&extractors, FILE, EXAMPLE).is_ok());
}

// ── Coordinator ──────────────────────────────────────────

#[tokio::test]
async fn test_full_index_over_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("pkg")).unwrap();
    fs::create_dir_all(root.join("build")).unwrap();
    fs::create_dir_all(root.join(".hidden")).unwrap();
    fs::write(root.join("pkg/app.py"), EXAMPLE).unwrap();
    fs::write(root.join("pkg/util.py"), "X = 1\n").unwrap();
    fs::write(root.join("README.md"), GUIDE).unwrap();
    fs::write(root.join("pyproject.toml"), PYPROJECT).unwrap();
    fs::write(root.join("notes.txt"), "not source").unwrap();
    fs::write(root.join("build/gen.py"), "Y = 2\n").unwrap();
    fs::write(root.join(".hidden/secret.py"), "Z = 3\n").unwrap();

    let settings = Settings::from_toml("[extract]\nexclude = [\"build/**\"]\nworkers = 2\n").unwrap();
    let coordinator = Coordinator::new(Arc::new(extractors()), settings.extract);

    let discovered: Vec<String> = coordinator
        .discover(root)
        .unwrap()
        .iter()
        .map(|p| path_key(root, p))
        .collect();
    assert_eq!(discovered, vec!["README.md", "pkg/app.py", "pkg/util.py", "pyproject.toml"]);

    let mut store = ProjectStore::new();
    let report = coordinator.run_full_index(root, &mut store).await.unwrap();
    assert_eq!(report.files.len(), 4);
    assert!(!report.has_parse_errors());
    assert_eq!(store.file_count(), 4);
    assert_eq!(store.get_file_index("pkg/app.py").map(|ids| ids.len()), Some(4));

    // A broken file keeps its previous nodes; a deleted one loses them.
    fs::write(root.join("pkg/util.py"), "def (:\n").unwrap();
    fs::remove_file(root.join("README.md")).unwrap();

    let report = coordinator.run_full_index(root, &mut store).await.unwrap();
    assert!(report.has_parse_errors());
    assert_eq!(report.removed.len(), 4);
    assert_eq!(store.file_count(), 3);
    assert_eq!(store.get_file_index("pkg/util.py").map(|ids| ids.len()), Some(1));
    assert!(store.get_file_index("README.md").is_none());

    let util = report.files.iter().find(|f| f.file_path == "pkg/util.py").unwrap();
    assert!(util.upsert.is_none());
}
