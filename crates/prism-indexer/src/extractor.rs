//! Language extractor trait, diagnostics and the per-language registry

use std::fmt;
use std::path::Path;

use prism_core::{Language, Node};
use serde::Serialize;

use crate::config::toml_tables::TomlTableExtractor;
use crate::languages::markdown::MarkdownExtractor;
use crate::languages::python::PythonExtractor;
use crate::parser_pool::ParserPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// The source did not parse; the file produced no nodes.
    ParseError,
    /// Top-level code that is not a declaration and so not a node.
    SkippedStatement,
    /// The file could not be read.
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Something an extraction run wants the caller to know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub file_path: String,
    /// Zero-based line, when the problem has one.
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn parse_error(file_path: &str, line: Option<usize>, message: impl Into<String>) -> Self {
        Diagnostic {
            kind: DiagnosticKind::ParseError,
            severity: Severity::Error,
            file_path: file_path.to_string(),
            line,
            message: message.into(),
        }
    }

    pub fn skipped(file_path: &str, line: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            kind: DiagnosticKind::SkippedStatement,
            severity: Severity::Warning,
            file_path: file_path.to_string(),
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn io(file_path: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Io,
            severity: Severity::Error,
            file_path: file_path.to_string(),
            line: None,
            message: message.into(),
        }
    }

    pub fn is_parse_error(&self) -> bool {
        self.kind == DiagnosticKind::ParseError
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {:?}: {}", self.file_path, line + 1, self.kind, self.message),
            None => write!(f, "{}: {:?}: {}", self.file_path, self.kind, self.message),
        }
    }
}

/// Nodes and diagnostics produced from one file.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub nodes: Vec<Node>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractionResult {
    /// No nodes, one diagnostic.
    pub fn failed(diagnostic: Diagnostic) -> Self {
        ExtractionResult {
            nodes: Vec::new(),
            diagnostics: vec![diagnostic],
        }
    }

    pub fn parse_error(&self) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.is_parse_error())
    }
}

/// Turns one file's text into nodes. Never fails: problems become diagnostics.
pub trait LanguageExtractor: Send + Sync {
    /// `file_path` is the path relative to the project root; it qualifies names.
    fn extract(&self, file_path: &str, source: &str) -> ExtractionResult;
}

/// One extractor per supported language.
#[derive(Debug)]
pub struct Extractors {
    python: PythonExtractor,
    markdown: MarkdownExtractor,
    toml: TomlTableExtractor,
}

impl Extractors {
    pub fn new(parser_pool: ParserPool) -> Self {
        Extractors {
            python: PythonExtractor::new(parser_pool),
            markdown: MarkdownExtractor,
            toml: TomlTableExtractor,
        }
    }

    /// Get the extractor for a language, if it has one.
    pub fn get(&self, language: Language) -> Option<&dyn LanguageExtractor> {
        match language {
            Language::Python => Some(&self.python),
            Language::Markdown => Some(&self.markdown),
            Language::Toml => Some(&self.toml),
            Language::Other => None,
        }
    }

    /// Extract with whichever extractor the path's extension selects.
    pub fn extract(&self, file_path: &str, source: &str) -> ExtractionResult {
        let language = Language::from_path(Path::new(file_path));
        match self.get(language) {
            Some(extractor) => extractor.extract(file_path, source),
            None => ExtractionResult::failed(Diagnostic::parse_error(
                file_path,
                None,
                "no extractor for this file type",
            )),
        }
    }
}
