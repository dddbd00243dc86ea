//! Fidelity checks between an original file and its projection

use std::collections::HashSet;

use prism_core::{Node, NodeKind, SyntaxInvalid};
use serde::Serialize;

use crate::extractor::{Diagnostic, Extractors};

/// Node counts per kind for one text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StructuralCounts {
    pub imports: usize,
    pub functions: usize,
    pub classes: usize,
    pub constants: usize,
    pub doc_sections: usize,
    pub config_sections: usize,
}

impl StructuralCounts {
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut counts = StructuralCounts::default();
        for node in nodes {
            let slot = match node.kind {
                NodeKind::Import => &mut counts.imports,
                NodeKind::Function => &mut counts.functions,
                NodeKind::Class => &mut counts.classes,
                NodeKind::Constant => &mut counts.constants,
                NodeKind::DocSection => &mut counts.doc_sections,
                NodeKind::ConfigSection => &mut counts.config_sections,
            };
            *slot += 1;
        }
        counts
    }

    /// `self - original`, per kind.
    pub fn delta_from(&self, original: &StructuralCounts) -> CountDeltas {
        let diff = |projected: usize, original: usize| projected as i64 - original as i64;
        CountDeltas {
            imports: diff(self.imports, original.imports),
            functions: diff(self.functions, original.functions),
            classes: diff(self.classes, original.classes),
            constants: diff(self.constants, original.constants),
            doc_sections: diff(self.doc_sections, original.doc_sections),
            config_sections: diff(self.config_sections, original.config_sections),
        }
    }
}

/// Projected minus original counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountDeltas {
    pub imports: i64,
    pub functions: i64,
    pub classes: i64,
    pub constants: i64,
    pub doc_sections: i64,
    pub config_sections: i64,
}

impl CountDeltas {
    pub fn is_zero(&self) -> bool {
        *self == CountDeltas::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountsPair {
    pub original: StructuralCounts,
    pub projected: StructuralCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The projection does not parse.
    Invalid,
    /// Byte-for-byte equal.
    Identical,
    /// Same number of nodes of every kind.
    StructurallyEquivalent,
    PartiallyEquivalent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FidelityReport {
    pub file_path: String,
    pub identical: bool,
    pub structural_counts: CountsPair,
    pub deltas: CountDeltas,
    pub similarity_ratio: f64,
    pub verdict: Verdict,
    pub syntax_error: Option<Diagnostic>,
    /// The original itself failed to parse; its counts are then all zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_parse_error: Option<Diagnostic>,
}

/// Compare a projection against the text it was built from, re-parsing both
/// with the extractor for `file_path`.
pub fn validate(extractors: &Extractors, file_path: &str, original: &str, projected: &str) -> FidelityReport {
    let original_result = extractors.extract(file_path, original);
    let projected_result = extractors.extract(file_path, projected);

    let counts = CountsPair {
        original: StructuralCounts::from_nodes(&original_result.nodes),
        projected: StructuralCounts::from_nodes(&projected_result.nodes),
    };
    let deltas = counts.projected.delta_from(&counts.original);
    let identical = original == projected;
    let syntax_error = projected_result.parse_error().cloned();

    let verdict = if syntax_error.is_some() {
        Verdict::Invalid
    } else if identical {
        Verdict::Identical
    } else if deltas.is_zero() {
        Verdict::StructurallyEquivalent
    } else {
        Verdict::PartiallyEquivalent
    };

    tracing::debug!("{}: verdict {:?}", file_path, verdict);

    FidelityReport {
        file_path: file_path.to_string(),
        identical,
        structural_counts: counts,
        deltas,
        similarity_ratio: similarity_ratio(original, projected),
        verdict,
        syntax_error,
        original_parse_error: original_result.parse_error().cloned(),
    }
}

/// Share of the original's distinct lines that also appear in the projection.
pub fn similarity_ratio(original: &str, projected: &str) -> f64 {
    let original_lines: HashSet<&str> = original.lines().collect();
    let projected_lines: HashSet<&str> = projected.lines().collect();

    if original_lines.is_empty() {
        return if projected_lines.is_empty() { 1.0 } else { 0.0 };
    }
    let shared = original_lines.intersection(&projected_lines).count();
    shared as f64 / original_lines.len() as f64
}

/// Fail when `text` does not parse as the language of `file_path`.
pub fn check_syntax(extractors: &Extractors, file_path: &str, text: &str) -> Result<(), SyntaxInvalid> {
    match extractors.extract(file_path, text).parse_error() {
        Some(diagnostic) => Err(SyntaxInvalid {
            file_path: file_path.to_string(),
            message: diagnostic.message.clone(),
        }),
        None => Ok(()),
    }
}
