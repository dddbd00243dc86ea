//! TOML extractor: one ConfigSection per table header
//!
//! The `toml` crate decides whether the document is valid. Section boundaries
//! come from a line scanner, because the parsed `Table` no longer knows where
//! anything was written.

use std::path::Path;

use prism_core::{Language, Node, NodeMetadata, Occurrences, OriginContext, qualify};

use crate::extractor::{Diagnostic, ExtractionResult, LanguageExtractor};

/// Local name of the key/values before the first table header.
pub const ROOT_SECTION: &str = "root";

#[derive(Debug, Default, Clone, Copy)]
pub struct TomlTableExtractor;

struct SectionStart {
    byte: usize,
    line: usize,
    table: String,
    is_array_table: bool,
}

impl LanguageExtractor for TomlTableExtractor {
    fn extract(&self, file_path: &str, source: &str) -> ExtractionResult {
        if let Err(e) = source.parse::<toml::Table>() {
            let line = e.span().map(|span| line_of(source, span.start));
            return ExtractionResult::failed(Diagnostic::parse_error(file_path, line, e.message()));
        }

        let starts = scan_tables(source);
        let origin = OriginContext::classify(Path::new(file_path), Language::Toml);
        let mut occurrences = Occurrences::default();
        let mut nodes = Vec::with_capacity(starts.len());

        for (i, start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map_or(source.len(), |next| next.byte);
            let content = source[start.byte..end].trim_end();
            if content.is_empty() {
                continue;
            }

            let local_name = if start.table.is_empty() { ROOT_SECTION } else { start.table.as_str() };
            let qualified_name = qualify(file_path, local_name);
            let metadata = NodeMetadata::ConfigSection {
                table: start.table.clone(),
                is_array_table: start.is_array_table,
            };
            let occurrence = occurrences.next(metadata.kind(), &qualified_name);
            nodes.push(Node::new(
                qualified_name,
                content.to_string(),
                start.line,
                occurrence,
                origin,
                metadata,
            ));
        }

        ExtractionResult {
            nodes,
            diagnostics: Vec::new(),
        }
    }
}

fn line_of(source: &str, byte: usize) -> usize {
    source.as_bytes()[..byte.min(source.len())]
        .iter()
        .filter(|b| **b == b'\n')
        .count()
}

/// String state carried across lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Multiline {
    None,
    Basic,
    Literal,
}

/// Section starts in document order. The first entry is always the root
/// section. Comment lines directly above a header belong to its section.
fn scan_tables(source: &str) -> Vec<SectionStart> {
    let mut starts = vec![SectionStart {
        byte: 0,
        line: 0,
        table: String::new(),
        is_array_table: false,
    }];

    let mut multiline = Multiline::None;
    let mut depth: usize = 0;
    // Start of the comment run directly above the current line.
    let mut comments: Option<(usize, usize)> = None;

    let mut byte = 0;
    for (line_no, raw) in source.split_inclusive('\n').enumerate() {
        let line = raw.trim_end_matches(['\n', '\r']);
        let line_start = byte;
        byte += raw.len();

        if multiline == Multiline::None && depth == 0 {
            let trimmed = line.trim();
            if trimmed.starts_with('#') {
                comments.get_or_insert((line_start, line_no));
                continue;
            }
            if let Some((table, is_array_table)) = parse_header(trimmed) {
                let (byte, line) = comments.take().unwrap_or((line_start, line_no));
                starts.push(SectionStart {
                    byte,
                    line,
                    table,
                    is_array_table,
                });
                continue;
            }
        }

        comments = None;
        (multiline, depth) = scan_line(line, multiline, depth);
    }

    starts
}

/// `[a.b]` or `[[a.b]]`, optionally followed by a comment. Quoted keys may
/// hold `]` and `.`.
fn parse_header(line: &str) -> Option<(String, bool)> {
    let (open, is_array_table) = if line.starts_with("[[") {
        (2, true)
    } else if line.starts_with('[') {
        (1, false)
    } else {
        return None;
    };
    let close = unquoted(line.as_bytes(), open, b']')?;
    let after = if is_array_table {
        line[close..].strip_prefix("]]")?
    } else {
        &line[close + 1..]
    };
    let trailing = after.trim();
    if !trailing.is_empty() && !trailing.starts_with('#') {
        return None;
    }

    let table = key_parts(&line[open..close]).join(".");
    (!table.is_empty()).then_some((table, is_array_table))
}

/// First `target` at or after `from` that is not inside a quoted key.
fn unquoted(bytes: &[u8], from: usize, target: u8) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => i = skip_string(bytes, i, quote),
            b if b == target => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parts of a dotted key, trimmed.
fn key_parts(key: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(dot) = unquoted(key.as_bytes(), start, b'.') {
        parts.push(key[start..dot].trim());
        start = dot + 1;
    }
    parts.push(key[start..].trim());
    parts
}

/// Advance the string and bracket state over one line of a value.
fn scan_line(line: &str, mut multiline: Multiline, mut depth: usize) -> (Multiline, usize) {
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        match multiline {
            Multiline::Basic => {
                if bytes[i] == b'\\' {
                    i += 2;
                    continue;
                }
                if rest.starts_with(b"\"\"\"") {
                    multiline = Multiline::None;
                    i += 3;
                    continue;
                }
            }
            Multiline::Literal => {
                if rest.starts_with(b"'''") {
                    multiline = Multiline::None;
                    i += 3;
                    continue;
                }
            }
            Multiline::None => {
                if rest.starts_with(b"\"\"\"") {
                    multiline = Multiline::Basic;
                    i += 3;
                    continue;
                }
                if rest.starts_with(b"'''") {
                    multiline = Multiline::Literal;
                    i += 3;
                    continue;
                }
                match bytes[i] {
                    b'#' => break,
                    b'"' => i = skip_string(bytes, i, b'"'),
                    b'\'' => i = skip_string(bytes, i, b'\''),
                    b'[' | b'{' => depth += 1,
                    b']' | b'}' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
        }
        i += 1;
    }

    (multiline, depth)
}

/// Index of the closing quote of a single-line string opened at `open`.
fn skip_string(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if quote == b'"' && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            return i;
        }
        i += 1;
    }
    bytes.len()
}
