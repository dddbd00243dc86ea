//! Markdown extractor: one DocSection per ATX heading

use std::path::Path;
use std::sync::LazyLock;

use prism_core::{Language, Node, NodeMetadata, Occurrences, OriginContext, qualify};
use regex::Regex;

use crate::extractor::{Diagnostic, ExtractionResult, LanguageExtractor};

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?(?:[ \t]+#+)?[ \t]*$").expect("heading pattern compiles")
});

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})").expect("fence pattern compiles"));

/// Local name of the text before the first heading.
pub const PREAMBLE: &str = "preamble";

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownExtractor;

/// Where a section starts.
struct SectionStart {
    byte: usize,
    line: usize,
    level: u8,
    title: String,
    path: String,
}

impl LanguageExtractor for MarkdownExtractor {
    fn extract(&self, file_path: &str, source: &str) -> ExtractionResult {
        let starts = match scan_headings(source) {
            Ok(starts) => starts,
            Err(line) => {
                return ExtractionResult::failed(Diagnostic::parse_error(
                    file_path,
                    Some(line),
                    "code fence is never closed",
                ));
            }
        };

        let origin = OriginContext::classify(Path::new(file_path), Language::Markdown);
        let mut occurrences = Occurrences::default();
        let mut nodes = Vec::with_capacity(starts.len());

        for (i, start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map_or(source.len(), |next| next.byte);
            let content = source[start.byte..end].trim_end();
            if content.is_empty() {
                continue;
            }

            let qualified_name = qualify(file_path, &start.path);
            let metadata = NodeMetadata::DocSection {
                level: start.level,
                title: start.title.clone(),
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

/// Find every section start, preamble included. Fails with the line of a
/// fence that never closes.
fn scan_headings(source: &str) -> Result<Vec<SectionStart>, usize> {
    let mut starts = vec![SectionStart {
        byte: 0,
        line: 0,
        level: 0,
        title: String::new(),
        path: PREAMBLE.to_string(),
    }];
    // (level, title) of the enclosing headings.
    let mut trail: Vec<(u8, String)> = Vec::new();
    // (fence marker, line it opened on)
    let mut open_fence: Option<(&str, usize)> = None;

    let mut byte = 0;
    for (line_no, raw) in source.split_inclusive('\n').enumerate() {
        let line = raw.trim_end_matches(['\n', '\r']);
        let line_start = byte;
        byte += raw.len();

        if let Some((marker, _)) = open_fence {
            if closes_fence(line, marker) {
                open_fence = None;
            }
            continue;
        }
        if let Some(fence) = FENCE.captures(line).and_then(|c| c.get(1)) {
            open_fence = Some((fence.as_str(), line_no));
            continue;
        }

        let Some(heading) = HEADING.captures(line) else {
            continue;
        };
        let level = heading.get(1).map_or(1, |m| m.as_str().len()) as u8;
        let title = heading.get(2).map_or("", |m| m.as_str()).trim().to_string();

        while trail.last().is_some_and(|(parent, _)| *parent >= level) {
            trail.pop();
        }
        trail.push((level, title.clone()));
        let path = trail.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>().join("/");

        starts.push(SectionStart {
            byte: line_start,
            line: line_no,
            level,
            title,
            path,
        });
    }

    match open_fence {
        Some((_, line)) => Err(line),
        None => Ok(starts),
    }
}

/// A closing fence uses the opening character at least as many times and
/// carries no info string.
fn closes_fence(line: &str, marker: &str) -> bool {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return false;
    }
    let Some(fence_char) = marker.chars().next() else {
        return false;
    };
    let run = trimmed.chars().take_while(|c| *c == fence_char).count();
    run >= marker.len() && trimmed[run..].trim().is_empty()
}
