//! Prism Indexer: parsing, node extraction, batch indexing and validation

pub mod config;
pub mod coordinator;
pub mod extractor;
pub mod languages;
pub mod parser_pool;
pub mod validator;

#[cfg(test)]
pub mod tests;

pub use parser_pool::{FileType, ParseRequest, ParseResult, ParserPool};
pub use extractor::{Diagnostic, DiagnosticKind, ExtractionResult, Extractors, LanguageExtractor, Severity};
pub use coordinator::{Coordinator, FileReport, IndexReport, ingest, path_key};
pub use validator::{
    CountDeltas, CountsPair, FidelityReport, StructuralCounts, Verdict, check_syntax, similarity_ratio, validate,
};
