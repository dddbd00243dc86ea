//! Batch extraction over a directory tree
//!
//! Files are extracted in parallel on the blocking pool. Results come back
//! over one channel and a single loop writes them into the store.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use prism_core::{ExtractSettings, Language, NodeId, ProjectStore, UpsertResult};
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};

use crate::extractor::{Diagnostic, DiagnosticKind, ExtractionResult, Extractors, Severity};

/// Outcome of extracting one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_path: String,
    pub node_count: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// `None` when the file could not be extracted and its previous nodes
    /// were left in place.
    pub upsert: Option<UpsertResult>,
}

/// Outcome of a full directory extraction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    /// One entry per discovered file, sorted by path.
    pub files: Vec<FileReport>,
    /// Nodes dropped because their file is gone.
    pub removed: Vec<NodeId>,
}

impl IndexReport {
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.files.iter().flat_map(|f| f.diagnostics.iter())
    }

    pub fn has_parse_errors(&self) -> bool {
        self.diagnostics().any(|d| d.is_parse_error())
    }

    pub fn node_count(&self) -> usize {
        self.files.iter().map(|f| f.node_count).sum()
    }

    pub fn superseded_count(&self) -> usize {
        self.files
            .iter()
            .filter_map(|f| f.upsert.as_ref())
            .map(|u| u.superseded.len())
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct Coordinator {
    extractors: Arc<Extractors>,
    settings: ExtractSettings,
}

impl Coordinator {
    pub fn new(extractors: Arc<Extractors>, settings: ExtractSettings) -> Self {
        Self {
            extractors,
            settings,
        }
    }

    /// Supported files under `root`, sorted. Honours `.gitignore`, skips
    /// hidden entries (the model directory among them) and `exclude` globs.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let excludes = build_excludes(&self.settings.exclude)?;

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false);

        let mut files = Vec::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            if !Language::from_path(path).is_supported() {
                continue;
            }
            if excludes.is_match(path_key(root, path)) {
                tracing::debug!("Excluded {}", path.display());
                continue;
            }
            files.push(path.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    /// Re-extract every file under `root` into `store`. Per-file failures
    /// become diagnostics; only an unusable root or settings fail the run.
    pub async fn run_full_index(&self, root: &Path, store: &mut ProjectStore) -> Result<IndexReport> {
        let files = self
            .discover(root)
            .with_context(|| format!("Failed to scan {}", root.display()))?;
        tracing::info!("Extracting {} files under {}", files.len(), root.display());

        let semaphore = Arc::new(Semaphore::new(self.settings.worker_count()));
        let (tx, mut rx) = mpsc::channel::<(String, ExtractionResult)>(64);

        for path in files {
            let key = path_key(root, &path);
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let extractors = Arc::clone(&self.extractors);

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let task_key = key.clone();
                let result = tokio::task::spawn_blocking(move || extract_path(&extractors, &task_key, &path))
                    .await
                    .unwrap_or_else(|e| {
                        ExtractionResult::failed(Diagnostic::io(&key, format!("extraction task failed: {}", e)))
                    });
                if tx.send((key, result)).await.is_err() {
                    tracing::warn!("Extraction result dropped: receiver closed");
                }
            });
        }
        drop(tx);

        let mut seen = HashSet::new();
        let mut report = IndexReport::default();
        while let Some((file_path, result)) = rx.recv().await {
            seen.insert(file_path.clone());
            report.files.push(ingest(store, file_path, result));
        }
        report.files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        report.removed = store.retain_files(&seen);

        tracing::info!(
            "Extracted {} nodes from {} files ({} superseded, {} removed)",
            report.node_count(),
            report.files.len(),
            report.superseded_count(),
            report.removed.len()
        );

        Ok(report)
    }
}

/// Write one file's result into the store. A file that failed keeps whatever
/// the store already had for it.
pub fn ingest(store: &mut ProjectStore, file_path: String, result: ExtractionResult) -> FileReport {
    for diagnostic in &result.diagnostics {
        match diagnostic.kind {
            DiagnosticKind::SkippedStatement => tracing::warn!("{}", diagnostic),
            _ => tracing::error!("{}", diagnostic),
        }
    }

    if result.diagnostics.iter().any(|d| d.severity == Severity::Error) {
        return FileReport {
            file_path,
            node_count: 0,
            diagnostics: result.diagnostics,
            upsert: None,
        };
    }

    let node_count = result.nodes.len();
    let upsert = store.upsert_file(file_path.clone(), result.nodes);
    tracing::debug!(
        "{}: {} nodes ({} new, {} superseded, {} pruned)",
        file_path,
        node_count,
        upsert.inserted.len(),
        upsert.superseded.len(),
        upsert.pruned.len()
    );

    FileReport {
        file_path,
        node_count,
        diagnostics: result.diagnostics,
        upsert: Some(upsert),
    }
}

fn extract_path(extractors: &Extractors, file_path: &str, path: &Path) -> ExtractionResult {
    match std::fs::read_to_string(path) {
        Ok(source) => extractors.extract(file_path, &source),
        Err(e) => ExtractionResult::failed(Diagnostic::io(file_path, e.to_string())),
    }
}

fn build_excludes(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid exclude glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Store key for a file: relative to `root`, `/`-separated.
pub fn path_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
