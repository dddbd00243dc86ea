//! CLI command implementations

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use prism_core::{
    ProjectStore, ProjectionConfig, ProjectionTarget, Resolution, Settings, clear_cache, load_model, model_path,
    resolve_order, save_model,
};
use prism_indexer::{Coordinator, Extractors, ParserPool, Verdict, check_syntax, path_key};

/// How a command ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// At least one file failed to parse.
    ParseErrors,
    /// The output was written, but a dependency cycle had to be broken.
    CycleWarning,
    /// The projected output does not parse.
    Invalid,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(match self {
            Outcome::Success => 0,
            Outcome::ParseErrors => 1,
            Outcome::CycleWarning => 2,
            Outcome::Invalid => 3,
        })
    }
}

/// Paths shared by every command.
pub struct Context {
    pub root: PathBuf,
    /// Explicit `--model`; otherwise `<root>/.prism/model.json`.
    pub model: Option<PathBuf>,
}

impl Context {
    pub fn new(root: PathBuf, model: Option<PathBuf>) -> Self {
        Self { root, model }
    }

    fn model_for(&self, root: &Path) -> PathBuf {
        self.model.clone().unwrap_or_else(|| model_path(root))
    }

    /// Root, model and store key for a file argument. Without `--model`, the
    /// nearest `.prism/model.json` at or above the file's directory wins, so a
    /// model written by `prism extract sub` serves `prism project sub/a.py`.
    fn locate(&self, file: &str) -> Located {
        let path = self.root.join(file);
        let root = match &self.model {
            Some(_) => None,
            None => path
                .ancestors()
                .skip(1)
                .take_while(|dir| dir.starts_with(&self.root))
                .find(|dir| model_path(dir).exists()),
        };
        let root = root.map_or_else(|| self.root.clone(), Path::to_path_buf);

        Located {
            key: path_key(&root, &path),
            model: self.model_for(&root),
            root,
        }
    }

    fn settings(&self, root: &Path) -> Result<Settings> {
        Settings::load(root).with_context(|| format!("Invalid settings under {}", root.display()))
    }
}

/// Where a file argument lives in the model.
struct Located {
    root: PathBuf,
    model: PathBuf,
    key: String,
}

impl Located {
    fn load_store(&self) -> Result<ProjectStore> {
        load_model(&self.model)?
            .ok_or_else(|| anyhow!("No model at {}; run `prism extract` first", self.model.display()))
    }
}

pub async fn extract(context: &Context, dir: Option<PathBuf>) -> Result<Outcome> {
    let root = dir.unwrap_or_else(|| context.root.clone());
    tracing::info!("Extracting repository: {}", root.display());

    let settings = context.settings(&root)?;
    let model = context.model_for(&root);
    let mut store = match load_model(&model) {
        Ok(store) => store.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Ignoring unreadable model, rebuilding: {}", e);
            ProjectStore::new()
        }
    };

    let extractors = Arc::new(Extractors::new(ParserPool::new(settings.extract.worker_count())));
    let coordinator = Coordinator::new(extractors, settings.extract);
    let report = coordinator.run_full_index(&root, &mut store).await?;

    save_model(&store, &model)?;
    tracing::info!(
        "Model written to {} ({} nodes, {} files)",
        model.display(),
        store.node_count(),
        store.file_count()
    );

    if report.has_parse_errors() {
        for diagnostic in report.diagnostics().filter(|d| d.is_parse_error()) {
            eprintln!("{}", diagnostic);
        }
        return Ok(Outcome::ParseErrors);
    }
    Ok(Outcome::Success)
}

pub fn project(context: &Context, file: &str, output: Option<&Path>) -> Result<Outcome> {
    let located = context.locate(file);
    let settings = context.settings(&located.root)?;
    let store = located.load_store()?;
    let key = located.key;

    let (resolution, text) = render(&store, &key, &settings.projection)?;

    let extractors = Extractors::new(ParserPool::new(1));
    if let Err(e) = check_syntax(&extractors, &key, &text) {
        tracing::error!("{}", e);
        return Ok(Outcome::Invalid);
    }

    match output {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Projected {} to {}", key, path.display());
        }
        None => std::io::stdout().write_all(text.as_bytes())?,
    }

    Ok(cycle_outcome(&resolution))
}

pub fn validate(context: &Context, file: &str, report_path: Option<&Path>) -> Result<Outcome> {
    let located = context.locate(file);
    let settings = context.settings(&located.root)?;
    let store = located.load_store()?;
    let key = located.key;

    let source_path = located.root.join(&key);
    let original = std::fs::read_to_string(&source_path)
        .with_context(|| format!("Failed to read {}", source_path.display()))?;
    let (resolution, projected) = render(&store, &key, &settings.projection)?;

    let extractors = Extractors::new(ParserPool::new(1));
    let report = prism_indexer::validate(&extractors, &key, &original, &projected);
    let json = serde_json::to_string_pretty(&report)?;

    match report_path {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{}", json),
    }
    tracing::info!(
        "{}: {:?} (similarity {:.2})",
        key,
        report.verdict,
        report.similarity_ratio
    );

    if report.verdict == Verdict::Invalid {
        return Ok(Outcome::Invalid);
    }
    Ok(cycle_outcome(&resolution))
}

pub fn clear(context: &Context) -> Result<Outcome> {
    tracing::info!("Clearing model for: {}", context.root.display());

    clear_cache(&context.root)?;
    if let Some(model) = context.model.as_deref().filter(|m| m.exists()) {
        std::fs::remove_file(model).with_context(|| format!("Failed to remove {}", model.display()))?;
    }

    tracing::info!("Model cleared");
    Ok(Outcome::Success)
}

/// Resolve and project every node of one file.
fn render(store: &ProjectStore, key: &str, config: &ProjectionConfig) -> Result<(Resolution, String)> {
    let ids = store
        .get_file_index(key)
        .ok_or_else(|| anyhow!("{} is not in the model", key))?;

    let resolution = resolve_order(ids, store)?;
    let target = ProjectionTarget::for_file(key, &store.get_nodes(ids));
    let projection = prism_core::project(&resolution.order, store, &target, config)?;

    Ok((resolution, projection.text))
}

fn cycle_outcome(resolution: &Resolution) -> Outcome {
    if resolution.has_cycles() {
        Outcome::CycleWarning
    } else {
        Outcome::Success
    }
}
