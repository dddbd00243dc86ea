//! Prism Core: node model, project store, resolver and projector

pub mod cache;
pub mod error;
pub mod model;
pub mod projector;
pub mod resolver;
pub mod settings;
pub mod store;
pub mod triggers;


#[cfg(test)]
pub mod test_utils;

pub use model::{Language, Node, NodeId, NodeKind, NodeMetadata, Occurrences, OriginContext, qualify};
pub use store::{ProjectStore, Superseded, UpsertResult};
pub use resolver::{CycleWarning, Resolution, resolve_order};
pub use projector::{DanglingDependency, GroupInversion, Projection, ProjectionConfig, project};
pub use triggers::{ProjectionTarget, TriggerPredicate, TriggerRule, default_rules};
pub use settings::{ExtractSettings, SETTINGS_FILE, Settings};
pub use error::{ModelError, ProjectError, ResolveError, SettingsError, SyntaxInvalid};
pub use cache::{MODEL_DIR, MODEL_FILE, model_dir, model_path, save_model, load_model, clear_cache};
