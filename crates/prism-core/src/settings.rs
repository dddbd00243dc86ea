//! `prism.toml` settings

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::projector::ProjectionConfig;

/// Settings file looked up at the repository root.
pub const SETTINGS_FILE: &str = "prism.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub extract: ExtractSettings,
    pub projection: ProjectionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractSettings {
    /// Globs, relative to the root, skipped by `extract`.
    pub exclude: Vec<String>,
    /// Parallel extraction workers; 0 means one per available core.
    pub workers: usize,
}

impl ExtractSettings {
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().max(2))
            .unwrap_or(2)
    }
}

impl Settings {
    /// Load `<root>/prism.toml`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self, SettingsError> {
        let path = root.join(SETTINGS_FILE);
        if !path.exists() {
            tracing::debug!("No {} under {}, using defaults", SETTINGS_FILE, root.display());
            return Ok(Settings::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        let settings = Self::from_toml(&text).map_err(|source| SettingsError::Toml {
            path: path.clone(),
            source,
        })?;
        settings.validate()?;
        tracing::debug!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Check every glob compiles.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for pattern in &self.extract.exclude {
            globset::Glob::new(pattern).map_err(|source| SettingsError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
        }
        for rule in &self.projection.rules {
            rule.when.validate()?;
        }
        Ok(())
    }
}
