//! Error types for the engine's fallible operations

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Language, NodeId, NodeKind};

/// Raised by the dependency resolver. Cycles are not errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("requested node {0} is not in the store")]
    UnknownNode(NodeId),
}

/// Raised by the projector when a requested node cannot be placed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectError {
    #[error("node {0} is not in the store")]
    MissingNode(NodeId),

    #[error("node {id} of kind {kind} cannot be placed in a {language:?} file")]
    KindNotPlaceable {
        id: NodeId,
        kind: NodeKind,
        language: Language,
    },
}

/// Persisted model file errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model file {path} is not valid: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("file index for {file} references unknown node {id}")]
    UnknownIndexedNode { file: String, id: NodeId },
}

/// `prism.toml` errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("cannot read settings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid glob {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Projected output that does not parse. The one hard failure of the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("projected output for {file_path} is not valid: {message}")]
pub struct SyntaxInvalid {
    pub file_path: String,
    pub message: String,
}
