//! Error types for the propagation pipeline
//!
//! Configuration and I/O problems are fatal and surface here. Malformed
//! input lines are skipped at the call site and never reach this type, and
//! numerical degenerate states (zero norms, empty distributions) are not
//! errors at all.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while building graphs or propagating labels
#[derive(Error, Debug)]
pub enum PropError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Stage '{stage}' requires '{field}' to be set in the config file")]
    MissingParameter { stage: String, field: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PropError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PropError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(path: impl AsRef<Path>, line: usize, message: impl Into<String>) -> Self {
        PropError::Parse {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PropError>;
