use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheError;

/// Fatal errors of a generation run. No script is produced when one occurs.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Cannot resolve '{specifier}' required from {requiring_file}")]
    ModuleResolution {
        specifier: String,
        requiring_file: PathBuf,
    },

    #[error("Failed to transform {file}: {message}")]
    Transform { file: PathBuf, message: String },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
