use std::borrow::Cow;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PackError>;

/// Canonical error surface for parampack.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("I/O error{}: {source}", display_path(.path))]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("Key '{key}' already exists in the store")]
    DuplicateKey { key: String },

    #[error("Key '{key}' was not found in the store index")]
    KeyNotFound { key: String },

    #[error("Key '{key}' holds no record named '{name}'")]
    RecordNotFound { key: String, name: String },

    #[error("Shape mismatch for '{name}' (expected {expected}, stored {actual})")]
    ShapeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Store is corrupted at offset {offset}: {reason}")]
    Corrupt {
        offset: u64,
        reason: Cow<'static, str>,
    },

    #[error("Invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Invalid shape: {reason}")]
    InvalidShape { reason: Cow<'static, str> },

    #[error("Record '{name}' needs {length} bytes, over the {limit} byte limit")]
    RecordTooLarge { name: String, length: u64, limit: u64 },

    #[error("Collection already holds an entity named '{name}'")]
    DuplicateName { name: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl PackError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn io_at(source: std::io::Error, path: &Path) -> Self {
        Self::Io {
            source,
            path: Some(path.to_path_buf()),
        }
    }
}

impl From<std::io::Error> for PackError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" ({})", path.display()),
        None => String::new(),
    }
}
