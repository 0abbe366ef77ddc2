//! Error types for filesystem model and directory operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from path queries, walks and directory operations.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Not a file: {path}")]
    NotAFile { path: PathBuf },

    #[error("Already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("Directory not empty: {path}")]
    NotEmpty { path: PathBuf },

    #[error("Operation '{operation}' is not supported on this platform")]
    UnsupportedOperation { operation: &'static str },

    #[error("Not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Classify an I/O error raised while touching `path`.
    ///
    /// `NotFound` and `NotADirectory` are split out so callers can treat a
    /// vanished or replaced entry as absent instead of failing.
    pub fn io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => FsError::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::NotADirectory => FsError::NotADirectory {
                path: path.to_path_buf(),
            },
            _ => FsError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        FsError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

pub type FsResult<T> = Result<T, FsError>;
