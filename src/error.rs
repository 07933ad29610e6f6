//! Centralized error types for mailedrm.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailedrm library.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The archive path does not exist.
    #[error("Archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    /// The path exists but is not a readable mbox archive.
    #[error("Not a valid mbox archive: {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    /// The output directory is already present.
    #[error("Output directory already exists: {0}")]
    OutputExists(PathBuf),

    /// A parsing error occurred at a specific byte offset of an mbox file.
    #[error("Parse error in '{path}' at offset {offset}: {reason}")]
    Parse {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// A single item of the archive could not be extracted.
    #[error("Extraction failed for {location}: {reason}")]
    Extraction { location: String, reason: String },

    /// Writing the loadfile XML failed.
    #[error("Loadfile serialization error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A configuration value is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Strict mode rejected a conversion that had extraction failures.
    #[error("{count} item(s) could not be extracted (strict mode)")]
    StrictFailure { count: usize },
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a precondition failure (nothing was written).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ArchiveNotFound(_) | Self::InvalidArchive { .. } | Self::OutputExists(_)
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `ConvertError::io`).
impl From<std::io::Error> for ConvertError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
