//! I/O and orchestration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input path does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Input file is not a `.tpx3` file.
    #[error("unsupported file extension: {}", .0.display())]
    UnsupportedExtension(PathBuf),

    /// The file cannot be decoded at all. Fatal for that file only.
    #[error("corrupt file {}: {reason}", path.display())]
    CorruptFile { path: PathBuf, reason: String },

    /// A bookkeeping identity was violated. Aborts the run.
    #[error("internal consistency violated: {0}")]
    InternalConsistency(String),

    /// Report serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TPX3 decoding error.
    #[error("tpx error: {0}")]
    TpxError(hermes_tpx::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(hermes_core::Error),
}

impl Error {
    /// True for errors that must stop a batch run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InternalConsistency(_))
    }
}

impl From<hermes_core::Error> for Error {
    fn from(err: hermes_core::Error) -> Self {
        match err {
            hermes_core::Error::InternalConsistency(msg) => Self::InternalConsistency(msg),
            other => Self::CoreError(other),
        }
    }
}

impl From<hermes_tpx::Error> for Error {
    fn from(err: hermes_tpx::Error) -> Self {
        match err {
            hermes_tpx::Error::CoreError(core) => core.into(),
            hermes_tpx::Error::IoError(io) => Self::Io(io),
            other => Self::TpxError(other),
        }
    }
}
