//! TPX3-specific error types.

use thiserror::Error;

/// Result type for TPX3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a chunk was rejected. Always recoverable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFault {
    /// Declared payload size is not a whole number of packets.
    #[error("chunk size {0} is not a multiple of 8")]
    Misaligned(usize),

    /// Declared payload extends past the end of the data.
    #[error("chunk declares {declared} bytes but only {available} remain")]
    Truncated { declared: usize, available: usize },
}

/// TPX3-specific error types.
#[derive(Error, Debug)]
pub enum Error {
    /// The file cannot be decoded at all.
    #[error("corrupt file: {0}")]
    CorruptFile(String),

    /// Chip transform produces coordinates outside the u16 range.
    #[error("invalid chip transform for chip {chip}: {reason}")]
    InvalidTransform { chip: usize, reason: String },

    /// Detector layout could not be loaded.
    #[error("layout error: {0}")]
    LayoutError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] hermes_core::Error),
}
