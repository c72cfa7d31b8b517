//! Error types for hermes-core.

use thiserror::Error;

/// Result type alias for hermes operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for hermes operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A bookkeeping identity was violated. This is a defect, never a data problem.
    #[error("internal consistency violated: {0}")]
    InternalConsistency(String),

    /// A cluster label does not fit the number of clusters reported.
    #[error("cluster label {label} out of range for {clusters} clusters")]
    InvalidClusterLabel { label: i32, clusters: usize },

    /// Column lengths of a signal batch disagree.
    #[error("column length mismatch: expected {expected}, found {found}")]
    ColumnMismatch { expected: usize, found: usize },

    /// Configuration could not be applied.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Empty cluster error.
    #[error("cannot aggregate an empty cluster")]
    EmptyCluster,
}
