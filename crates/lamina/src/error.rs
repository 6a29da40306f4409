//! Error types for the slicing pipeline.

use thiserror::Error;

/// Errors that can occur while configuring or running a slicing operation.
#[derive(Error, Debug)]
pub enum SliceError {
    /// Configuration rejected before any filesystem or process work started.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem error while preparing directories or the template file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The render worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    Pool(String),

    /// One or more slices failed and the run is configured to treat that
    /// as fatal.
    #[error("{failed} of {total} slices failed")]
    SlicesFailed {
        /// Number of jobs that ended in failure.
        failed: usize,
        /// Total number of jobs dispatched.
        total: usize,
    },
}

/// Result type for slicing operations.
pub type Result<T> = std::result::Result<T, SliceError>;
