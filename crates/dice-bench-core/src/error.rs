//! Error types for the benchmarking engine.
//!
//! Only configuration and persistence problems are errors. Per-run failures
//! (timeouts, tool crashes, missing markers) are recorded as data in the
//! results store and never surface here.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the benchmarking engine.
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown unparsable-marker policy: {0} (expected \"failure\" or \"absent\")")]
    UnknownPolicy(String),

    #[error("No metrics selected")]
    NoMetricsSelected,

    #[error("Please select at least one mode")]
    NoModesSelected,

    #[error("Invalid directory specified: {}", .0.display())]
    InvalidBenchmarkDir(PathBuf),

    #[error("Tool not found: {}", .0.display())]
    ToolNotFound(PathBuf),

    // ==========================================================================
    // Persistence Errors
    // ==========================================================================
    #[error("Results file {} is malformed: {source}", path.display())]
    MalformedResults {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error stems from invalid user input rather than a runtime
    /// failure. Configuration errors abort before any subprocess is spawned.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownMode(_)
                | Self::UnknownMetric(_)
                | Self::UnknownPolicy(_)
                | Self::NoMetricsSelected
                | Self::NoModesSelected
                | Self::InvalidBenchmarkDir(_)
                | Self::ToolNotFound(_)
        )
    }
}
