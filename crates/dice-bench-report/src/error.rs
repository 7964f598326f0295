//! Error types for report rendering.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    /// The store holds no benchmark entries.
    #[error("No results to report")]
    NoResults,

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Plot error: {0}")]
    Plot(String),
}

impl ReportError {
    /// Whether this is a precondition failure rather than a rendering fault.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::NoResults)
    }
}
