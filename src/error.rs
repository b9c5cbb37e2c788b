//! Error types for reading counts, scoring and writing reports.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KinderMinerError>;

#[derive(Debug, Error)]
pub enum KinderMinerError {
    /// Margins that cannot describe a 2x2 table over the stated corpus.
    #[error("invalid counts for target '{target}': {reason}")]
    InvalidCounts { target: String, reason: String },

    #[error("count file is missing required column '{0}'")]
    MissingColumn(String),

    #[error("line {line}: {message}")]
    Record { line: u64, message: String },

    #[error("significance threshold must be finite and > 0, got {0}")]
    InvalidThreshold(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
