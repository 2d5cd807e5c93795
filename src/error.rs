use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the curve-level and matrix-level stages.
///
/// Per-curve variants (`MissingColumn`, `InsufficientPoints`) are caught by the
/// batch drivers and turn into a skipped entity; the rest abort the stage.
#[derive(Debug, Error)]
pub enum CurveError {
    #[error("No usable {column} column in '{path}'")]
    MissingColumn { column: &'static str, path: PathBuf },

    #[error("Need at least 2 points, found {found}")]
    InsufficientPoints { found: usize },

    #[error("Entity counts differ: {left} vs {right}")]
    CountMismatch { left: usize, right: usize },

    #[error("Expected {expected} columns, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("Collection '{collection}' has no usable curves")]
    EmptyCollection { collection: String },
}
