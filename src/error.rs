//! Error types for the chunking engine.

use thiserror::Error;

/// Errors raised by configuration, dynamics and orchestration.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A configuration field is outside its documented range.
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig {
        /// Name of the offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// An item or pattern does not have the configured dimension.
    #[error("Dimension mismatch: expected {expected}, actual {actual}")]
    DimensionMismatch {
        /// Configured item dimension
        expected: usize,
        /// Dimension that was supplied
        actual: usize,
    },

    /// An input value is NaN or infinite.
    #[error("Non-finite value in item {index}")]
    NonFiniteValue {
        /// Sequence position of the offending item
        index: usize,
    },

    /// The classifier answered outside its contract.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal numeric state escaped its bounds (a defect, not a user error).
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The batch worker pool could not be built.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl ChunkingError {
    /// Create an InvalidConfig error.
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }
}

/// Result type alias for chunking operations.
pub type ChunkingResult<T> = Result<T, ChunkingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            ChunkingError::invalid_config("field_sizes", "must be non-increasing"),
            ChunkingError::dimension_mismatch(10, 3),
            ChunkingError::NonFiniteValue { index: 4 },
            ChunkingError::InvalidState("MapFieldMismatch".into()),
        ];
        let expected = ["field_sizes", "expected 10", "item 4", "MapFieldMismatch"];

        for (err, needle) in errors.iter().zip(expected.iter()) {
            let display = err.to_string();
            assert!(
                display.contains(needle),
                "Display for {:?} should contain '{}', got: {}",
                err,
                needle,
                display
            );
        }
    }
}
