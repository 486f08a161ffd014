//! Error taxonomy for the correction engine.
//!
//! Configuration and degenerate-input errors abort a correction job before
//! any optimization work is wasted on it. Optimizer non-convergence is not an
//! error: it is reported alongside every solution instead.

use thiserror::Error;

/// Errors raised by the numerical core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrectionError {
    /// Inconsistent shapes or out-of-range parameters
    #[error("Configuration error: {field} is invalid: {reason}")]
    Configuration { field: String, reason: String },

    /// Inputs that would make the model undefined (empty, zero diagonal, NaN)
    #[error("Degenerate input: {message}")]
    DegenerateInput { message: String },

    /// Cooperative cancellation observed between bootstrap iterations
    #[error("Correction cancelled after {completed} of {total} bootstrap iterations")]
    Cancelled { completed: usize, total: usize },
}

impl CorrectionError {
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CorrectionError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        CorrectionError::DegenerateInput {
            message: message.into(),
        }
    }
}

/// Result alias used by the numerical core
pub type CorrectionResult<T> = std::result::Result<T, CorrectionError>;
