//! Error types for Tematica operations.
//!
//! Provides rich error context for library consumers.

use std::fmt;

/// Main error type for Tematica operations.
///
/// Provides detailed context about failures including invalid
/// hyperparameters, dimension mismatches, and sampling inconsistencies
/// detected during training.
///
/// # Examples
///
/// ```
/// use tematica::error::TematicaError;
///
/// let err = TematicaError::InvalidHyperparameter {
///     param: "alpha".to_string(),
///     value: "-0.1".to_string(),
///     constraint: "alpha > 0".to_string(),
/// };
/// assert!(err.to_string().contains("Invalid hyperparameter"));
/// ```
#[derive(Debug)]
pub enum TematicaError {
    /// Invalid hyperparameter value provided.
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Vector/table dimensions don't match for the operation.
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// A count invariant was violated during a training sweep.
    TrainingError {
        /// Description of the violated invariant
        message: String,
    },

    /// Serialization/deserialization error.
    Serialization(String),

    /// Generic error with string message.
    Other(String),
}

impl fmt::Display for TematicaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TematicaError::InvalidHyperparameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid hyperparameter: {param} = {value}, expected {constraint}"
                )
            }
            TematicaError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {expected}, got {actual}")
            }
            TematicaError::TrainingError { message } => {
                write!(f, "Training error: {message}")
            }
            TematicaError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            TematicaError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TematicaError {}

impl From<&str> for TematicaError {
    fn from(msg: &str) -> Self {
        TematicaError::Other(msg.to_string())
    }
}

impl From<String> for TematicaError {
    fn from(msg: String) -> Self {
        TematicaError::Other(msg)
    }
}

impl TematicaError {
    /// Create an invalid hyperparameter error from a numeric value.
    #[must_use]
    pub fn bad_param(param: &str, value: f64, constraint: &str) -> Self {
        Self::InvalidHyperparameter {
            param: param.to_string(),
            value: format!("{value}"),
            constraint: constraint.to_string(),
        }
    }

    /// Create a training-consistency error.
    #[must_use]
    pub fn inconsistency(message: impl Into<String>) -> Self {
        Self::TrainingError {
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, TematicaError>;
