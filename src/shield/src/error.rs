//! Error types for rule evaluation

use thiserror::Error;

use crate::verdict::Reason;

/// Rule evaluation errors
///
/// Cloneable so that a failure raised inside a cached computation can be
/// handed to every evaluator awaiting it.
#[derive(Debug, Clone, Error)]
pub enum ShieldError {
    /// Predicate raised an error (surfaced in debug mode)
    #[error("Rule '{rule}' raised: {source}")]
    Predicate {
        /// Name of the failing rule
        rule: String,
        /// Raised error value
        source: Reason,
    },

    /// Predicate panicked with a non-error value (surfaced in debug mode)
    #[error("Rule '{rule}' panicked: {message}")]
    Panicked {
        /// Name of the failing rule
        rule: String,
        /// Panic payload rendered as text
        message: String,
    },

    /// Input schema could not be compiled
    #[error("Invalid input schema: {0}")]
    InvalidSchema(String),

    /// Shield settings could not be loaded
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error raised by the protected operation itself
    #[error("Operation failed: {0}")]
    External(Reason),

    /// Access denied
    #[error("{0}")]
    Denied(Reason),
}

/// Result type for rule evaluation
pub type Result<T> = std::result::Result<T, ShieldError>;
