//! Error types for business rule execution

use thiserror::Error;

/// Business rule errors
///
/// These never leave the evaluator: any of them turns the rule result into
/// `false` and is logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Rule kind not registered: {0}")]
    UnknownRule(String),

    #[error("Missing parameter: {0}")]
    MissingParam(String),

    #[error("Rule execution failed: {0}")]
    ExecutionError(String),

    #[error("Rule panicked: {0}")]
    Panicked(String),
}

/// Result type for rule operations
pub type Result<T> = std::result::Result<T, RuleError>;
