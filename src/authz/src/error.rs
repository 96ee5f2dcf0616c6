//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown item
    #[error("Item not found: {0}")]
    NotFound(String),

    /// An item with the same name already exists
    #[error("Duplicate item: {0}")]
    DuplicateItem(String),

    /// Graph shape violation (cycle, self-loop, non-role parent, duplicate edge)
    #[error("Structural error: {0}")]
    Structural(String),

    /// Revoke of a grant that does not exist
    #[error("Item '{item}' is not assigned to principal '{principal}'")]
    NotAssigned { principal: String, item: String },

    /// Persistence failure in a graph store
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[cfg(feature = "sql")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<toml::de::Error> for AuthzError {
    fn from(err: toml::de::Error) -> Self {
        AuthzError::Config(err.to_string())
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
