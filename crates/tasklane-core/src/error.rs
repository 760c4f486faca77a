//! Error types for tasklane-core

use thiserror::Error;

/// Result type alias using tasklane-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tasklane-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A cloud operation needs a signed-in, non-anonymous user
    #[error("Not authenticated: a signed-in, non-anonymous user is required")]
    NotAuthenticated,

    /// Repository used before `initialize()` succeeded
    #[error("Repository not initialized: {0}")]
    NotInitialized(&'static str),

    /// No record with the given id
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record with the given id already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Local storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Cloud API rejected the request
    #[error("Cloud API error: {0}")]
    Api(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication client error
    #[error(transparent)]
    Auth(#[from] crate::auth::AuthError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error reports a missing record.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether retrying the same operation later may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Http(_) | Self::Api(_) | Self::LibSql(_) | Self::Io(_)
        )
    }
}
