//! Error types for gitsync

use thiserror::Error;

/// Result type alias for gitsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gitsync operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by libgit2
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential store error
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// A named remote, branch or reference does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another network operation is already running on this repository
    #[error("Another operation is already in progress")]
    Busy,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
