//! Common error types for VWLib

use thiserror::Error;

/// Common result type for VWLib operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across VWLib crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A record with the same primary key already exists
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
