//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid group field: {0} (allowed: category, entity, extension, media_type, deprecated)")]
    InvalidGroupField(String),

    #[error("invalid bookmark: {0}")]
    InvalidBookmark(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
