//! Metadata store error types.

use r2index_core::RemoteTuple;
use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: a record already exists for remote tuple {0}")]
    Conflict(RemoteTuple),

    #[error("invalid group field: {0}")]
    InvalidGroupField(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error classification for the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    InvalidGroupField,
    InvalidInput,
    TransientStore,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::InvalidGroupField => "invalid_group_field",
            Self::InvalidInput => "invalid_input",
            Self::TransientStore => "transient_store",
        }
    }
}

impl MetadataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidGroupField(_) => ErrorKind::InvalidGroupField,
            Self::Invalid(_) => ErrorKind::InvalidInput,
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => ErrorKind::TransientStore,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    ///
    /// Only store failures qualify: every other error would repeat verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<r2index_core::Error> for MetadataError {
    fn from(e: r2index_core::Error) -> Self {
        match e {
            r2index_core::Error::InvalidGroupField(field) => Self::InvalidGroupField(field),
            r2index_core::Error::Io(e) => Self::Internal(e.to_string()),
            other => Self::Invalid(other.to_string()),
        }
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
