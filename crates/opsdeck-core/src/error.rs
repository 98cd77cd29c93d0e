//! Error types for the env store and bootstrap helpers.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised inside the env store. Public helpers swallow these
/// after logging; they never reach an HTTP caller.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid env key: {0:?}")]
    InvalidKey(String),
}
