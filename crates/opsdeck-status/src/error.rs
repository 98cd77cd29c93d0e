//! Error types for snapshot collection.

use thiserror::Error;

pub type StatusResult<T> = Result<T, StatusError>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("snapshot collection failed: {0}")]
    Collect(String),

    #[error("status refresh panicked: {0}")]
    Panicked(String),

    #[error("snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
