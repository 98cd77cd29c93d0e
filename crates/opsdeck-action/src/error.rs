//! Error types for action internals.
//!
//! Actions never surface these to HTTP callers directly; the executor
//! turns them into a failed [`OpsReply`](opsdeck_core::OpsReply) whose
//! detail keeps the raw text.

use thiserror::Error;

use opsdeck_core::CoreError;
use opsdeck_probe::ProbeError;

pub type ActionResult<T> = Result<T, ActionError>;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    /// Raw operator text, including the innermost cause.
    pub fn raw_text(&self) -> String {
        match self {
            ActionError::Probe(e) => e.chain_text(),
            ActionError::Spawn { program, source } => {
                format!("failed to start {program}: {source}")
            }
            other => other.to_string(),
        }
    }
}
