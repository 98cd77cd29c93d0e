//! Error types for alert delivery and the daemon loop.

use thiserror::Error;

/// Result type alias for alert internals.
pub type AlertResult<T> = Result<T, AlertError>;

/// Errors raised by a single notification channel. The dispatcher turns
/// each into one report line; they never abort a fan-out.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{}", describe_http(.0))]
    Http(#[from] reqwest::Error),

    #[error("channel not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn describe_http(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return opsdeck_core::humanize_error("timed out");
    }
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    opsdeck_core::humanize_error(&text)
}

/// Errors inside one daemon iteration. Logged, then the loop continues.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] opsdeck_core::CoreError),
}
