//! Error types for probe internals.
//!
//! These never cross a probe's public boundary: every probe folds them
//! into an `ok: false` result with a humanized message.

use thiserror::Error;

/// Result type alias for probe internals.
pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0} not found in PATH")]
    NotFound(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    /// Non-zero exit; carries the merged output for the operator.
    #[error("{}", exit_text(.code, .output))]
    Exit { code: Option<i32>, output: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_text(code: &Option<i32>, output: &str) -> String {
    let output = output.trim();
    if !output.is_empty() {
        return output.to_string();
    }
    match code {
        Some(c) => format!("exit={c}"),
        None => "terminated by signal".to_string(),
    }
}

impl ProbeError {
    /// Full error chain flattened into one line, so substring-based
    /// humanization sees the innermost cause.
    pub fn chain_text(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !text.contains(&cause_text) {
                text.push_str(": ");
                text.push_str(&cause_text);
            }
            source = cause.source();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_prefers_output() {
        let e = ProbeError::Exit { code: Some(1), output: " boom \n".into() };
        assert_eq!(e.to_string(), "boom");
        let e = ProbeError::Exit { code: Some(3), output: String::new() };
        assert_eq!(e.to_string(), "exit=3");
    }

    #[test]
    fn not_found_is_humanizable() {
        let e = ProbeError::NotFound("docker".into());
        assert!(opsdeck_core::humanize_error(&e.to_string()).starts_with("Docker CLI not found"));
    }
}
