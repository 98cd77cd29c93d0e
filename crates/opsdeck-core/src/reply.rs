//! Uniform `{ok, message, detail}` result returned by actions and config writes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsReply {
    pub ok: bool,
    /// Short, operator-facing text.
    pub message: String,
    /// Raw tool output, kept for copy/paste.
    #[serde(default)]
    pub detail: String,
}

impl OpsReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            detail: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            detail: String::new(),
        }
    }

    pub fn new(ok: bool, message: impl Into<String>) -> Self {
        Self {
            ok,
            message: message.into(),
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Join two sequential steps (stop then start) into one reply.
    pub fn chain(self, next: OpsReply) -> OpsReply {
        let join = |a: &str, b: &str| {
            [a.trim(), b.trim()]
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        OpsReply {
            ok: self.ok && next.ok,
            message: join(&self.message, &next.message),
            detail: join(&self.detail, &next.detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_requires_both_ok() {
        let r = OpsReply::success("stopped").chain(OpsReply::failure("start failed"));
        assert!(!r.ok);
        assert_eq!(r.message, "stopped\n\nstart failed");
        assert_eq!(r.detail, "");
    }

    #[test]
    fn detail_defaults_when_missing() {
        let r: OpsReply = serde_json::from_str(r#"{"ok":true,"message":"m"}"#).unwrap();
        assert_eq!(r, OpsReply::success("m"));
    }
}
