//! Persisted alert bookkeeping (`alerts_state.json`).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AlertResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Ok,
    Bad,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Ok => "ok",
            Level::Bad => "bad",
        }
    }
}

/// Endpoints observed healthy at least once. Never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeenFlags {
    pub api_public_ok: bool,
    pub frontend_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertState {
    pub last_level: Level,
    pub last_signature: String,
    pub last_sent_ts: i64,
    pub last_send_ok: bool,
    pub last_send_msg: String,
    pub seen: SeenFlags,
}

impl Default for AlertState {
    fn default() -> Self {
        Self {
            last_level: Level::Ok,
            last_signature: String::new(),
            last_sent_ts: 0,
            last_send_ok: true,
            last_send_msg: String::new(),
            seen: SeenFlags::default(),
        }
    }
}

impl AlertState {
    /// Load state; a missing, empty or corrupt file yields defaults.
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = fs::read_to_string(path) else {
            return Self::default();
        };
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!(path = %path.display(), error = %e, "alert state unreadable, starting fresh");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> AlertResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs::write(path, text)?;
        Ok(())
    }

    /// Send bookkeeping for one delivery attempt.
    pub fn record_send(&mut self, now_ts: i64, ok: bool, report: &str) {
        self.last_sent_ts = now_ts;
        self.last_send_ok = ok;
        self.last_send_msg = report.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_corrupt_files_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts_state.json");
        assert_eq!(AlertState::load(&path), AlertState::default());
        fs::write(&path, "{not json").unwrap();
        assert_eq!(AlertState::load(&path), AlertState::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts_state.json");
        fs::write(&path, r#"{"last_level":"bad","seen":{"frontend_ok":true}}"#).unwrap();
        let st = AlertState::load(&path);
        assert_eq!(st.last_level, Level::Bad);
        assert!(st.seen.frontend_ok);
        assert!(!st.seen.api_public_ok);
        assert!(st.last_send_ok);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt").join("alerts_state.json");
        let mut st = AlertState::default();
        st.record_send(1_700_000_000, false, "WeCom: failed (HTTP 500)");
        st.save(&path).unwrap();
        let back = AlertState::load(&path);
        assert_eq!(back.last_sent_ts, 1_700_000_000);
        assert!(!back.last_send_ok);
    }
}
