//! Alert settings read from the runtime `alerts.env`.

use serde::Serialize;

use opsdeck_core::bootstrap::ensure_alerts_env_file;
use opsdeck_core::{EnvMap, Layout, env_bool, env_int, read_env_file};

use crate::silence::SilenceWindow;

pub const KEY_ENABLED: &str = "ALERT_ENABLED";
pub const KEY_INTERVAL_S: &str = "ALERT_INTERVAL_S";
pub const KEY_REPEAT_MINUTES: &str = "ALERT_REPEAT_MINUTES";
pub const KEY_SEND_RECOVERY: &str = "ALERT_SEND_RECOVERY";
pub const KEY_INCLUDE_SETUP: &str = "ALERT_INCLUDE_SETUP";
pub const KEY_SILENCE_START: &str = "ALERT_SILENCE_START";
pub const KEY_SILENCE_END: &str = "ALERT_SILENCE_END";
pub const KEY_WECOM_WEBHOOK: &str = "ALERT_WECOM_WEBHOOK";
pub const KEY_TG_BOT_TOKEN: &str = "ALERT_TG_BOT_TOKEN";
pub const KEY_TG_CHAT_ID: &str = "ALERT_TG_CHAT_ID";
pub const KEY_BARK_URL: &str = "ALERT_BARK_URL";

/// Credential keys; never echoed back in plain text.
pub const SECRET_KEYS: &[&str] = &[KEY_WECOM_WEBHOOK, KEY_TG_BOT_TOKEN, KEY_TG_CHAT_ID, KEY_BARK_URL];

pub const INTERVAL_RANGE: (i64, i64) = (10, 600);
pub const REPEAT_RANGE: (i64, i64) = (5, 1440);

/// Which channels have credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelFlags {
    pub wecom: bool,
    pub telegram: bool,
    pub bark: bool,
}

impl ChannelFlags {
    pub fn any(&self) -> bool {
        self.wecom || self.telegram || self.bark
    }

    /// Display names of configured channels, or `none`.
    pub fn describe(&self) -> String {
        let names: Vec<&str> = [
            (self.wecom, "WeCom"),
            (self.telegram, "Telegram"),
            (self.bark, "Bark"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if names.is_empty() { "none".into() } else { names.join(", ") }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertConfig {
    pub enabled: bool,
    pub interval_s: u64,
    pub repeat_minutes: u64,
    pub send_recovery: bool,
    pub include_setup: bool,
    pub silence_start: String,
    pub silence_end: String,
    pub wecom_webhook: String,
    pub tg_bot_token: String,
    pub tg_chat_id: String,
    pub bark_url: String,
}

fn trimmed(env: &EnvMap, key: &str) -> String {
    env.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
}

impl AlertConfig {
    pub fn from_env(env: &EnvMap) -> Self {
        Self {
            enabled: env_bool(env, KEY_ENABLED, false),
            interval_s: env_int(env, KEY_INTERVAL_S, 30, INTERVAL_RANGE.0, INTERVAL_RANGE.1) as u64,
            repeat_minutes: env_int(env, KEY_REPEAT_MINUTES, 30, REPEAT_RANGE.0, REPEAT_RANGE.1) as u64,
            send_recovery: env_bool(env, KEY_SEND_RECOVERY, true),
            include_setup: env_bool(env, KEY_INCLUDE_SETUP, false),
            silence_start: trimmed(env, KEY_SILENCE_START),
            silence_end: trimmed(env, KEY_SILENCE_END),
            wecom_webhook: trimmed(env, KEY_WECOM_WEBHOOK),
            tg_bot_token: trimmed(env, KEY_TG_BOT_TOKEN),
            tg_chat_id: trimmed(env, KEY_TG_CHAT_ID),
            bark_url: trimmed(env, KEY_BARK_URL),
        }
    }

    /// Read `alerts.env`, creating the commented default first if needed.
    pub fn load(layout: &Layout) -> Self {
        if let Err(e) = ensure_alerts_env_file(layout) {
            tracing::warn!(error = %e, "cannot create alerts env file");
        }
        Self::from_env(&read_env_file(&layout.alerts_env))
    }

    pub fn channels(&self) -> ChannelFlags {
        ChannelFlags {
            wecom: !self.wecom_webhook.is_empty(),
            telegram: !self.tg_bot_token.is_empty() && !self.tg_chat_id.is_empty(),
            bark: !self.bark_url.is_empty(),
        }
    }

    pub fn silence(&self) -> SilenceWindow {
        SilenceWindow::parse(&self.silence_start, &self.silence_end)
    }

    pub fn repeat_secs(&self) -> i64 {
        self.repeat_minutes as i64 * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_core::env::parse_env;

    #[test]
    fn defaults_from_empty_env() {
        let cfg = AlertConfig::from_env(&EnvMap::new());
        assert!(!cfg.enabled);
        assert_eq!(cfg.interval_s, 30);
        assert_eq!(cfg.repeat_minutes, 30);
        assert!(cfg.send_recovery);
        assert!(!cfg.include_setup);
        assert!(!cfg.channels().any());
        assert_eq!(cfg.channels().describe(), "none");
    }

    #[test]
    fn clamps_and_channel_detection() {
        let env = parse_env(
            "ALERT_ENABLED=yes\nALERT_INTERVAL_S=1\nALERT_REPEAT_MINUTES=99999\n\
             ALERT_TG_BOT_TOKEN=123:abc\nALERT_TG_CHAT_ID=\nALERT_BARK_URL=https://api.day.app/k\n",
        );
        let cfg = AlertConfig::from_env(&env);
        assert!(cfg.enabled);
        assert_eq!(cfg.interval_s, 10);
        assert_eq!(cfg.repeat_minutes, 1440);
        let ch = cfg.channels();
        assert!(!ch.telegram);
        assert!(ch.bark);
        assert_eq!(ch.describe(), "Bark");
    }

    #[test]
    fn load_bootstraps_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let cfg = AlertConfig::load(&layout);
        assert!(layout.alerts_env.exists());
        assert!(!cfg.enabled);
    }
}
