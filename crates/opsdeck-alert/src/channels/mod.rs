//! Notification channels and the fan-out dispatcher.

pub mod bark;
pub mod telegram;
pub mod wecom;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AlertConfig;
use crate::error::ChannelError;

pub use bark::{BarkChannel, normalize_bark_url_prefix};
pub use telegram::TelegramChannel;
pub use wecom::WecomChannel;

pub(crate) const ALERT_USER_AGENT: &str = "opsdeck-alert/1.0";

/// One notification, already rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Name used in logs and report lines.
    fn name(&self) -> &'static str;

    /// Whether credentials are present.
    fn enabled(&self) -> bool;

    async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError>;
}

/// Result of a fan-out: ok when any channel delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub ok: bool,
    pub lines: Vec<String>,
}

impl SendReport {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Sends one message to every enabled channel, one after another.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
}

impl Notifier {
    /// Channels for the current `alerts.env`.
    pub fn from_config(config: &AlertConfig, client: reqwest::Client) -> Self {
        let channels: Vec<Arc<dyn NotifyChannel>> = vec![
            Arc::new(WecomChannel::new(&config.wecom_webhook, client.clone())),
            Arc::new(TelegramChannel::new(&config.tg_bot_token, &config.tg_chat_id, client.clone())),
            Arc::new(BarkChannel::new(&config.bark_url, client)),
        ];
        Self::with_channels(channels)
    }

    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self { channels }
    }

    pub fn has_channels(&self) -> bool {
        self.channels.iter().any(|c| c.enabled())
    }

    /// Deliver to every enabled channel. A failing channel only adds a
    /// report line.
    pub async fn send_all(&self, message: &AlertMessage) -> SendReport {
        let mut ok_any = false;
        let mut lines = Vec::new();

        for channel in self.channels.iter().filter(|c| c.enabled()) {
            let name = channel.name();
            match channel.send(message).await {
                Ok(()) => {
                    debug!(channel = name, "alert delivered");
                    ok_any = true;
                    lines.push(format!("{name}: sent"));
                }
                Err(e) => {
                    warn!(channel = name, error = %e, "alert delivery failed");
                    lines.push(format!("{name}: failed ({e})"));
                }
            }
        }

        if lines.is_empty() {
            return SendReport {
                ok: false,
                lines: vec!["no alert channel configured (alerts.env)".into()],
            };
        }
        SendReport { ok: ok_any, lines }
    }
}

/// Map a non-2xx response to [`ChannelError::Status`].
pub(crate) fn check_status(response: reqwest::Response) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ChannelError::Status(status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        enabled: bool,
        ok: bool,
    }

    #[async_trait]
    impl NotifyChannel for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, _message: &AlertMessage) -> Result<(), ChannelError> {
            if self.ok { Ok(()) } else { Err(ChannelError::Status(500)) }
        }
    }

    fn msg() -> AlertMessage {
        AlertMessage {
            title: "t".into(),
            body: "b".into(),
        }
    }

    #[tokio::test]
    async fn any_success_is_ok_and_failures_are_isolated() {
        let notifier = Notifier::with_channels(vec![
            Arc::new(Fixed { name: "WeCom", enabled: true, ok: false }),
            Arc::new(Fixed { name: "Telegram", enabled: false, ok: true }),
            Arc::new(Fixed { name: "Bark", enabled: true, ok: true }),
        ]);
        let report = notifier.send_all(&msg()).await;
        assert!(report.ok);
        assert_eq!(report.lines, vec!["WeCom: failed (HTTP 500)", "Bark: sent"]);
    }

    #[tokio::test]
    async fn nothing_configured() {
        let cfg = AlertConfig::from_env(&opsdeck_core::EnvMap::new());
        let notifier = Notifier::from_config(&cfg, reqwest::Client::new());
        assert!(!notifier.has_channels());
        let report = notifier.send_all(&msg()).await;
        assert!(!report.ok);
        assert!(report.text().contains("no alert channel configured"));
    }
}
