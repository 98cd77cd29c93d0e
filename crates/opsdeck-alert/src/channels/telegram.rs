//! Telegram Bot API `sendMessage`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{ALERT_USER_AGENT, AlertMessage, NotifyChannel, check_status};
use crate::error::ChannelError;

const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramChannel {
    bot_token: String,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, chat_id: &str, client: reqwest::Client) -> Self {
        Self {
            bot_token: bot_token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
            api_base: API_BASE.to_string(),
            client,
        }
    }

    /// Point at a different Bot API host (self-hosted or test server).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotifyChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "Telegram"
    }

    fn enabled(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        if !self.enabled() {
            return Err(ChannelError::NotConfigured("ALERT_TG_BOT_TOKEN / ALERT_TG_CHAT_ID".into()));
        }
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: format!("{}\n{}", message.title.trim(), message.body.trim()).trim().to_string(),
            disable_web_page_preview: true,
        };
        let response = self
            .client
            .post(self.endpoint())
            .header(reqwest::header::USER_AGENT, ALERT_USER_AGENT)
            .json(&payload)
            .timeout(Duration::from_secs(8))
            .send()
            .await?;
        check_status(response)
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    disable_web_page_preview: bool,
}
