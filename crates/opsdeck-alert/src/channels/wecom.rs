//! WeCom (企业微信) group robot webhook.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{ALERT_USER_AGENT, AlertMessage, NotifyChannel, check_status};
use crate::error::ChannelError;

pub struct WecomChannel {
    webhook_url: String,
    client: reqwest::Client,
}

impl WecomChannel {
    pub fn new(webhook_url: &str, client: reqwest::Client) -> Self {
        Self {
            webhook_url: webhook_url.trim().to_string(),
            client,
        }
    }

    fn payload(message: &AlertMessage) -> WecomPayload {
        WecomPayload {
            msgtype: "markdown",
            markdown: WecomMarkdown {
                content: format!("**{}**\n\n{}", message.title.trim(), message.body.trim())
                    .trim()
                    .to_string(),
            },
        }
    }
}

#[async_trait]
impl NotifyChannel for WecomChannel {
    fn name(&self) -> &'static str {
        "WeCom"
    }

    fn enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        if self.webhook_url.is_empty() {
            return Err(ChannelError::NotConfigured("ALERT_WECOM_WEBHOOK".into()));
        }
        let response = self
            .client
            .post(&self.webhook_url)
            .header(reqwest::header::USER_AGENT, ALERT_USER_AGENT)
            .json(&Self::payload(message))
            .timeout(Duration::from_secs(6))
            .send()
            .await?;
        check_status(response)
    }
}

#[derive(Debug, Serialize)]
struct WecomPayload {
    msgtype: &'static str,
    markdown: WecomMarkdown,
}

#[derive(Debug, Serialize)]
struct WecomMarkdown {
    content: String,
}
