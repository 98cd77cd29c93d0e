//! Bark (iOS push) channel.
//!
//! Bark carries title and body as URL path segments, so the configured
//! value must be a bare prefix (`https://api.day.app/<key>`). Operators
//! tend to paste a full example URL instead; [`normalize_bark_url_prefix`]
//! cuts it back down.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use opsdeck_core::PRODUCT;

use super::{ALERT_USER_AGENT, AlertMessage, NotifyChannel, check_status};
use crate::error::ChannelError;

const OFFICIAL_SERVER: &str = "https://api.day.app";
const MAX_TITLE_CHARS: usize = 80;
const MAX_BODY_CHARS: usize = 1800;

pub struct BarkChannel {
    prefix: String,
    client: reqwest::Client,
}

impl BarkChannel {
    pub fn new(url: &str, client: reqwest::Client) -> Self {
        Self {
            prefix: normalize_bark_url_prefix(url),
            client,
        }
    }

    fn push_url(&self, message: &AlertMessage) -> String {
        let title: String = message.title.trim().chars().take(MAX_TITLE_CHARS).collect();
        let body: String = message.body.trim().chars().take(MAX_BODY_CHARS).collect();
        format!(
            "{}/{}/{}?group={PRODUCT}&isArchive=1",
            self.prefix,
            urlencoding::encode(&title),
            urlencoding::encode(&body),
        )
    }
}

#[async_trait]
impl NotifyChannel for BarkChannel {
    fn name(&self) -> &'static str {
        "Bark"
    }

    fn enabled(&self) -> bool {
        !self.prefix.is_empty()
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), ChannelError> {
        if self.prefix.is_empty() {
            return Err(ChannelError::NotConfigured("ALERT_BARK_URL".into()));
        }
        let response = self
            .client
            .get(self.push_url(message))
            .header(reqwest::header::USER_AGENT, ALERT_USER_AGENT)
            .timeout(Duration::from_secs(6))
            .send()
            .await?;
        check_status(response)
    }
}

/// A Bark device key: at least ten ASCII alphanumerics.
pub fn looks_like_bark_key(segment: &str) -> bool {
    let s = segment.trim();
    s.len() >= 10 && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Reduce whatever the operator pasted to a push prefix.
///
/// * bare key → official server;
/// * `*.day.app` → first path segment;
/// * self-hosted `/<base>/<key>/title/body` → first two segments;
/// * self-hosted `/<key>/title/body` → first segment;
/// * anything else keeps its path.
///
/// Query, fragment and trailing slash are always dropped.
pub fn normalize_bark_url_prefix(url: &str) -> String {
    let mut s = url.trim().to_string();
    if s.is_empty() {
        return s;
    }
    if !s.contains("://") && !s.contains('/') && looks_like_bark_key(&s) {
        return format!("{OFFICIAL_SERVER}/{s}");
    }
    if !s.contains("://") && s.to_ascii_lowercase().starts_with("api.day.app/") {
        s = format!("https://{s}");
    }

    let Ok(mut parsed) = Url::parse(&s) else {
        return s.trim_end_matches('/').to_string();
    };
    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return s.trim_end_matches('/').to_string();
    };

    let parts: Vec<String> = parsed
        .path_segments()
        .map(|segs| segs.filter(|p| !p.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    let keep: &[String] = if parts.is_empty() {
        &[]
    } else if host.ends_with("day.app") {
        &parts[..1]
    } else if parts.len() >= 4 && looks_like_bark_key(&parts[1]) {
        &parts[..2]
    } else if parts.len() >= 3 && looks_like_bark_key(&parts[0]) {
        &parts[..1]
    } else {
        &parts
    };

    let path = if keep.is_empty() {
        String::new()
    } else {
        format!("/{}", keep.join("/"))
    };
    parsed.set_path(&path);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AbCdEf123456";

    #[test]
    fn bare_key_uses_official_server() {
        assert_eq!(normalize_bark_url_prefix(KEY), format!("https://api.day.app/{KEY}"));
        assert_eq!(normalize_bark_url_prefix("short"), "short");
    }

    #[test]
    fn official_example_url_is_cut_to_key() {
        let pasted = format!("https://api.day.app/{KEY}/title/body?sound=bell#x");
        assert_eq!(normalize_bark_url_prefix(&pasted), format!("https://api.day.app/{KEY}"));
        let no_scheme = format!("api.day.app/{KEY}/hello");
        assert_eq!(normalize_bark_url_prefix(&no_scheme), format!("https://api.day.app/{KEY}"));
    }

    #[test]
    fn self_hosted_layouts() {
        assert_eq!(
            normalize_bark_url_prefix(&format!("https://push.example.com/bark/{KEY}/t/b")),
            format!("https://push.example.com/bark/{KEY}")
        );
        assert_eq!(
            normalize_bark_url_prefix(&format!("https://push.example.com/{KEY}/t/b")),
            format!("https://push.example.com/{KEY}")
        );
        assert_eq!(
            normalize_bark_url_prefix("https://push.example.com:8443/custom/path/?q=1"),
            "https://push.example.com:8443/custom/path"
        );
        assert_eq!(normalize_bark_url_prefix("https://push.example.com/"), "https://push.example.com");
    }

    #[test]
    fn push_url_escapes_segments() {
        let ch = BarkChannel::new(KEY, reqwest::Client::new());
        let msg = AlertMessage {
            title: "opsdeck: incident".into(),
            body: "API: https://api.naibao.me/api/health".into(),
        };
        let url = ch.push_url(&msg);
        assert!(url.starts_with(&format!("https://api.day.app/{KEY}/opsdeck%3A%20incident/")));
        assert!(url.contains("https%3A%2F%2Fapi.naibao.me%2Fapi%2Fhealth"));
        assert!(url.ends_with("?group=opsdeck&isArchive=1"));
    }

    #[test]
    fn long_title_is_truncated_on_char_boundary() {
        let ch = BarkChannel::new(KEY, reqwest::Client::new());
        let msg = AlertMessage {
            title: "告".repeat(200),
            body: String::new(),
        };
        let url = ch.push_url(&msg);
        let title_seg = url.split('/').nth(4).unwrap_or_default();
        assert_eq!(title_seg.matches('%').count(), 80 * 3);
    }
}
