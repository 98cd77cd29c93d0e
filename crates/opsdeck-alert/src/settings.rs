//! Alert settings as seen and edited from the console UI.
//!
//! Credentials never leave the process in plain text: the view carries a
//! `configured` flag and a masked rendering per secret key, and a save only
//! touches a secret when a new non-empty value is given or it is explicitly
//! cleared.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use opsdeck_core::bootstrap::ensure_alerts_env_file;
use opsdeck_core::{Layout, OpsReply, env_bool, env_int, parse_hhmm, read_env_file, upsert_env_key};

use crate::channels::bark::{looks_like_bark_key, normalize_bark_url_prefix};
use crate::config::*;

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Serialize)]
pub struct AlertLinks {
    pub wecom_bot: &'static str,
    pub telegram_botfather: &'static str,
    pub telegram_api: &'static str,
    pub bark: &'static str,
}

const LINKS: AlertLinks = AlertLinks {
    wecom_bot: "https://developer.work.weixin.qq.com/document/path/91770",
    telegram_botfather: "https://t.me/BotFather",
    telegram_api: "https://core.telegram.org/bots/api",
    bark: "https://github.com/Finb/Bark",
};

/// `GET /api/alerts/config` payload.
#[derive(Debug, Clone, Serialize)]
pub struct AlertConfigView {
    pub ok: bool,
    pub env_file: String,
    pub values: BTreeMap<String, String>,
    pub configured: BTreeMap<String, bool>,
    pub masked: BTreeMap<String, String>,
    pub links: AlertLinks,
}

/// `POST /api/alerts/config` body. Values may be strings, numbers or
/// booleans; `clear` flags use the same loose truthiness.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SaveRequest {
    pub values: BTreeMap<String, Value>,
    pub clear: BTreeMap<String, Value>,
}

impl SaveRequest {
    /// Parse a raw request body. Anything but a JSON object with object
    /// `values`/`clear` members is rejected with a failure reply.
    pub fn from_body(body: &[u8]) -> Result<Self, OpsReply> {
        let invalid = |detail: String| {
            OpsReply::failure("Invalid request body (expected a JSON object)").with_detail(detail)
        };
        let value: Value = serde_json::from_slice(body).map_err(|e| invalid(e.to_string()))?;
        if !value.is_object() {
            return Err(invalid(format!("got {value}")));
        }
        serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
    }
}

pub fn config_view(layout: &Layout) -> AlertConfigView {
    if let Err(e) = ensure_alerts_env_file(layout) {
        tracing::warn!(error = %e, "cannot create alerts env file");
    }
    let env = read_env_file(&layout.alerts_env);
    let get = |k: &str| env.get(k).map(|v| v.trim().to_string()).unwrap_or_default();
    let or = |k: &str, default: &str| {
        let v = get(k);
        if v.is_empty() { default.to_string() } else { v }
    };

    let mut values = BTreeMap::new();
    values.insert(KEY_ENABLED.to_string(), or(KEY_ENABLED, "0"));
    values.insert(KEY_INTERVAL_S.to_string(), or(KEY_INTERVAL_S, "30"));
    values.insert(KEY_REPEAT_MINUTES.to_string(), or(KEY_REPEAT_MINUTES, "30"));
    values.insert(KEY_SEND_RECOVERY.to_string(), or(KEY_SEND_RECOVERY, "1"));
    values.insert(KEY_INCLUDE_SETUP.to_string(), or(KEY_INCLUDE_SETUP, "0"));
    values.insert(KEY_SILENCE_START.to_string(), get(KEY_SILENCE_START));
    values.insert(KEY_SILENCE_END.to_string(), get(KEY_SILENCE_END));

    let mut configured = BTreeMap::new();
    let mut masked = BTreeMap::new();
    for key in SECRET_KEYS {
        let raw = get(key);
        values.insert(key.to_string(), String::new());
        configured.insert(key.to_string(), !raw.is_empty());
        masked.insert(key.to_string(), mask_secret(&raw));
    }

    AlertConfigView {
        ok: true,
        env_file: layout.alerts_env.display().to_string(),
        values,
        configured,
        masked,
        links: LINKS,
    }
}

/// Keep `head` leading and `tail` trailing characters around an ellipsis.
/// Short values reveal at most two characters on each side.
pub fn mask_str(value: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = value.trim().chars().collect();
    let n = chars.len();
    let slice = |a: usize, b: usize| chars[a..b].iter().collect::<String>();
    if n == 0 {
        return String::new();
    }
    if n <= head + tail + 3 {
        if n <= 4 {
            return format!("{}{ELLIPSIS}", slice(0, 1));
        }
        return format!("{}{ELLIPSIS}{}", slice(0, 2), slice(n - 2, n));
    }
    format!("{}{ELLIPSIS}{}", slice(0, head), slice(n - tail, n))
}

/// Readable but safe rendering of a credential.
///
/// URL credentials keep scheme and host and mask only the part that acts
/// as the key (Bark device key, WeCom `key=` parameter).
pub fn mask_secret(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let Ok(url) = Url::parse(raw) else {
        return mask_str(raw, 10, 4);
    };
    let Some(host) = url.host_str().map(str::to_string) else {
        return mask_str(raw, 10, 4);
    };
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.clone(),
    };
    let scheme = url.scheme();
    let parts: Vec<&str> = url
        .path_segments()
        .map(|segs| segs.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if host.ends_with("day.app") && !parts.is_empty() {
        return format!("{scheme}://{authority}/{}", mask_str(parts[0], 4, 4));
    }
    if parts.len() >= 2 && looks_like_bark_key(parts[1]) {
        return format!("{scheme}://{authority}/{}/{}", parts[0], mask_str(parts[1], 4, 4));
    }
    if let Some(first) = parts.first().filter(|p| looks_like_bark_key(p)) {
        return format!("{scheme}://{authority}/{}", mask_str(first, 4, 4));
    }
    if let Some((_, key)) = url.query_pairs().find(|(k, v)| k == "key" && !v.is_empty()) {
        return format!("{scheme}://{authority}{}?key={}", url.path(), mask_str(&key, 4, 4));
    }
    let mut short = format!("{scheme}://{authority}{}", url.path());
    if url.query().is_some_and(|q| !q.is_empty()) {
        short.push_str("?…");
    }
    mask_str(&short, 26, 4)
}

fn value_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn truthy(v: &Value, default: bool) -> bool {
    if v.is_null() {
        return default;
    }
    matches!(
        value_text(v).to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Validate the whole request, then write the changed keys.
pub fn save_config(layout: &Layout, request: &SaveRequest) -> OpsReply {
    if let Err(e) = ensure_alerts_env_file(layout) {
        return OpsReply::failure(format!("cannot create {}: {e}", layout.alerts_env.display()));
    }
    let current = read_env_file(&layout.alerts_env);
    let values = &request.values;
    let mut plan: Vec<(&'static str, String)> = Vec::new();

    for (key, default) in [
        (KEY_ENABLED, env_bool(&current, KEY_ENABLED, false)),
        (KEY_INCLUDE_SETUP, env_bool(&current, KEY_INCLUDE_SETUP, false)),
        (KEY_SEND_RECOVERY, env_bool(&current, KEY_SEND_RECOVERY, true)),
    ] {
        if let Some(v) = values.get(key) {
            plan.push((key, if truthy(v, default) { "1" } else { "0" }.to_string()));
        }
    }

    for (key, default, (min, max)) in [
        (KEY_INTERVAL_S, 30, INTERVAL_RANGE),
        (KEY_REPEAT_MINUTES, 30, REPEAT_RANGE),
    ] {
        if let Some(v) = values.get(key) {
            let n = value_text(v)
                .parse::<i64>()
                .unwrap_or_else(|_| env_int(&current, key, default, min, max));
            plan.push((key, n.clamp(min, max).to_string()));
        }
    }

    for key in [KEY_SILENCE_START, KEY_SILENCE_END] {
        if let Some(v) = values.get(key) {
            let s = value_text(v);
            if !s.is_empty() && parse_hhmm(&s).is_none() {
                return OpsReply::failure(format!("invalid silence time for {key} (expected HH:MM, e.g. 23:00)"));
            }
            plan.push((key, s));
        }
    }

    for key in SECRET_KEYS.iter().copied() {
        if request.clear.get(key).is_some_and(|v| truthy(v, false)) {
            plan.push((key, String::new()));
            continue;
        }
        let Some(s) = values.get(key).map(value_text).filter(|s| !s.is_empty()) else {
            continue;
        };
        let low = s.to_ascii_lowercase();
        if key == KEY_WECOM_WEBHOOK && (low.contains("api.day.app") || low.contains("day.app/")) {
            return OpsReply::failure(
                "That looks like a Bark URL in the WeCom webhook field; put it under Bark URL instead.",
            );
        }
        if key == KEY_BARK_URL {
            if low.contains("qyapi.weixin.qq.com") || low.contains("work.weixin.qq.com") {
                return OpsReply::failure(
                    "That looks like a WeCom webhook in the Bark URL field; put it under WeCom webhook instead.",
                );
            }
            plan.push((key, normalize_bark_url_prefix(&s)));
        } else {
            plan.push((key, s));
        }
    }

    let changed: Vec<&str> = plan
        .iter()
        .filter(|(key, value)| upsert_env_key(&layout.alerts_env, key, value, None))
        .map(|(key, _)| *key)
        .collect();

    let channels = AlertConfig::from_env(&read_env_file(&layout.alerts_env)).channels();
    let message = if changed.is_empty() {
        "No changes".to_string()
    } else {
        format!("Saved ({} changed)", changed.len())
    };
    let mut detail = vec![
        "== Save result ==".to_string(),
        message.clone(),
        String::new(),
        format!("Configured channels: {}", channels.describe()),
    ];
    if !changed.is_empty() {
        detail.push(String::new());
        detail.push("Changed:".into());
        detail.extend(changed.iter().map(|k| format!("- {k}")));
    }
    detail.push(String::new());
    detail.push(format!("Config file: {}", layout.alerts_env.display()));

    tracing::info!(changed = changed.len(), "alert settings saved");
    OpsReply::success(message).with_detail(detail.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout() -> (tempfile::TempDir, Layout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        (dir, layout)
    }

    fn request(v: Value) -> SaveRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn mask_short_and_long() {
        assert_eq!(mask_str("", 6, 4), "");
        assert_eq!(mask_str("abc", 6, 4), "a…");
        assert_eq!(mask_str("abcdefgh", 6, 4), "ab…gh");
        assert_eq!(mask_str("abcdefghijklmnopq", 6, 4), "abcdef…nopq");
    }

    #[test]
    fn mask_url_secrets() {
        assert_eq!(mask_secret("https://api.day.app/AbCdEf123456"), "https://api.day.app/AbCd…3456");
        assert_eq!(
            mask_secret("https://push.example.com/bark/AbCdEf123456"),
            "https://push.example.com/bark/AbCd…3456"
        );
        assert_eq!(
            mask_secret("https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=0123456789abcdef"),
            "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=0123…cdef"
        );
        assert_eq!(mask_secret("123456789:AAEabcdefghijklmno"), "123456789:…lmno");
    }

    #[test]
    fn view_hides_secrets() {
        let (_d, layout) = layout();
        ensure_alerts_env_file(&layout).unwrap();
        upsert_env_key(&layout.alerts_env, KEY_BARK_URL, "https://api.day.app/AbCdEf123456", None);
        let view = config_view(&layout);
        assert_eq!(view.values[KEY_BARK_URL], "");
        assert!(view.configured[KEY_BARK_URL]);
        assert!(!view.configured[KEY_TG_BOT_TOKEN]);
        assert_eq!(view.masked[KEY_BARK_URL], "https://api.day.app/AbCd…3456");
        assert_eq!(view.values[KEY_INTERVAL_S], "30");
    }

    #[test]
    fn save_clamps_and_normalizes() {
        let (_d, layout) = layout();
        let reply = save_config(
            &layout,
            &request(json!({
                "values": {
                    "ALERT_ENABLED": true,
                    "ALERT_INTERVAL_S": "5",
                    "ALERT_REPEAT_MINUTES": 99999,
                    "ALERT_BARK_URL": "https://api.day.app/AbCdEf123456/hello/world",
                    "ALERT_TG_BOT_TOKEN": ""
                }
            })),
        );
        assert!(reply.ok, "{reply:?}");
        assert_eq!(reply.message, "Saved (4 changed)");
        assert!(reply.detail.contains("Configured channels: Bark"));
        let env = read_env_file(&layout.alerts_env);
        assert_eq!(env[KEY_ENABLED], "1");
        assert_eq!(env[KEY_INTERVAL_S], "10");
        assert_eq!(env[KEY_REPEAT_MINUTES], "1440");
        assert_eq!(env[KEY_BARK_URL], "https://api.day.app/AbCdEf123456");

        let again = save_config(&layout, &request(json!({"values": {"ALERT_ENABLED": "yes"}})));
        assert_eq!(again.message, "No changes");
    }

    #[test]
    fn invalid_silence_writes_nothing() {
        let (_d, layout) = layout();
        let before = {
            ensure_alerts_env_file(&layout).unwrap();
            std::fs::read_to_string(&layout.alerts_env).unwrap()
        };
        let reply = save_config(
            &layout,
            &request(json!({"values": {"ALERT_ENABLED": "1", "ALERT_SILENCE_START": "25:99"}})),
        );
        assert!(!reply.ok);
        assert!(reply.message.contains("ALERT_SILENCE_START"));
        assert_eq!(std::fs::read_to_string(&layout.alerts_env).unwrap(), before);
    }

    #[test]
    fn cross_pasted_urls_are_rejected() {
        let (_d, layout) = layout();
        let r = save_config(
            &layout,
            &request(json!({"values": {"ALERT_WECOM_WEBHOOK": "https://api.day.app/AbCdEf123456"}})),
        );
        assert!(!r.ok);
        let r = save_config(
            &layout,
            &request(json!({"values": {"ALERT_BARK_URL": "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=x"}})),
        );
        assert!(!r.ok);
    }

    #[test]
    fn clear_removes_secret() {
        let (_d, layout) = layout();
        save_config(&layout, &request(json!({"values": {"ALERT_TG_CHAT_ID": "42"}})));
        let r = save_config(&layout, &request(json!({"clear": {"ALERT_TG_CHAT_ID": true}})));
        assert_eq!(r.message, "Saved (1 changed)");
        assert_eq!(read_env_file(&layout.alerts_env)[KEY_TG_CHAT_ID], "");
    }

    #[test]
    fn clear_flags_are_loose() {
        let (_d, layout) = layout();
        save_config(&layout, &request(json!({"values": {"ALERT_TG_CHAT_ID": "42", "ALERT_BARK_URL": "AbCdEf123456"}})));
        let r = save_config(
            &layout,
            &request(json!({
                "values": {"ALERT_INTERVAL_S": "60"},
                "clear": {"ALERT_BARK_URL": 1, "ALERT_TG_CHAT_ID": "no"}
            })),
        );
        assert_eq!(r.message, "Saved (2 changed)", "{}", r.detail);
        let env = read_env_file(&layout.alerts_env);
        assert_eq!(env[KEY_BARK_URL], "");
        assert_eq!(env[KEY_TG_CHAT_ID], "42");
        assert_eq!(env[KEY_INTERVAL_S], "60");
    }

    #[test]
    fn body_must_be_an_object() {
        for body in ["{not json", "", "[1,2]", "\"x\"", "{\"values\": 5}"] {
            let reply = SaveRequest::from_body(body.as_bytes()).unwrap_err();
            assert!(!reply.ok, "body {body:?}");
            assert!(reply.message.starts_with("Invalid request body"));
        }
        let parsed = SaveRequest::from_body(br#"{"values": {"ALERT_ENABLED": true}, "clear": {"ALERT_BARK_URL": 1}}"#).unwrap();
        assert_eq!(parsed.values["ALERT_ENABLED"], json!(true));
        assert_eq!(parsed.clear["ALERT_BARK_URL"], json!(1));
        assert!(SaveRequest::from_body(b"{}").is_ok());
    }
}
