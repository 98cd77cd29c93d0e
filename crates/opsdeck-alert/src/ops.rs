//! Operator actions on alerting: toggle and test delivery.

use chrono::Local;
use tracing::{info, warn};

use opsdeck_core::bootstrap::ensure_alerts_env_file;
use opsdeck_core::{HomeSettings, Layout, OpsReply, read_env_file, upsert_env_key};

use crate::channels::Notifier;
use crate::config::{AlertConfig, KEY_ENABLED};
use crate::dispatch::compose_test_message;
use crate::state::AlertState;

pub fn set_enabled(layout: &Layout, enabled: bool) -> OpsReply {
    if let Err(e) = ensure_alerts_env_file(layout) {
        return OpsReply::failure(format!("cannot create {}: {e}", layout.alerts_env.display()));
    }
    let changed = upsert_env_key(&layout.alerts_env, KEY_ENABLED, if enabled { "1" } else { "0" }, None);
    info!(enabled, changed, "alerting toggled");
    let verb = if enabled { "enabled" } else { "disabled" };
    if changed {
        OpsReply::success(format!("Alerts {verb}"))
    } else {
        OpsReply::success(format!("Alerts {verb} (already)"))
    }
}

/// Send a test message to every configured channel, independent of health.
pub async fn send_test(layout: &Layout, client: reqwest::Client) -> OpsReply {
    let config = AlertConfig::load(layout);
    let settings = HomeSettings::from_env(&read_env_file(&layout.home_env));
    let message = compose_test_message(
        &settings.frontend_url(),
        &settings.public_api_health_url(),
        &Local::now(),
    );

    let report = Notifier::from_config(&config, client).send_all(&message).await;
    let text = report.text();

    let mut state = AlertState::load(&layout.alerts_state);
    state.record_send(Local::now().timestamp(), report.ok, &text);
    if let Err(e) = state.save(&layout.alerts_state) {
        warn!(error = %e, "cannot persist alert state after test send");
    }

    let detail = [
        "== Send result ==",
        text.as_str(),
        "",
        "== Message ==",
        message.title.as_str(),
        "",
        message.body.as_str(),
    ]
    .join("\n");
    let reply = if report.ok {
        OpsReply::success("Test message sent")
    } else if text.is_empty() {
        OpsReply::failure("Test send failed")
    } else {
        OpsReply::failure(text)
    };
    reply.with_detail(detail.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_reports_noop() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        assert_eq!(set_enabled(&layout, true).message, "Alerts enabled");
        assert_eq!(set_enabled(&layout, true).message, "Alerts enabled (already)");
        assert!(AlertConfig::load(&layout).enabled);
        assert_eq!(set_enabled(&layout, false).message, "Alerts disabled");
    }

    #[tokio::test]
    async fn test_send_without_channels_fails_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let reply = send_test(&layout, reqwest::Client::new()).await;
        assert!(!reply.ok);
        assert!(reply.message.contains("no alert channel configured"));
        assert!(reply.detail.contains("opsdeck: test alert"));
        let st = AlertState::load(&layout.alerts_state);
        assert!(!st.last_send_ok);
        assert!(st.last_sent_ts > 0);
    }
}
