//! Background alert loop.
//!
//! Every iteration re-reads `alerts.env`, so settings saved from the UI take
//! effect on the next tick without a restart. Progress is written both to
//! tracing and to the operator-facing `alerts.log`.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use opsdeck_core::{Layout, humanize_error};

use crate::channels::Notifier;
use crate::config::AlertConfig;
use crate::dispatch::{compose_message, decide};
use crate::error::AlertResult;
use crate::evaluator::{HealthObserver, assess};
use crate::state::AlertState;

/// Append one timestamped line to `alerts.log`. Failures are ignored.
pub fn append_alert_log(layout: &Layout, line: &str) {
    if layout.ensure_runtime_dir().is_err() {
        return;
    }
    let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
    let entry = format!("[{ts}] {}\n", line.trim_end_matches('\n'));
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&layout.alerts_log)
        .and_then(|mut f| f.write_all(entry.as_bytes()));
    if let Err(e) = written {
        debug!(error = %e, "cannot append alerts log");
    }
}

pub struct AlertDaemon {
    layout: Layout,
    observer: Arc<dyn HealthObserver>,
    client: reqwest::Client,
}

impl AlertDaemon {
    pub fn new(layout: Layout, observer: Arc<dyn HealthObserver>, client: reqwest::Client) -> Self {
        Self {
            layout,
            observer,
            client,
        }
    }

    /// Run until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("alert daemon started");
        append_alert_log(&self.layout, "alert daemon started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let pause = self.tick().await;
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("alert daemon stopped");
        append_alert_log(&self.layout, "alert daemon stopped");
    }

    /// One iteration. Returns how long to sleep before the next one.
    pub async fn tick(&self) -> Duration {
        let config = AlertConfig::load(&self.layout);

        if !config.enabled {
            return Duration::from_secs(config.interval_s.max(10));
        }
        let notifier = Notifier::from_config(&config, self.client.clone());
        if !notifier.has_channels() {
            warn!("alerts enabled but no channel configured");
            append_alert_log(&self.layout, "alerts enabled but no channel configured (alerts.env)");
            return Duration::from_secs(config.interval_s.max(30));
        }
        if config.silence().active_now() {
            debug!("alert silence window active");
            return Duration::from_secs(config.interval_s.max(20));
        }

        if let Err(e) = self.evaluate_and_send(&config, &notifier).await {
            let text = humanize_error(&e.to_string());
            warn!(error = %e, "alert iteration failed");
            append_alert_log(&self.layout, &format!("alert daemon error: {text}"));
        }

        let next = AlertConfig::from_env(&opsdeck_core::read_env_file(&self.layout.alerts_env));
        Duration::from_secs(next.interval_s)
    }

    async fn evaluate_and_send(&self, config: &AlertConfig, notifier: &Notifier) -> AlertResult<()> {
        let mut state = AlertState::load(&self.layout.alerts_state);
        let observation = self.observer.observe().await;
        let assessment = assess(&observation, config.include_setup, &mut state.seen);

        let now = Local::now();
        let now_ts = now.timestamp();
        let decision = decide(
            &state,
            assessment.level,
            &assessment.signature,
            now_ts,
            config.repeat_secs(),
            config.send_recovery,
        );

        if decision.send {
            let message = compose_message(&assessment, decision.recovery, &now);
            let report = notifier.send_all(&message).await;
            let text = report.text();
            state.record_send(now_ts, report.ok, &text);
            if report.ok {
                info!(level = assessment.level.as_str(), signature = %assessment.signature, "alert sent");
                append_alert_log(&self.layout, &format!("sent:\n{text}"));
            } else {
                warn!(level = assessment.level.as_str(), "alert send failed");
                append_alert_log(&self.layout, &format!("send failed:\n{text}"));
            }
        }

        state.last_level = assessment.level;
        state.last_signature = assessment.signature;
        state.save(&self.layout.alerts_state)
    }
}
