//! Short operator messages for action replies.
//!
//! `message` is what the console shows at once; `detail` keeps the raw
//! tool output for copy/paste and is never shortened.

use std::sync::LazyLock;

use regex::Regex;

use opsdeck_core::{OpsReply, humanize_error};

use crate::action::Action;
use crate::stack::PORT_PREFIX;

static AUTO_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}(\d+)", regex::escape(PORT_PREFIX))).expect("static regex")
});

const GENERIC_FAILURE: &str = "Action failed (see details)";

fn pretty_service(service: &str) -> &str {
    match service {
        "backend" => "backend (API)",
        "db" => "database",
        "redis" => "cache (Redis)",
        other => other,
    }
}

fn or_default(raw: &str, fallback: &str) -> String {
    if raw.is_empty() { fallback.to_string() } else { raw.to_string() }
}

pub fn normalize(action: Action, service: &str, raw: OpsReply) -> OpsReply {
    let service = service.trim();
    let msg = raw.message.trim();
    let detail = match raw.detail.trim() {
        "" => msg.to_string(),
        d => d.to_string(),
    };

    if !raw.ok {
        let short = humanize_error(msg);
        let unreadable = short == msg && (msg.chars().count() > 240 || msg.contains('\n'));
        let message = if short.is_empty() || unreadable { GENERIC_FAILURE.to_string() } else { short };
        return OpsReply::failure(message).with_detail(detail);
    }

    let message = match action {
        Action::DockerUp => match AUTO_PORT.captures(&detail) {
            Some(c) => format!("Started/repaired (port {})", &c[1]),
            None => "Started/repaired".to_string(),
        },
        Action::DockerDown => "All services stopped".to_string(),
        Action::DockerRestartAll => "All services restarted".to_string(),
        Action::DockerRestart => match service {
            "" => "Service restarted".to_string(),
            s => format!("Restarted {}", pretty_service(s)),
        },
        Action::DockerPrune => "Docker cache cleaned".to_string(),
        Action::DockerStopContainer => match service {
            "" => "Stopped the occupying container".to_string(),
            s => format!("Stopped the occupying container: {s}"),
        },
        Action::MobilePreviewStart => "Mobile preview started".to_string(),
        Action::MobilePreviewStop => "Mobile preview stopped".to_string(),
        Action::MobilePreviewRestart => "Mobile preview restarted".to_string(),
        Action::TunnelStart => "Tunnel started".to_string(),
        Action::TunnelRestart => "Tunnel restarted".to_string(),
        Action::TunnelStop => "Tunnel stopped".to_string(),
        Action::NamedTunnelInit => or_default(msg, "Named tunnel initialization started"),
        Action::SetBackendPort => or_default(msg, "Applied"),
        a if a.is_git_publish() => or_default(msg, "Pushed to GitHub"),
        _ if !msg.is_empty() && msg.chars().count() <= 80 && !msg.contains('\n') => msg.to_string(),
        _ => "Done".to_string(),
    };
    OpsReply::success(message).with_detail(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_humanized() {
        let r = normalize(
            Action::DockerUp,
            "",
            OpsReply::failure("Cannot connect to the Docker daemon at unix:///var/run/docker.sock"),
        );
        assert!(!r.ok);
        assert!(r.message.starts_with("Docker engine is not running"));
        assert!(r.detail.contains("docker.sock"));
    }

    #[test]
    fn long_raw_failures_get_generic_message() {
        let raw = "step 1 ok\nstep 2 exploded in an unfamiliar way";
        let r = normalize(Action::DockerDown, "", OpsReply::failure(raw));
        assert_eq!(r.message, GENERIC_FAILURE);
        assert_eq!(r.detail, raw);

        let r = normalize(Action::DockerDown, "", OpsReply::failure("x".repeat(241)));
        assert_eq!(r.message, GENERIC_FAILURE);
        let r = normalize(Action::DockerDown, "", OpsReply::failure("short reason"));
        assert_eq!(r.message, "short reason");
    }

    #[test]
    fn docker_up_reports_auto_port() {
        let out = format!("{PORT_PREFIX}18081 (avoids a port conflict)\n\nContainer started");
        let r = normalize(Action::DockerUp, "", OpsReply::success(out.clone()));
        assert_eq!(r.message, "Started/repaired (port 18081)");
        assert_eq!(r.detail, out);

        let r = normalize(Action::DockerUp, "", OpsReply::success("Container started"));
        assert_eq!(r.message, "Started/repaired");
    }

    #[test]
    fn per_action_labels() {
        let ok = || OpsReply::success("raw output\nmore");
        assert_eq!(normalize(Action::DockerRestart, "db", ok()).message, "Restarted database");
        assert_eq!(normalize(Action::DockerRestart, "worker", ok()).message, "Restarted worker");
        assert_eq!(
            normalize(Action::DockerStopContainer, "pg-1", ok()).message,
            "Stopped the occupying container: pg-1"
        );
        assert_eq!(normalize(Action::TunnelStop, "", ok()).message, "Tunnel stopped");
        assert_eq!(
            normalize(Action::GitPublishFrontend, "", OpsReply::success("")).message,
            "Pushed to GitHub"
        );
    }

    #[test]
    fn fallback_keeps_short_messages() {
        let r = normalize(Action::AlertsEnable, "", OpsReply::success("Alerts enabled"));
        assert_eq!(r.message, "Alerts enabled");
        let r = normalize(Action::AlertsTest, "", OpsReply::success("line one\nline two"));
        assert_eq!(r.message, "Done");
        assert_eq!(r.detail, "line one\nline two");
    }
}
