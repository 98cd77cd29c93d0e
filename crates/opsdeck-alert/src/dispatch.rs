//! When to notify, and what to say.

use chrono::{DateTime, TimeZone};

use opsdeck_core::PRODUCT;

use crate::channels::AlertMessage;
use crate::evaluator::Assessment;
use crate::state::{AlertState, Level};

const MAX_ISSUE_LINES: usize = 12;
const MAX_FIX_STEPS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub send: bool,
    pub recovery: bool,
}

/// Should-send rule over the previous state:
///
/// * level changed → send (a recovery only when `send_recovery`);
/// * still bad with a new signature → send;
/// * still bad and `repeat_secs` elapsed since the last send → send.
pub fn decide(
    prev: &AlertState,
    level: Level,
    signature: &str,
    now_ts: i64,
    repeat_secs: i64,
    send_recovery: bool,
) -> Decision {
    if level != prev.last_level {
        return match level {
            Level::Ok => Decision {
                send: send_recovery,
                recovery: true,
            },
            Level::Bad => Decision {
                send: true,
                recovery: false,
            },
        };
    }
    let send = level == Level::Bad
        && (signature != prev.last_signature || now_ts - prev.last_sent_ts >= repeat_secs);
    Decision {
        send,
        recovery: false,
    }
}

/// Incident or recovery notification for an assessment.
pub fn compose_message<Tz: TimeZone>(
    assessment: &Assessment,
    recovery: bool,
    now: &DateTime<Tz>,
) -> AlertMessage
where
    Tz::Offset: std::fmt::Display,
{
    let title = if recovery {
        format!("{PRODUCT}: recovered")
    } else {
        format!("{PRODUCT}: incident")
    };
    let mut lines = vec![format!("Time: {}", now.format("%Y-%m-%d %H:%M"))];

    if recovery {
        lines.push("Status: all key checks are healthy again".into());
    } else if assessment.issues.is_empty() {
        lines.push("Issues: unknown (open the console for details)".into());
    } else {
        lines.push("Issues:".into());
        for issue in assessment.issues.iter().take(MAX_ISSUE_LINES) {
            if issue.detail.is_empty() {
                lines.push(format!("- {}", issue.title));
            } else {
                lines.push(format!("- {} ({})", issue.title, issue.detail));
            }
        }
        lines.push(String::new());
        lines.push("Suggested fixes:".into());
        let mut fixes: Vec<&str> = Vec::new();
        for issue in &assessment.issues {
            let fix = issue.fix.trim();
            if !fix.is_empty() && !fixes.contains(&fix) {
                fixes.push(fix);
            }
        }
        for (i, fix) in fixes.iter().take(MAX_FIX_STEPS).enumerate() {
            lines.push(format!("{}. {fix}", i + 1));
        }
    }

    if !assessment.urls.frontend.is_empty() {
        lines.push(String::new());
        lines.push(format!("Frontend: {}", assessment.urls.frontend));
    }
    if !assessment.urls.api_health.is_empty() {
        lines.push(format!("API: {}", assessment.urls.api_health));
    }

    AlertMessage {
        title,
        body: lines.join("\n").trim().to_string(),
    }
}

/// Operator-triggered test notification.
pub fn compose_test_message<Tz: TimeZone>(
    frontend_url: &str,
    api_health_url: &str,
    now: &DateTime<Tz>,
) -> AlertMessage
where
    Tz::Offset: std::fmt::Display,
{
    let body = [
        format!("Time: {}", now.format("%Y-%m-%d %H:%M")),
        "This is a test message: if you can read it, alert delivery works.".to_string(),
        String::new(),
        format!("Frontend: {frontend_url}"),
        format!("API: {api_health_url}"),
    ]
    .join("\n");
    AlertMessage {
        title: format!("{PRODUCT}: test alert"),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{AlertUrls, Issue, IssueKey, LocalApi, NamedSummary};
    use chrono::Utc;

    fn prev(level: Level, signature: &str, sent: i64) -> AlertState {
        AlertState {
            last_level: level,
            last_signature: signature.into(),
            last_sent_ts: sent,
            ..AlertState::default()
        }
    }

    #[test]
    fn transition_to_bad_sends() {
        let d = decide(&prev(Level::Ok, "", 0), Level::Bad, "docker", 100, 1800, true);
        assert_eq!(d, Decision { send: true, recovery: false });
    }

    #[test]
    fn recovery_respects_flag() {
        let st = prev(Level::Bad, "tunnel", 50);
        assert_eq!(decide(&st, Level::Ok, "", 100, 1800, true), Decision { send: true, recovery: true });
        assert_eq!(decide(&st, Level::Ok, "", 100, 1800, false), Decision { send: false, recovery: true });
    }

    #[test]
    fn same_signature_waits_for_repeat_interval() {
        let st = prev(Level::Bad, "api_public,tunnel", 1_000);
        assert!(!decide(&st, Level::Bad, "api_public,tunnel", 1_000 + 1799, 1800, true).send);
        assert!(decide(&st, Level::Bad, "api_public,tunnel", 1_000 + 1800, 1800, true).send);
        assert!(decide(&st, Level::Bad, "tunnel", 1_001, 1800, true).send);
    }

    #[test]
    fn steady_ok_never_sends() {
        assert!(!decide(&prev(Level::Ok, "", 0), Level::Ok, "", 10_000_000, 1800, true).send);
    }

    fn assessment(issues: Vec<Issue>) -> Assessment {
        Assessment {
            level: if issues.is_empty() { Level::Ok } else { Level::Bad },
            signature: String::new(),
            issues,
            urls: AlertUrls {
                frontend: "https://naibao.me".into(),
                api_health: "https://api.naibao.me/api/health".into(),
            },
            local: LocalApi {
                api_port: 18080,
                api_url: "http://127.0.0.1:18080/health".into(),
            },
            named: NamedSummary {
                need_named: true,
                config_ok: true,
                cert_ok: true,
            },
        }
    }

    #[test]
    fn incident_message_dedupes_fixes() {
        let issue = |key, title: &str, fix: &str| Issue {
            key,
            title: title.into(),
            detail: String::new(),
            fix: fix.into(),
        };
        let a = assessment(vec![
            issue(IssueKey::Tunnel, "Tunnel not running", "Restart the tunnel."),
            issue(IssueKey::ApiPublic, "Public API unreachable", "Restart the tunnel."),
        ]);
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let msg = compose_message(&a, false, &now);
        assert_eq!(msg.title, "opsdeck: incident");
        assert!(msg.body.starts_with("Time: 2026-01-02 03:04"));
        assert_eq!(msg.body.matches("Restart the tunnel.").count(), 1);
        assert!(msg.body.ends_with("API: https://api.naibao.me/api/health"));
    }

    #[test]
    fn recovery_message() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let msg = compose_message(&assessment(vec![]), true, &now);
        assert_eq!(msg.title, "opsdeck: recovered");
        assert!(msg.body.contains("healthy again"));
    }
}
