//! Incident policy: turn one health observation into a list of issues.
//!
//! Local checks always alert. Setup-type checks (named tunnel init,
//! public endpoints that have never worked) stay quiet unless
//! `ALERT_INCLUDE_SETUP` is on, so a half-configured deployment does not
//! page anyone.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use opsdeck_core::HomeSettings;
use opsdeck_probe::tunnel::NamedReadiness;
use opsdeck_probe::{Check, Probes};

use crate::state::{Level, SeenFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKey {
    Docker,
    ApiLocal,
    NamedInit,
    Tunnel,
    ApiPublic,
    Frontend,
}

impl IssueKey {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKey::Docker => "docker",
            IssueKey::ApiLocal => "api_local",
            IssueKey::NamedInit => "named_init",
            IssueKey::Tunnel => "tunnel",
            IssueKey::ApiPublic => "api_public",
            IssueKey::Frontend => "frontend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub key: IssueKey,
    pub title: String,
    pub detail: String,
    pub fix: String,
}

impl Issue {
    fn new(key: IssueKey, title: &str, detail: impl Into<String>, fix: &str) -> Self {
        Self {
            key,
            title: title.to_string(),
            detail: detail.into().trim().to_string(),
            fix: fix.to_string(),
        }
    }
}

/// Everything the policy looks at, gathered in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub settings: HomeSettings,
    pub docker: Check,
    pub api_local: Check,
    pub named: NamedReadiness,
    pub tunnel_alive: bool,
    pub api_public: Check,
    pub frontend: Check,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertUrls {
    pub frontend: String,
    pub api_health: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalApi {
    pub api_port: u16,
    pub api_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NamedSummary {
    pub need_named: bool,
    pub config_ok: bool,
    pub cert_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub level: Level,
    pub signature: String,
    pub issues: Vec<Issue>,
    pub urls: AlertUrls,
    pub local: LocalApi,
    pub named: NamedSummary,
}

/// Sorted, deduplicated, comma-joined issue keys.
pub fn signature(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| i.key.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(",")
}

/// Apply the policy. `seen` is updated from this observation before any
/// gating, so the first healthy sighting arms the public-endpoint alerts.
pub fn assess(obs: &Observation, include_setup: bool, seen: &mut SeenFlags) -> Assessment {
    if obs.api_public.ok {
        seen.api_public_ok = true;
    }
    if obs.frontend.ok {
        seen.frontend_ok = true;
    }

    let need_named = obs.settings.needs_named_tunnel();
    let config_ok = obs.named.config_ok;
    let mut issues = Vec::new();

    if !obs.docker.ok {
        issues.push(Issue::new(
            IssueKey::Docker,
            "Docker engine unavailable",
            obs.docker.message.as_str(),
            "Start Docker Desktop/OrbStack, wait until it is ready, then run \"Start / repair\".",
        ));
    } else if !obs.api_local.ok {
        issues.push(Issue::new(
            IssueKey::ApiLocal,
            "Local API unavailable",
            obs.api_local.message.as_str(),
            "Run \"Start / repair\"; if it still fails, restart the backend and check its logs.",
        ));
    }

    if need_named {
        if !config_ok {
            if include_setup {
                issues.push(Issue::new(
                    IssueKey::NamedInit,
                    "Named tunnel not initialized",
                    "no cloudflared named config or credentials yet",
                    "Move the domain's nameservers to Cloudflare, then run \"Named tunnel init\" once.",
                ));
            }
        } else if !obs.tunnel_alive {
            issues.push(Issue::new(
                IssueKey::Tunnel,
                "Tunnel not running",
                "cloudflared is not running",
                "Run \"Start tunnel\" or \"Restart tunnel\".",
            ));
        }
    }

    if (include_setup || seen.api_public_ok || config_ok) && !obs.api_public.ok {
        issues.push(Issue::new(
            IssueKey::ApiPublic,
            "Public API unreachable",
            obs.api_public.message.as_str(),
            "Make sure the local API is healthy, then restart the tunnel; on error 1014 redo the named tunnel init.",
        ));
    }
    if (include_setup || seen.frontend_ok) && !obs.frontend.ok {
        issues.push(Issue::new(
            IssueKey::Frontend,
            "Frontend unreachable",
            obs.frontend.message.as_str(),
            "Check the Cloudflare DNS records (apex A / www) and the GitHub Pages custom domain and HTTPS settings.",
        ));
    }

    let settings = &obs.settings;
    Assessment {
        level: if issues.is_empty() { Level::Ok } else { Level::Bad },
        signature: signature(&issues),
        issues,
        urls: AlertUrls {
            frontend: settings.frontend_url(),
            api_health: settings.public_api_health_url(),
        },
        local: LocalApi {
            api_port: settings.backend_port,
            api_url: settings.local_health_url(),
        },
        named: NamedSummary {
            need_named,
            config_ok,
            cert_ok: obs.named.cert_ok,
        },
    }
}

/// Source of observations for the daemon.
#[async_trait]
pub trait HealthObserver: Send + Sync {
    async fn observe(&self) -> Observation;
}

/// Production observer backed by the shared probe context. Public checks
/// use their own cache keys so the status page's entries are not reused.
pub struct ProbeObserver {
    probes: Arc<Probes>,
}

impl ProbeObserver {
    pub fn new(probes: Arc<Probes>) -> Self {
        Self { probes }
    }
}

#[async_trait]
impl HealthObserver for ProbeObserver {
    async fn observe(&self) -> Observation {
        let p = &self.probes;
        let settings = p.home_settings();
        let public_url = settings.public_api_health_url();
        let frontend_url = settings.frontend_url();
        let local_url = settings.local_health_url();
        let public_key = format!("alerts_api_public_health:{}", settings.api_hostname);
        let frontend_key = format!("alerts_frontend_https:{}", settings.public_domain);

        let (docker, api_local, api_public, frontend) = tokio::join!(
            p.docker_daemon_status(),
            p.http_health(&local_url, Duration::from_secs(2)),
            p.cached(&public_key, 15, || p.http_health(&public_url, Duration::from_secs(3))),
            p.cached(&frontend_key, 30, || p.http_health(&frontend_url, Duration::from_secs(3))),
        );

        Observation {
            named: p.named_readiness(),
            tunnel_alive: p.tunnel_process().alive,
            settings,
            docker,
            api_local,
            api_public,
            frontend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdeck_core::EnvMap;

    fn healthy() -> Observation {
        Observation {
            settings: HomeSettings::from_env(&EnvMap::new()),
            docker: Check::pass("27.1"),
            api_local: Check::pass("200 OK"),
            named: NamedReadiness {
                config_ok: true,
                cert_ok: true,
                ..NamedReadiness::default()
            },
            tunnel_alive: true,
            api_public: Check::pass("200 OK"),
            frontend: Check::pass("200 OK"),
        }
    }

    #[test]
    fn healthy_is_ok_and_arms_seen_flags() {
        let mut seen = SeenFlags::default();
        let a = assess(&healthy(), false, &mut seen);
        assert_eq!(a.level, Level::Ok);
        assert_eq!(a.signature, "");
        assert!(seen.api_public_ok && seen.frontend_ok);
        assert_eq!(a.urls.api_health, "https://api.naibao.me/api/health");
    }

    #[test]
    fn docker_down_masks_local_api() {
        let mut obs = healthy();
        obs.docker = Check::fail("Docker engine is not running");
        obs.api_local = Check::fail("Connection refused");
        let a = assess(&obs, false, &mut SeenFlags::default());
        assert_eq!(a.signature, "docker");
        assert_eq!(a.issues[0].detail, "Docker engine is not running");
    }

    #[test]
    fn frontend_needs_prior_success_or_include_setup() {
        let mut obs = healthy();
        obs.frontend = Check::fail("HTTP 404");

        let mut never_seen = SeenFlags::default();
        let a = assess(&obs, false, &mut never_seen);
        assert_eq!(a.level, Level::Ok);
        assert!(!never_seen.frontend_ok);

        let mut seen = SeenFlags {
            frontend_ok: true,
            ..SeenFlags::default()
        };
        assert_eq!(assess(&obs, false, &mut seen).signature, "frontend");
        assert_eq!(assess(&obs, true, &mut SeenFlags::default()).signature, "frontend");
    }

    #[test]
    fn public_api_alerts_once_named_config_complete() {
        let mut obs = healthy();
        obs.api_public = Check::fail("Cloudflare 1014");
        let a = assess(&obs, false, &mut SeenFlags::default());
        assert_eq!(a.signature, "api_public");

        obs.named.config_ok = false;
        let a = assess(&obs, false, &mut SeenFlags::default());
        assert_eq!(a.level, Level::Ok);
        let a = assess(&obs, true, &mut SeenFlags::default());
        assert_eq!(a.signature, "api_public,named_init");
    }

    #[test]
    fn dead_tunnel_only_matters_in_named_mode() {
        let mut obs = healthy();
        obs.tunnel_alive = false;
        assert_eq!(assess(&obs, false, &mut SeenFlags::default()).signature, "tunnel");

        let mut env = EnvMap::new();
        env.insert("NB_TUNNEL_MODE".into(), "quick".into());
        obs.settings = HomeSettings::from_env(&env);
        assert_eq!(assess(&obs, false, &mut SeenFlags::default()).level, Level::Ok);
    }

    #[test]
    fn signature_is_order_independent() {
        let mk = |key| Issue::new(key, "t", "", "f");
        let a = signature(&[mk(IssueKey::Tunnel), mk(IssueKey::ApiPublic), mk(IssueKey::Tunnel)]);
        let b = signature(&[mk(IssueKey::ApiPublic), mk(IssueKey::Tunnel)]);
        assert_eq!(a, b);
        assert_eq!(a, "api_public,tunnel");
    }
}
