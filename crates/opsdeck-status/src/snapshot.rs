//! The status snapshot and the probe-backed source that builds it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use opsdeck_alert::{AlertConfig, AlertState, ChannelFlags};
use opsdeck_core::bootstrap::ensure_home_env_file;
use opsdeck_probe::dns::{DnsAnswer, HostLookup, looks_like_cloudflare_ns};
use opsdeck_probe::docker::ContainerRecord;
use opsdeck_probe::git::{ChangeSummary, FRONTEND_SCOPE, GithubRepo, WORKFLOW_PATHS};
use opsdeck_probe::host::{HostMetrics, lan_ip};
use opsdeck_probe::ports::PortOwnership;
use opsdeck_probe::process::{pid_status, read_first_line};
use opsdeck_probe::tunnel::{CloudflaredInfo, NamedReadiness};
use opsdeck_probe::{Check, Probes};

use crate::error::StatusResult;

/// One consistent view of the deployment. Built in full, then published.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub ts: i64,
    pub root_dir: String,
    pub compose_file: String,
    pub env_file: String,
    pub alerts: AlertsMirror,
    pub git: GitSection,
    pub host: HostMetrics,
    pub docker: DockerSection,
    pub cloudflared: CloudflaredInfo,
    pub ports: PortsSection,
    pub containers: Vec<ContainerRecord>,
    pub api: ApiSection,
    pub frontend: Endpoint,
    pub mobile_preview: MobilePreview,
    pub tunnel: TunnelSection,
    pub named_init: NamedInitSection,
    pub dns: DnsSection,
    pub links: Links,
    pub lan: Lan,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SilenceMirror {
    pub start: String,
    pub end: String,
    pub active_now: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LastSend {
    pub level: String,
    pub signature: String,
    pub sent_ts: i64,
    pub send_ok: bool,
    pub send_msg: String,
}

/// Read-only copy of alert settings and bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertsMirror {
    pub env_file: String,
    pub enabled: bool,
    pub include_setup: bool,
    pub interval_s: u64,
    pub repeat_minutes: u64,
    pub send_recovery: bool,
    pub silence: SilenceMirror,
    pub channels: ChannelFlags,
    pub last: LastSend,
    pub state_file: String,
    pub log: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowScope {
    #[serde(flatten)]
    pub changes: ChangeSummary,
    pub path: String,
    pub on_origin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontendScope {
    #[serde(flatten)]
    pub changes: ChangeSummary,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitScopes {
    pub all: ChangeSummary,
    pub workflow: WorkflowScope,
    pub frontend: FrontendScope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitSection {
    pub commit: String,
    pub origin: String,
    pub github: Option<GithubRepo>,
    pub branch: String,
    pub ahead: u32,
    pub behind: u32,
    pub dirty: bool,
    pub scopes: GitScopes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DockerSection {
    pub cli: Check,
    pub daemon: Check,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortsSection {
    pub backend: PortOwnership,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub ok: bool,
    pub msg: String,
    pub url: String,
}

impl Endpoint {
    fn from_check(check: Check, url: String) -> Self {
        Self {
            ok: check.ok,
            msg: check.message,
            url,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalEndpoint {
    pub ok: bool,
    pub msg: String,
    pub port: u16,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiSection {
    pub local: LocalEndpoint,
    pub public: Endpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MobilePreview {
    pub ok: bool,
    pub url: String,
    pub url_file: String,
    pub starter_pid: u32,
    pub starter_alive: bool,
    pub frontend_pid: u32,
    pub frontend_alive: bool,
    pub tunnel_pid: u32,
    pub tunnel_alive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TunnelSection {
    pub pid: u32,
    pub alive: bool,
    pub mode: String,
    pub name: String,
    pub hostname: String,
    pub url: String,
    pub config: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamedInitSection {
    pub pid: u32,
    pub alive: bool,
    pub log: String,
    #[serde(flatten)]
    pub readiness: NamedReadiness,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZoneRecords {
    pub domain: String,
    pub ns: DnsAnswer,
    pub a: DnsAnswer,
    pub cloudflare: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CnameRecord {
    pub hostname: String,
    pub cname: DnsAnswer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DnsSection {
    pub api: HostLookup,
    pub zone: ZoneRecords,
    pub www: CnameRecord,
    pub api_record: CnameRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Links {
    pub frontend: String,
    pub api_health: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Lan {
    pub ip: String,
}

/// Producer of snapshots for the aggregator.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn collect(&self) -> StatusResult<Snapshot>;
}

const CHANGE_LIST_MAX: usize = 8;
const DNS_TTL: u64 = 300;

/// Builds snapshots from live probes, with a per-key TTL for the slow ones.
pub struct ProbeSnapshotSource {
    probes: Arc<Probes>,
}

impl ProbeSnapshotSource {
    pub fn new(probes: Arc<Probes>) -> Self {
        Self { probes }
    }

    fn alerts_mirror(&self) -> AlertsMirror {
        let layout = self.probes.layout();
        let config = AlertConfig::load(layout);
        let state = AlertState::load(&layout.alerts_state);
        AlertsMirror {
            env_file: layout.alerts_env.display().to_string(),
            enabled: config.enabled,
            include_setup: config.include_setup,
            interval_s: config.interval_s,
            repeat_minutes: config.repeat_minutes,
            send_recovery: config.send_recovery,
            silence: SilenceMirror {
                active_now: config.silence().active_now(),
                start: config.silence_start.clone(),
                end: config.silence_end.clone(),
            },
            channels: config.channels(),
            last: LastSend {
                level: state.last_level.as_str().to_string(),
                signature: state.last_signature,
                sent_ts: state.last_sent_ts,
                send_ok: state.last_send_ok,
                send_msg: state.last_send_msg,
            },
            state_file: layout.alerts_state.display().to_string(),
            log: layout.alerts_log.display().to_string(),
        }
    }

    fn mobile_preview(&self) -> MobilePreview {
        let layout = self.probes.layout();
        let url = read_first_line(&layout.mobile_preview_url);
        let starter = pid_status(&layout.mobile_preview_start_pid);
        let dev = pid_status(&layout.mobile_preview_dev_pid);
        let tunnel = pid_status(&layout.mobile_preview_tunnel_pid);
        MobilePreview {
            ok: !url.is_empty(),
            url,
            url_file: layout.mobile_preview_url.display().to_string(),
            starter_pid: starter.pid,
            starter_alive: starter.alive,
            frontend_pid: dev.pid,
            frontend_alive: dev.alive,
            tunnel_pid: tunnel.pid,
            tunnel_alive: tunnel.alive,
        }
    }

    async fn git_section(&self) -> GitSection {
        let p = &self.probes;
        let workflow_path = WORKFLOW_PATHS[0];
        let (sync, on_origin, all, workflow, frontend) = tokio::join!(
            p.git_sync(),
            p.git_file_exists_in_ref("origin/main", workflow_path),
            p.git_change_summary(&[], CHANGE_LIST_MAX),
            p.git_change_summary(WORKFLOW_PATHS, CHANGE_LIST_MAX),
            p.git_change_summary(FRONTEND_SCOPE, CHANGE_LIST_MAX),
        );
        GitSection {
            commit: sync.commit,
            origin: sync.origin,
            github: sync.github,
            branch: sync.branch,
            ahead: sync.ahead,
            behind: sync.behind,
            dirty: all.count > 0,
            scopes: GitScopes {
                all,
                workflow: WorkflowScope {
                    changes: workflow,
                    path: workflow_path.to_string(),
                    on_origin,
                },
                frontend: FrontendScope {
                    changes: frontend,
                    paths: FRONTEND_SCOPE.iter().map(|s| s.to_string()).collect(),
                },
            },
        }
    }
}

#[async_trait]
impl SnapshotSource for ProbeSnapshotSource {
    async fn collect(&self) -> StatusResult<Snapshot> {
        let p = &self.probes;
        let layout = p.layout();
        if let Err(e) = ensure_home_env_file(layout) {
            warn!(error = %e, "cannot bootstrap deployment env file");
        }

        let settings = p.home_settings();
        let port = settings.backend_port;
        let domain = settings.public_domain.clone();
        let api_host = settings.api_hostname.clone();
        let www_host = format!("www.{domain}");

        let local_url = settings.local_health_url();
        let public_base = format!("https://{api_host}");
        let public_health = settings.public_api_health_url();
        let frontend_url = settings.frontend_url();

        let key_public = format!("api_public_health:{api_host}");
        let key_frontend = format!("frontend_https:{domain}");
        let key_resolve = format!("dns_resolve:{api_host}");
        let key_ns = format!("dns_ns:{domain}");
        let key_a = format!("dns_a:{domain}");
        let key_www = format!("dns_cname:{www_host}");
        let key_api_cname = format!("dns_cname:{api_host}");
        let key_port = format!("port_backend:{port}");
        let cf_path = p.locate_cloudflared().map(|b| b.display().to_string()).unwrap_or_default();
        let key_cf = format!("cloudflared_ver:{cf_path}");

        let timeout = Duration::from_secs(2);
        let (containers, api_local, api_public, frontend, docker_cli, docker_daemon) = tokio::join!(
            p.compose_ps(),
            p.http_health(&local_url, timeout),
            p.cached(&key_public, 15, || p.http_health(&public_health, timeout)),
            p.cached(&key_frontend, 30, || p.http_health(&frontend_url, timeout)),
            p.cached("docker_cli", 15, || p.docker_cli_status()),
            p.cached("docker_daemon", 10, || p.docker_daemon_status()),
        );
        let (api_dns, zone_ns, zone_a, www_cname, api_cname) = tokio::join!(
            p.cached(&key_resolve, 30, || p.resolve_hostname(&api_host)),
            p.cached(&key_ns, DNS_TTL, || p.dns_resolve(&domain, "NS", 2)),
            p.cached(&key_a, DNS_TTL, || p.dns_resolve(&domain, "A", 2)),
            p.cached(&key_www, DNS_TTL, || p.dns_resolve(&www_host, "CNAME", 2)),
            p.cached(&key_api_cname, DNS_TTL, || p.dns_resolve(&api_host, "CNAME", 2)),
        );
        let (cloudflared, backend_port, host, git) = tokio::join!(
            p.cached(&key_cf, 300, || p.cloudflared_info()),
            p.cached(&key_port, 5, || p.port_ownership(port)),
            p.host_metrics(),
            self.git_section(),
        );

        let tunnel = p.tunnel_process();
        let tunnel_url = if settings.needs_named_tunnel() {
            public_base.clone()
        } else {
            p.quick_tunnel_url().unwrap_or_default()
        };
        let readiness = p.named_readiness();
        let named = p.named_init_process();
        let cloudflare = looks_like_cloudflare_ns(&zone_ns.answers);

        debug!(containers = containers.len(), "snapshot collected");

        Ok(Snapshot {
            ts: chrono::Utc::now().timestamp(),
            root_dir: layout.root.display().to_string(),
            compose_file: layout.compose_file.display().to_string(),
            env_file: layout.home_env.display().to_string(),
            alerts: self.alerts_mirror(),
            git,
            host,
            docker: DockerSection {
                cli: docker_cli,
                daemon: docker_daemon,
            },
            cloudflared,
            ports: PortsSection { backend: backend_port },
            containers,
            api: ApiSection {
                local: LocalEndpoint {
                    ok: api_local.ok,
                    msg: api_local.message,
                    port,
                    url: local_url,
                },
                public: Endpoint::from_check(api_public, public_base),
            },
            frontend: Endpoint::from_check(frontend, frontend_url.clone()),
            mobile_preview: self.mobile_preview(),
            tunnel: TunnelSection {
                pid: tunnel.pid,
                alive: tunnel.alive,
                mode: settings.tunnel_mode.as_str().to_string(),
                name: settings.tunnel_name.clone(),
                hostname: api_host.clone(),
                url: tunnel_url,
                config: readiness.config.clone(),
            },
            named_init: NamedInitSection {
                pid: named.pid,
                alive: named.alive,
                log: layout.named_init_log.display().to_string(),
                readiness,
            },
            dns: DnsSection {
                api: api_dns,
                zone: ZoneRecords {
                    domain: domain.clone(),
                    ns: zone_ns,
                    a: zone_a,
                    cloudflare,
                },
                www: CnameRecord {
                    hostname: www_host.clone(),
                    cname: www_cname,
                },
                api_record: CnameRecord {
                    hostname: api_host.clone(),
                    cname: api_cname,
                },
            },
            links: Links {
                frontend: frontend_url,
                api_health: public_health.clone(),
            },
            lan: Lan {
                ip: lan_ip().unwrap_or_default(),
            },
        })
    }
}
