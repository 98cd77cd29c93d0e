//! cloudflared probes: binary discovery, named-tunnel config and
//! quick-tunnel URL discovery.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use opsdeck_core::layout::expand_tilde;

use crate::Probes;
use crate::process::{PidStatus, pid_status};
use crate::runner::CommandSpec;

static QUICK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https://[a-z0-9-]+\.trycloudflare\.com").expect("static regex")
});
static LOCAL_SERVICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(service:\s*http://127\.0\.0\.1:)\d+").expect("static regex")
});

/// The fields the console reads from a named-tunnel config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamedTunnelConfig {
    pub tunnel_id: String,
    pub credentials_file: String,
    pub hostname: String,
    /// First ingress service that is not an `http_status:` catch-all.
    pub service: String,
}

/// First value of each key; comments and blank lines skipped. Keys may
/// appear as ingress list items (`- hostname: …`).
pub fn parse_named_config(text: &str) -> NamedTunnelConfig {
    let mut cfg = NamedTunnelConfig::default();
    for line in text.lines() {
        let line = line.trim();
        let line = line.strip_prefix("- ").unwrap_or(line).trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let slot = match key.trim() {
            "tunnel" => &mut cfg.tunnel_id,
            "credentials-file" => &mut cfg.credentials_file,
            "hostname" => &mut cfg.hostname,
            "service" if !value.contains("http_status") => &mut cfg.service,
            _ => continue,
        };
        if slot.is_empty() {
            *slot = value.to_string();
        }
    }
    cfg
}

/// Named config file contents; missing or unreadable ⇒ defaults.
pub fn read_named_config(path: &Path) -> NamedTunnelConfig {
    fs::read_to_string(path)
        .map(|t| parse_named_config(&t))
        .unwrap_or_default()
}

/// First `*.trycloudflare.com` URL in a log.
pub fn parse_quick_tunnel_url(log: &str) -> Option<String> {
    QUICK_URL.find(log).map(|m| m.as_str().to_string())
}

/// Point every loopback `service:` entry at `port`. Returns `None` when
/// nothing changes.
pub fn patch_service_port(config: &str, port: u16) -> Option<String> {
    let patched = LOCAL_SERVICE.replace_all(config, |caps: &regex::Captures<'_>| {
        format!("{}{port}", &caps[1])
    });
    (patched != config).then(|| patched.into_owned())
}

/// Whether the one-time named tunnel setup has completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamedReadiness {
    pub config: String,
    pub config_ok: bool,
    pub tunnel_id: String,
    pub credentials_file: String,
    pub credentials_ok: bool,
    pub cert_ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloudflaredInfo {
    pub ok: bool,
    pub path: String,
    pub version: String,
}

impl Probes {
    /// `cloudflared` on `PATH`/fallback dirs, else `scripts/bin/cloudflared`.
    pub fn locate_cloudflared(&self) -> Option<PathBuf> {
        self.runner().locate("cloudflared").or_else(|| {
            let local = self.layout().root.join("scripts").join("bin").join("cloudflared");
            local.is_file().then_some(local)
        })
    }

    pub async fn cloudflared_info(&self) -> CloudflaredInfo {
        let Some(path) = self.locate_cloudflared() else {
            return CloudflaredInfo::default();
        };
        let path_text = path.display().to_string();
        let spec = CommandSpec::new(&path_text, ["--version"]).timeout_secs(4);
        let version = match self.runner().run(&spec).await {
            Ok(out) if out.success() => out.text().lines().next().unwrap_or_default().trim().to_string(),
            Ok(out) => out.text().to_string(),
            Err(e) => e.to_string(),
        };
        CloudflaredInfo {
            ok: true,
            path: path_text,
            version,
        }
    }

    pub fn named_readiness(&self) -> NamedReadiness {
        let layout = self.layout();
        let exists = layout.tunnel_config.is_file();
        let cfg = read_named_config(&layout.tunnel_config);
        let credentials_ok =
            !cfg.credentials_file.is_empty() && expand_tilde(&cfg.credentials_file).is_file();
        NamedReadiness {
            config: if exists { layout.tunnel_config.display().to_string() } else { String::new() },
            config_ok: exists && !cfg.tunnel_id.is_empty() && credentials_ok,
            tunnel_id: cfg.tunnel_id,
            credentials_file: cfg.credentials_file,
            credentials_ok,
            cert_ok: layout.cloudflared_cert().is_some_and(|p| p.is_file()),
        }
    }

    /// Quick-tunnel URL scraped from the tunnel log, if any.
    pub fn quick_tunnel_url(&self) -> Option<String> {
        fs::read_to_string(&self.layout().tunnel_log)
            .ok()
            .and_then(|log| parse_quick_tunnel_url(&log))
    }

    pub fn tunnel_process(&self) -> PidStatus {
        pid_status(&self.layout().tunnel_pid)
    }

    pub fn named_init_process(&self) -> PidStatus {
        pid_status(&self.layout().named_init_pid)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::scripted::ScriptedRunner;
    use crate::runner::CommandOutput;
    use opsdeck_core::Layout;

    const CONFIG: &str = "\
# generated by setup_named_tunnel.sh
tunnel: 6f1c2d3e-aaaa-bbbb-cccc-123456789abc
credentials-file: /home/op/.cloudflared/6f1c2d3e.json
ingress:
  - hostname: api.naibao.me
    service: http://127.0.0.1:8080
  - service: http_status:404
";

    #[test]
    fn named_config_fields() {
        let cfg = parse_named_config(CONFIG);
        assert_eq!(cfg.tunnel_id, "6f1c2d3e-aaaa-bbbb-cccc-123456789abc");
        assert_eq!(cfg.credentials_file, "/home/op/.cloudflared/6f1c2d3e.json");
        assert_eq!(cfg.hostname, "api.naibao.me");
        assert_eq!(cfg.service, "http://127.0.0.1:8080");
    }

    #[test]
    fn port_patching() {
        let patched = patch_service_port(CONFIG, 18080).unwrap();
        assert!(patched.contains("service: http://127.0.0.1:18080"));
        assert!(patched.contains("http_status:404"));
        assert!(patch_service_port(&patched, 18080).is_none());
    }

    #[test]
    fn quick_url_from_log() {
        let log = "INF +----+\nINF |  https://brave-otter-42.trycloudflare.com  |\n";
        assert_eq!(
            parse_quick_tunnel_url(log).as_deref(),
            Some("https://brave-otter-42.trycloudflare.com")
        );
        assert_eq!(parse_quick_tunnel_url("nothing here"), None);
    }

    #[test]
    fn readiness_requires_credentials_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.ensure_runtime_dir().unwrap();
        let creds = dir.path().join("creds.json");
        fs::write(
            &layout.tunnel_config,
            format!("tunnel: abc\ncredentials-file: {}\n", creds.display()),
        )
        .unwrap();
        let probes = Probes::new(layout, Arc::new(ScriptedRunner::new()));

        assert!(!probes.named_readiness().config_ok);
        fs::write(&creds, "{}").unwrap();
        let ready = probes.named_readiness();
        assert!(ready.config_ok);
        assert_eq!(ready.tunnel_id, "abc");
    }

    #[tokio::test]
    async fn version_is_first_line() {
        let runner = ScriptedRunner::new().on(
            "cloudflared --version",
            CommandOutput::ok("cloudflared version 2024.8.2 (built 2024-08-20)\nextra\n"),
        );
        let probes = Probes::new(Layout::new("/srv/app"), Arc::new(runner));
        let info = probes.cloudflared_info().await;
        assert!(info.ok);
        assert_eq!(info.path, "/usr/bin/cloudflared");
        assert_eq!(info.version, "cloudflared version 2024.8.2 (built 2024-08-20)");
    }
}
