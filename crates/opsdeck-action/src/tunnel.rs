//! Public API tunnel: start, stop and the one-time named-tunnel setup.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use opsdeck_core::{HomeSettings, OpsReply, TunnelMode};
use opsdeck_probe::Probes;
use opsdeck_probe::process::tail_file;
use opsdeck_probe::tunnel::patch_service_port;

use crate::error::ActionResult;
use crate::spawn::{Detached, bash, remove_quietly, stop_pid_file};

const TUNNEL_GRACE: Duration = Duration::from_millis(600);
const INIT_GRACE: Duration = Duration::from_millis(800);
const STOP_GRACE: Duration = Duration::from_millis(300);

/// `cloudflared` arguments for the configured mode. Named mode uses the
/// runtime config when present so `~/.cloudflared/config.yml` is left alone.
pub fn tunnel_args(settings: &HomeSettings, config: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = vec!["tunnel".into(), "--no-autoupdate".into()];
    match (settings.tunnel_mode, config) {
        (TunnelMode::Quick, _) => {
            args.push("--url".into());
            args.push(format!("http://127.0.0.1:{}", settings.backend_port));
        }
        (TunnelMode::Named, Some(cfg)) => {
            args.push("--config".into());
            args.push(cfg.display().to_string());
            args.push("run".into());
            args.push(settings.tunnel_name.clone());
        }
        (TunnelMode::Named, None) => {
            args.push("run".into());
            args.push(settings.tunnel_name.clone());
        }
    }
    args
}

/// Keep the named config pointed at the current backend port.
fn sync_config_port(path: &Path, port: u16) {
    let Ok(raw) = fs::read_to_string(path) else {
        return;
    };
    if let Some(patched) = patch_service_port(&raw, port) {
        match fs::write(path, patched) {
            Ok(()) => info!(port, "named tunnel config re-pointed at backend port"),
            Err(e) => warn!(error = %e, "cannot patch named tunnel config"),
        }
    }
}

pub async fn start_tunnel(probes: &Probes) -> ActionResult<OpsReply> {
    let layout = probes.layout();
    layout.ensure_runtime_dir()?;

    let running = probes.tunnel_process();
    if running.alive {
        return Ok(OpsReply::success(format!("Already running (pid={})", running.pid)));
    }

    let Some(bin) = probes.locate_cloudflared() else {
        return Ok(OpsReply::failure(
            "cloudflared not found (install it, or place it at scripts/bin/cloudflared)",
        ));
    };

    let settings = probes.home_settings();
    let config = (settings.tunnel_mode == TunnelMode::Named && layout.tunnel_config.is_file())
        .then_some(layout.tunnel_config.as_path());
    if let Some(cfg) = config {
        sync_config_port(cfg, settings.backend_port);
    }

    let args = tunnel_args(&settings, config);
    let mut helper = Detached::spawn(
        &bin,
        &args,
        &layout.root,
        &layout.tunnel_log,
        &layout.tunnel_pid,
        "starting cloudflared",
    )?;

    if helper.early_exit(TUNNEL_GRACE).await?.is_some() {
        let tail = tail_file(&layout.tunnel_log, 40);
        return Ok(OpsReply::failure(format!(
            "Tunnel failed to start (see the tunnel log):\n{tail}"
        )));
    }

    Ok(match settings.tunnel_mode {
        TunnelMode::Quick => OpsReply::success(
            "Started (quick tunnel). The public URL is picked up from the log.",
        ),
        TunnelMode::Named => OpsReply::success(format!(
            "Started (named tunnel). Expected hostname: https://{}",
            settings.api_hostname
        )),
    })
}

pub async fn stop_tunnel(probes: &Probes) -> ActionResult<OpsReply> {
    Ok(match stop_pid_file(&probes.layout().tunnel_pid, STOP_GRACE).await {
        Some(pid) => {
            info!(pid, "tunnel stopped");
            OpsReply::success("Stopped")
        }
        None => OpsReply::success("Not running"),
    })
}

/// Run `scripts/setup_named_tunnel.sh` (login, create, route DNS, write
/// the runtime config) in the background.
pub async fn named_tunnel_init(probes: &Probes) -> ActionResult<OpsReply> {
    let layout = probes.layout();
    layout.ensure_runtime_dir()?;

    let running = probes.named_init_process();
    if running.alive {
        return Ok(OpsReply::success(format!(
            "Initializing (pid={}). Finish the browser authorization, then refresh.",
            running.pid
        )));
    }

    let script = &layout.named_init_script;
    if !script.is_file() {
        return Ok(OpsReply::failure("Missing script: scripts/setup_named_tunnel.sh"));
    }

    let args = vec![script.display().to_string()];
    let mut helper = Detached::spawn(
        &bash(),
        &args,
        &layout.root,
        &layout.named_init_log,
        &layout.named_init_pid,
        "starting named tunnel init",
    )?;

    if let Some(status) = helper.early_exit(INIT_GRACE).await? {
        remove_quietly(&layout.named_init_pid);
        if status.success() {
            return Ok(OpsReply::success(
                "Initialization finished. Refresh, then start the tunnel from the tunnel card.",
            ));
        }
        let tail = tail_file(&layout.named_init_log, 80);
        return Ok(OpsReply::failure(format!(
            "Initialization failed (see the init log):\n{tail}"
        )));
    }

    Ok(OpsReply::success(format!(
        "Initialization started (pid={}). A browser window opens for Cloudflare authorization; refresh when done.",
        helper.pid
    )))
}
