//! Compose lifecycle and backend host-port repair.

use tracing::{debug, info};

use opsdeck_core::bootstrap::ensure_home_env_file;
use opsdeck_core::settings::{DEFAULT_BACKEND_HOST_PORT, KEY_BACKEND_HOST_PORT};
use opsdeck_core::{HomeSettings, OpsReply, upsert_env_key};
use opsdeck_probe::ports::{is_tcp_port_free, pick_free_port};
use opsdeck_probe::{Check, CommandSpec, Probes};

use crate::error::ActionResult;

/// Container-name fragment of our own backend service.
pub const OWN_BACKEND: &str = "deploy-backend";

/// Legacy default tried last before asking the OS.
const LEGACY_BACKEND_PORT: u16 = 8080;

const PORT_COMMENT: &str =
    "Host port mapped to the backend container's 8080. Prefer 18080/18081/18082 (8080 is often taken).";

pub(crate) const PORT_PREFIX: &str = "Auto-selected free port: ";

pub fn owned_by_backend(names: &[String]) -> bool {
    names.iter().any(|n| n.contains(OWN_BACKEND))
}

/// First bindable port among the configured one (when set explicitly),
/// `18080..=18082` and `8080`; otherwise an OS-assigned port.
pub fn choose_backend_port(settings: &HomeSettings, is_free: impl Fn(u16) -> bool) -> ActionResult<u16> {
    let mut candidates = Vec::with_capacity(5);
    if settings.backend_port_explicit {
        candidates.push(settings.backend_port);
    }
    candidates.extend([
        DEFAULT_BACKEND_HOST_PORT,
        DEFAULT_BACKEND_HOST_PORT + 1,
        DEFAULT_BACKEND_HOST_PORT + 2,
        LEGACY_BACKEND_PORT,
    ]);

    let mut tried: Vec<u16> = Vec::new();
    for port in candidates {
        if port == 0 || tried.contains(&port) {
            continue;
        }
        tried.push(port);
        if is_free(port) {
            return Ok(port);
        }
    }
    let port = pick_free_port()?;
    debug!(port, ?tried, "all preferred backend ports busy, using an OS-assigned one");
    Ok(port)
}

/// `compose up -d --build`, moving the backend off a conflicting port first.
pub async fn docker_up(probes: &Probes) -> ActionResult<OpsReply> {
    let layout = probes.layout();
    ensure_home_env_file(layout)?;
    let settings = probes.home_settings();
    let before = settings.backend_port;

    let owners = probes.docker_publishers(before).await.unwrap_or_default();
    let chosen = if owned_by_backend(&owners) {
        before
    } else {
        choose_backend_port(&settings, is_tcp_port_free)?
    };

    let mut changed = false;
    if chosen != before || !settings.backend_port_explicit {
        changed = upsert_env_key(
            &layout.home_env,
            KEY_BACKEND_HOST_PORT,
            &chosen.to_string(),
            Some(PORT_COMMENT),
        );
    }
    if changed {
        info!(from = before, to = chosen, "backend host port auto-selected");
    }

    let out = probes.compose(&["up", "-d", "--build"], 600).await?;
    let text = if changed {
        format!("{PORT_PREFIX}{chosen} (avoids a port conflict)\n\n{out}")
    } else {
        out
    };
    Ok(OpsReply::success(text.trim()))
}

pub async fn docker_down(probes: &Probes) -> ActionResult<OpsReply> {
    let out = probes.compose(&["down"], 180).await?;
    Ok(OpsReply::success(out))
}

pub async fn docker_restart(probes: &Probes, service: &str) -> ActionResult<OpsReply> {
    if service.is_empty() {
        return Ok(OpsReply::failure("Missing service name"));
    }
    let out = probes.compose(&["restart", service], 180).await?;
    Ok(OpsReply::success(out))
}

pub async fn docker_restart_all(probes: &Probes) -> ActionResult<OpsReply> {
    let out = probes.compose(&["restart"], 240).await?;
    Ok(OpsReply::success(out))
}

pub async fn docker_stop_container(probes: &Probes, name: &str) -> ActionResult<OpsReply> {
    if name.is_empty() {
        return Ok(OpsReply::failure("Missing container name"));
    }
    let out = probes.docker(&["stop", name], 60).await?;
    Ok(OpsReply::success(out))
}

/// Remove stopped containers, dangling images and build cache. Volumes
/// are never touched. `builder prune` is best-effort.
pub async fn docker_prune(probes: &Probes) -> ActionResult<OpsReply> {
    let system = probes
        .runner()
        .run(&CommandSpec::new("docker", ["system", "prune", "-f"]).timeout_secs(600))
        .await?;
    let mut out = system.text().to_string();

    match probes
        .runner()
        .run(&CommandSpec::new("docker", ["builder", "prune", "-f"]).timeout_secs(600))
        .await
    {
        Ok(builder) if !builder.text().is_empty() => {
            out = format!("{out}\n\n{}", builder.text()).trim().to_string();
        }
        Ok(_) => {}
        Err(e) => debug!(error = %e, "builder prune skipped"),
    }

    Ok(OpsReply::success(if out.is_empty() { "Done".into() } else { out }))
}

/// Whether `port` may become the backend host port.
pub async fn validate_backend_host_port(probes: &Probes, port: u32) -> Check {
    if !(1024..=65535).contains(&port) {
        return Check::fail("Port must be an integer between 1024 and 65535");
    }
    let Ok(port) = u16::try_from(port) else {
        return Check::fail("Port must be an integer between 1024 and 65535");
    };

    if let Ok(names) = probes.docker_publishers(port).await {
        if owned_by_backend(&names) {
            return Check::pass(format!("Port {port} available (currently occupied by own backend)"));
        }
        if !names.is_empty() {
            let shown: Vec<&str> = names.iter().take(3).map(String::as_str).collect();
            return Check::fail(format!(
                "Port {port} is already published by container: {}",
                shown.join(", ")
            ));
        }
    }

    if let Ok(listeners) = probes.host_listeners(port).await {
        if !listeners.is_empty() {
            let procs: Vec<String> = listeners.iter().map(ToString::to_string).collect();
            return Check::fail(format!(
                "Port {port} is used by a host process: {}",
                procs.join(", ")
            ));
        }
    }

    if !is_tcp_port_free(port) {
        return Check::fail(format!("Port {port} may be in use or unavailable (pick another)"));
    }
    Check::pass(format!("Port {port} available"))
}

/// Validate, persist and (when docker is up) apply a new backend host port.
pub async fn set_backend_port(probes: &Probes, text: &str) -> ActionResult<OpsReply> {
    let Ok(requested) = text.trim().parse::<u32>() else {
        return Ok(OpsReply::failure("Invalid port (enter a number)"));
    };
    let verdict = validate_backend_host_port(probes, requested).await;
    if !verdict.ok {
        return Ok(OpsReply::failure(verdict.message));
    }
    let Ok(port) = u16::try_from(requested) else {
        return Ok(OpsReply::failure("Port must be an integer between 1024 and 65535"));
    };

    let layout = probes.layout();
    ensure_home_env_file(layout)?;
    let current = probes.home_settings().backend_port;
    upsert_env_key(&layout.home_env, KEY_BACKEND_HOST_PORT, &port.to_string(), Some(PORT_COMMENT));
    info!(from = current, to = port, "backend host port saved");

    if !probes.docker_daemon_status().await.ok {
        return Ok(OpsReply::success(format!(
            "Saved backend port {port} (Docker is not running; it applies on the next start/repair)"
        )));
    }

    if current == port {
        let owners = probes.docker_publishers(port).await.unwrap_or_default();
        if owned_by_backend(&owners) {
            return Ok(OpsReply::success(format!("Applied backend port {port}")));
        }
    }

    let out = probes.compose(&["up", "-d", "--build", "backend"], 600).await?;
    Ok(OpsReply::success(format!("Applied backend port {port}")).with_detail(out))
}
