//! Mobile preview: a dev server plus a quick tunnel, driven by helper scripts.

use std::time::Duration;

use tracing::info;

use opsdeck_core::{Layout, OpsReply, humanize_error};
use opsdeck_probe::process::{pid_status, tail_file};
use opsdeck_probe::{CommandSpec, Probes};

use crate::error::ActionResult;
use crate::spawn::{Detached, bash, remove_quietly, stop_pid_file};

pub async fn mobile_preview_start(probes: &Probes) -> ActionResult<OpsReply> {
    let layout = probes.layout();
    layout.ensure_runtime_dir()?;

    let running = pid_status(&layout.mobile_preview_start_pid);
    if running.alive {
        return Ok(OpsReply::success(format!("Already starting (pid={})", running.pid)));
    }

    let script = &layout.mobile_preview_start_script;
    if !script.is_file() {
        return Ok(OpsReply::failure("Missing script: scripts/start_mobile_preview.sh"));
    }

    let args = vec![script.display().to_string()];
    let helper = Detached::spawn(
        &bash(),
        &args,
        &layout.root,
        &layout.mobile_preview_start_log,
        &layout.mobile_preview_start_pid,
        "starting mobile preview",
    )?;
    Ok(OpsReply::success(format!(
        "Started (pid={}). Waiting for the public URL in {}",
        helper.pid,
        layout.mobile_preview_url.display()
    )))
}

/// Stop the start script if still running, then the dev server and tunnel
/// via the stop script, and drop the stale URL file.
pub async fn mobile_preview_stop(probes: &Probes) -> ActionResult<OpsReply> {
    let layout = probes.layout();
    if let Some(pid) = stop_pid_file(&layout.mobile_preview_start_pid, Duration::from_millis(300)).await {
        info!(pid, "mobile preview start script stopped");
    }

    let script = layout.mobile_preview_stop_script.display().to_string();
    let spec = CommandSpec::new("bash", [script]).timeout_secs(60);
    let (ok, out) = match probes.runner().run(&spec).await {
        Ok(out) if out.success() => (true, out.text().to_string()),
        Ok(out) => {
            let raw = if out.text().is_empty() {
                format!("exit={}", out.code.unwrap_or(-1))
            } else {
                out.text().to_string()
            };
            (false, humanize_error(&raw))
        }
        Err(e) => (false, humanize_error(&e.chain_text())),
    };

    remove_quietly(&layout.mobile_preview_url);

    let message = match (ok, out.is_empty()) {
        (_, false) => out,
        (true, true) => "Stopped".to_string(),
        (false, true) => "Stop failed".to_string(),
    };
    Ok(OpsReply::new(ok, message))
}

/// Start script, preview tunnel and dev server logs merged for one paste.
pub fn mobile_preview_logs(layout: &Layout) -> String {
    let sources = [
        ("mobile_preview_start.log", &layout.mobile_preview_start_log, 120),
        ("frontend/cloudflared.log", &layout.mobile_preview_tunnel_log, 80),
        ("frontend/dev-h5.log", &layout.mobile_preview_dev_log, 80),
    ];
    let parts: Vec<String> = sources
        .iter()
        .filter(|(_, path, _)| path.exists())
        .map(|(name, path, lines)| format!("== {name} ==\n{}", tail_file(path, *lines)))
        .collect();
    if parts.is_empty() {
        "(no logs)".to_string()
    } else {
        parts.join("\n\n")
    }
}
