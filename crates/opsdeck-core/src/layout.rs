//! Filesystem layout of a deployment root.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoreResult;

/// Name of the runtime directory under the deployment root.
pub const RUNTIME_DIR_NAME: &str = ".opsdeck_runtime";

/// Every path the console reads or writes, derived from one root directory.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,

    pub compose_file: PathBuf,
    pub home_env: PathBuf,
    pub home_env_example: PathBuf,

    pub runtime_dir: PathBuf,
    pub tunnel_pid: PathBuf,
    pub tunnel_log: PathBuf,
    pub tunnel_config: PathBuf,
    pub named_init_pid: PathBuf,
    pub named_init_log: PathBuf,
    pub named_init_script: PathBuf,

    pub alerts_env: PathBuf,
    pub alerts_state: PathBuf,
    pub alerts_log: PathBuf,

    pub console_pid: PathBuf,
    pub console_port: PathBuf,

    pub mobile_preview_url: PathBuf,
    pub mobile_preview_tunnel_pid: PathBuf,
    pub mobile_preview_tunnel_log: PathBuf,
    pub mobile_preview_dev_pid: PathBuf,
    pub mobile_preview_dev_log: PathBuf,
    pub mobile_preview_start_pid: PathBuf,
    pub mobile_preview_start_log: PathBuf,
    pub mobile_preview_start_script: PathBuf,
    pub mobile_preview_stop_script: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let deploy = root.join("deploy");
        let runtime = root.join(RUNTIME_DIR_NAME);
        let frontend = root.join("frontend");
        let scripts = root.join("scripts");

        Self {
            compose_file: deploy.join("docker-compose.home.yml"),
            home_env: deploy.join(".env.home"),
            home_env_example: deploy.join(".env.home.example"),

            tunnel_pid: runtime.join("cloudflared_api.pid"),
            tunnel_log: runtime.join("cloudflared_api.log"),
            tunnel_config: runtime.join("cloudflared_named.yml"),
            named_init_pid: runtime.join("named_tunnel_init.pid"),
            named_init_log: runtime.join("named_tunnel_init.log"),
            named_init_script: scripts.join("setup_named_tunnel.sh"),

            alerts_env: runtime.join("alerts.env"),
            alerts_state: runtime.join("alerts_state.json"),
            alerts_log: runtime.join("alerts.log"),

            console_pid: runtime.join("ops_console.pid"),
            console_port: runtime.join("ops_console.port"),

            mobile_preview_url: frontend.join("mobile-preview.url"),
            mobile_preview_tunnel_pid: frontend.join("cloudflared.pid"),
            mobile_preview_tunnel_log: frontend.join("cloudflared.log"),
            mobile_preview_dev_pid: frontend.join("dev-h5.pid"),
            mobile_preview_dev_log: frontend.join("dev-h5.log"),
            mobile_preview_start_pid: runtime.join("mobile_preview_start.pid"),
            mobile_preview_start_log: runtime.join("mobile_preview_start.log"),
            mobile_preview_start_script: scripts.join("start_mobile_preview.sh"),
            mobile_preview_stop_script: scripts.join("stop_mobile_preview.sh"),

            runtime_dir: runtime,
            root,
        }
    }

    pub fn ensure_runtime_dir(&self) -> CoreResult<()> {
        fs::create_dir_all(&self.runtime_dir)?;
        Ok(())
    }

    /// `~/.cloudflared/cert.pem`, present once `cloudflared tunnel login` succeeded.
    pub fn cloudflared_cert(&self) -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".cloudflared").join("cert.pem"))
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_tilde(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(raw).to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_root() {
        let layout = Layout::new("/srv/app");
        assert_eq!(layout.compose_file, Path::new("/srv/app/deploy/docker-compose.home.yml"));
        assert_eq!(layout.alerts_state, Path::new("/srv/app/.opsdeck_runtime/alerts_state.json"));
        assert_eq!(layout.mobile_preview_url, Path::new("/srv/app/frontend/mobile-preview.url"));
    }

    #[test]
    fn tilde_expansion_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/etc/creds.json"), Path::new("/etc/creds.json"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/x.json"), home.join("x.json"));
        }
    }
}
