//! Docker / compose probes and command builders.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProbeResult;
use crate::runner::{CommandSpec, capture};
use crate::{Check, Probes};

/// One row of `docker compose ps --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerRecord {
    pub name: String,
    pub service: String,
    pub state: String,
    pub status: String,
    pub health: String,
}

impl ContainerRecord {
    fn synthetic(service: &str, state: &str, status: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            state: state.to_string(),
            status: status.into(),
            ..Self::default()
        }
    }
}

/// Parse compose JSON output. Newer compose prints one object per line,
/// older releases print a single array; both are accepted. Lines that do
/// not parse become placeholder rows carrying the raw text.
pub fn parse_compose_ps(text: &str) -> Vec<ContainerRecord> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        if let Ok(rows) = serde_json::from_str::<Vec<ContainerRecord>>(trimmed) {
            return rows;
        }
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            serde_json::from_str::<ContainerRecord>(line)
                .unwrap_or_else(|_| ContainerRecord::synthetic("unknown", "unknown", line))
        })
        .collect()
}

impl Probes {
    /// `docker compose --env-file <home env> -f <compose file> <args…>`
    pub fn compose_spec<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let layout = self.layout();
        let mut full: Vec<String> = vec![
            "compose".into(),
            "--env-file".into(),
            layout.home_env.display().to_string(),
            "-f".into(),
            layout.compose_file.display().to_string(),
        ];
        full.extend(args.into_iter().map(Into::into));
        CommandSpec::new("docker", full)
    }

    /// Run a compose subcommand, returning merged output on success.
    pub async fn compose(&self, args: &[&str], timeout_secs: u64) -> ProbeResult<String> {
        let spec = self.compose_spec(args.iter().copied()).timeout_secs(timeout_secs);
        capture(self.runner(), &spec).await
    }

    /// Run a plain `docker` subcommand.
    pub async fn docker(&self, args: &[&str], timeout_secs: u64) -> ProbeResult<String> {
        let spec = CommandSpec::new("docker", args.iter().copied()).timeout_secs(timeout_secs);
        capture(self.runner(), &spec).await
    }

    /// Container rows for the deployment. A CLI failure yields one
    /// synthetic `docker/error` row.
    pub async fn compose_ps(&self) -> Vec<ContainerRecord> {
        let spec = self.compose_spec(["ps", "--format", "json"]).timeout_secs(30);
        match self.runner().run(&spec).await {
            Ok(out) => parse_compose_ps(&out.output),
            Err(e) => {
                debug!(error = %e, "compose ps failed");
                vec![ContainerRecord::synthetic(
                    "docker",
                    "error",
                    Check::from_error(&e).message,
                )]
            }
        }
    }

    /// `docker version` answered by the server side.
    pub async fn docker_cli_status(&self) -> Check {
        if self.runner().locate("docker").is_none() {
            return Check::fail(opsdeck_core::humanize_error("docker not found in PATH"));
        }
        self.docker_format_probe(&["version", "--format", "{{.Server.Version}}"]).await
    }

    /// `docker info` one-liner: version · OS · host name.
    pub async fn docker_daemon_status(&self) -> Check {
        if self.runner().locate("docker").is_none() {
            return Check::fail(opsdeck_core::humanize_error("docker not found in PATH"));
        }
        self.docker_format_probe(&[
            "info",
            "--format",
            "{{.ServerVersion}} · {{.OperatingSystem}} · {{.Name}}",
        ])
        .await
    }

    async fn docker_format_probe(&self, args: &[&str]) -> Check {
        let spec = CommandSpec::new("docker", args.iter().copied()).timeout_secs(6);
        match self.runner().run(&spec).await {
            Ok(out) if out.success() => {
                Check::pass(if out.text().is_empty() { "ok" } else { out.text() })
            }
            Ok(out) => {
                let raw = if out.text().is_empty() { "docker daemon not reachable" } else { out.text() };
                Check::fail(opsdeck_core::humanize_error(raw))
            }
            Err(e) => Check::from_error(&e),
        }
    }

    /// Tail of `docker compose logs` for one service (or all).
    pub async fn compose_logs(&self, service: &str, tail: u32) -> String {
        let tail = tail.to_string();
        let mut args = vec!["logs", "--tail", tail.as_str()];
        if !service.trim().is_empty() {
            args.push(service.trim());
        }
        let spec = self.compose_spec(args).timeout_secs(20);
        match self.runner().run(&spec).await {
            Ok(out) if !out.text().is_empty() => out.text().to_string(),
            Ok(_) => "(no log output)".to_string(),
            Err(e) => Check::from_error(&e).message,
        }
    }
}
