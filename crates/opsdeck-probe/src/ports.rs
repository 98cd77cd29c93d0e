//! TCP port ownership: compose containers publishing a port, and raw
//! OS listeners found through `lsof`.

use std::net::{Ipv4Addr, TcpListener};

use serde::Serialize;

use crate::error::ProbeResult;
use crate::runner::CommandSpec;
use crate::{Check, Probes};

/// A process listening on a port, as reported by `lsof`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listener {
    pub command: String,
    pub pid: u32,
}

impl std::fmt::Display for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.command, self.pid)
    }
}

/// Owners of one host port. Either list may be incomplete when its
/// tool failed; the matching `*_error` says why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortOwnership {
    pub port: u16,
    pub docker: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_error: Option<String>,
    pub host: Vec<Listener>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_error: Option<String>,
}

/// Parse `lsof -nP -iTCP:<port> -sTCP:LISTEN` output (header skipped,
/// duplicate pids collapsed).
pub fn parse_lsof(text: &str) -> Vec<Listener> {
    let mut out: Vec<Listener> = Vec::new();
    for line in text.lines() {
        let mut cols = line.split_whitespace();
        let (Some(command), Some(pid)) = (cols.next(), cols.next()) else {
            continue;
        };
        if command == "COMMAND" {
            continue;
        }
        let Ok(pid) = pid.parse::<u32>() else {
            continue;
        };
        if !out.iter().any(|l| l.pid == pid) {
            out.push(Listener {
                command: command.to_string(),
                pid,
            });
        }
    }
    out
}

/// Whether `0.0.0.0:<port>` can be bound right now.
pub fn is_tcp_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}

/// Ask the OS for an unused port.
pub fn pick_free_port() -> ProbeResult<u16> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    Ok(listener.local_addr()?.port())
}

impl Probes {
    /// Names of running containers publishing `port`.
    pub async fn docker_publishers(&self, port: u16) -> ProbeResult<Vec<String>> {
        let filter = format!("publish={port}");
        let out = self
            .docker(&["ps", "--filter", &filter, "--format", "{{.Names}}"], 5)
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Raw listeners on `port`. `lsof` exits 1 with no output when nothing listens.
    pub async fn host_listeners(&self, port: u16) -> ProbeResult<Vec<Listener>> {
        let target = format!("-iTCP:{port}");
        let spec = CommandSpec::new("lsof", ["-nP", target.as_str(), "-sTCP:LISTEN"]).timeout_secs(5);
        let out = self.runner().run(&spec).await?;
        if out.success() || out.text().is_empty() {
            return Ok(parse_lsof(&out.output));
        }
        out.into_result().map(|text| parse_lsof(&text))
    }

    pub async fn port_ownership(&self, port: u16) -> PortOwnership {
        let (docker, host) = tokio::join!(self.docker_publishers(port), self.host_listeners(port));
        let mut owners = PortOwnership {
            port,
            ..PortOwnership::default()
        };
        match docker {
            Ok(names) => owners.docker = names,
            Err(e) => owners.docker_error = Some(Check::from_error(&e).message),
        }
        match host {
            Ok(listeners) => owners.host = listeners,
            Err(e) => owners.host_error = Some(Check::from_error(&e).message),
        }
        owners
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::runner::CommandOutput;
    use crate::scripted::ScriptedRunner;
    use opsdeck_core::Layout;

    const LSOF: &str = "\
COMMAND   PID USER   FD   TYPE DEVICE SIZE/OFF NODE NAME
nginx    4242 root    6u  IPv4  12345      0t0  TCP *:18080 (LISTEN)
nginx    4242 root    7u  IPv6  12346      0t0  TCP *:18080 (LISTEN)
python3  5151 dev     3u  IPv4  22222      0t0  TCP 127.0.0.1:18080 (LISTEN)
";

    #[test]
    fn lsof_parsing() {
        let l = parse_lsof(LSOF);
        assert_eq!(l.len(), 2);
        assert_eq!(l[0].to_string(), "nginx(4242)");
        assert_eq!(l[1].pid, 5151);
    }

    #[test]
    fn bound_port_is_not_free() {
        let held = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = held.local_addr().unwrap().port();
        assert!(!is_tcp_port_free(port));
        drop(held);
        assert!(pick_free_port().unwrap() > 0);
    }

    #[tokio::test]
    async fn ownership_combines_both_sources() {
        let runner = ScriptedRunner::new()
            .on("docker ps --filter publish=18080", CommandOutput::ok("deploy-backend-1\n"))
            .on("lsof -nP -iTCP:18080", CommandOutput::failed(1, ""));
        let probes = Probes::new(Layout::new("/srv/app"), Arc::new(runner));

        let owners = probes.port_ownership(18080).await;
        assert_eq!(owners.docker, vec!["deploy-backend-1".to_string()]);
        assert!(owners.host.is_empty());
        assert!(owners.host_error.is_none());
    }

    #[tokio::test]
    async fn missing_lsof_is_reported() {
        let runner = ScriptedRunner::new().on("docker ps", CommandOutput::ok(""));
        let probes = Probes::new(Layout::new("/srv/app"), Arc::new(runner));
        let owners = probes.port_ownership(9999).await;
        assert!(owners.docker.is_empty());
        assert!(owners.host_error.is_some());
    }
}
