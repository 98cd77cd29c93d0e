//! DNS lookups through `dig`, falling back to DNS-over-HTTPS.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use opsdeck_core::humanize_error;

use crate::Probes;
use crate::error::{ProbeError, ProbeResult};
use crate::runner::CommandSpec;

const DOH_ENDPOINT: &str = "https://dns.google/resolve";

/// Normalized answer set for one `(name, type)` query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DnsAnswer {
    pub ok: bool,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    /// `0` answered, `1` empty answer from dig, `-1` tool failure, else DoH status.
    pub status: i32,
    pub answers: Vec<String>,
    pub message: String,
}

impl DnsAnswer {
    fn failed(name: &str, record_type: &str, status: i32, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            name: name.to_string(),
            record_type: record_type.to_string(),
            status,
            answers: Vec::new(),
            message: message.into(),
        }
    }
}

/// System resolver result for a hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostLookup {
    pub ok: bool,
    pub hostname: String,
    pub ips: Vec<String>,
    pub message: String,
}

#[derive(Deserialize)]
struct DohResponse {
    #[serde(rename = "Status", default = "doh_unknown_status")]
    status: i32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohRecord>,
}

#[derive(Deserialize)]
struct DohRecord {
    #[serde(default)]
    data: String,
}

fn doh_unknown_status() -> i32 {
    -1
}

/// Non-empty trimmed lines of `dig +short`.
pub fn parse_dig_short(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(';'))
        .map(str::to_string)
        .collect()
}

/// Status code and answers from a DoH JSON body.
pub fn parse_doh(body: &str) -> ProbeResult<(i32, Vec<String>)> {
    let resp: DohResponse =
        serde_json::from_str(body).map_err(|e| ProbeError::Parse(format!("doh response: {e}")))?;
    let answers = resp
        .answer
        .into_iter()
        .map(|r| r.data.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    Ok((resp.status, answers))
}

/// Any nameserver under `ns.cloudflare.com`.
pub fn looks_like_cloudflare_ns(ns: &[String]) -> bool {
    ns.iter().any(|s| {
        let s = s.trim().to_lowercase();
        s.trim_end_matches('.').ends_with(".ns.cloudflare.com")
    })
}

impl Probes {
    /// Resolve `(name, type)`, preferring a local `dig`.
    pub async fn dns_resolve(&self, name: &str, record_type: &str, timeout_secs: u64) -> DnsAnswer {
        let name = name.trim();
        let record_type = record_type.trim().to_uppercase();
        if name.is_empty() || record_type.is_empty() {
            return DnsAnswer::failed(name, &record_type, -1, "missing name or record type");
        }

        if self.runner().locate("dig").is_some() {
            return self.dig(name, &record_type, timeout_secs).await;
        }
        match self.doh(name, &record_type, timeout_secs).await {
            Ok(answer) => answer,
            Err(e) => {
                debug!(name, error = %e, "doh lookup failed");
                DnsAnswer::failed(name, &record_type, -1, humanize_error(&e.chain_text()))
            }
        }
    }

    async fn dig(&self, name: &str, record_type: &str, timeout_secs: u64) -> DnsAnswer {
        let timeout_secs = timeout_secs.max(1);
        let spec = CommandSpec::new(
            "dig",
            [
                "+short".to_string(),
                format!("+timeout={timeout_secs}"),
                "+tries=1".to_string(),
                "-t".to_string(),
                record_type.to_string(),
                name.to_string(),
            ],
        )
        .timeout_secs(timeout_secs.max(2) + 1);

        match self.runner().run(&spec).await {
            Ok(out) if out.success() => {
                let answers = parse_dig_short(&out.output);
                if answers.is_empty() {
                    DnsAnswer::failed(name, record_type, 1, humanize_error("no records"))
                } else {
                    DnsAnswer {
                        ok: true,
                        name: name.to_string(),
                        record_type: record_type.to_string(),
                        status: 0,
                        answers,
                        message: String::new(),
                    }
                }
            }
            Ok(out) => {
                let raw = if out.text().is_empty() { "dig failed" } else { out.text() };
                DnsAnswer::failed(name, record_type, -1, humanize_error(raw))
            }
            Err(e) => DnsAnswer::failed(name, record_type, -1, humanize_error(&e.chain_text())),
        }
    }

    async fn doh(&self, name: &str, record_type: &str, timeout_secs: u64) -> ProbeResult<DnsAnswer> {
        let body = self
            .http()
            .get(DOH_ENDPOINT)
            .query(&[("name", name), ("type", record_type)])
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .send()
            .await?
            .text()
            .await?;
        let (status, answers) = parse_doh(&body)?;
        let ok = status == 0 && !answers.is_empty();
        let message = match (ok, status) {
            (true, _) => String::new(),
            (false, 0) => humanize_error("no records"),
            (false, s) => format!("DNS query failed (Status={s})"),
        };
        Ok(DnsAnswer {
            ok,
            name: name.to_string(),
            record_type: record_type.to_string(),
            status,
            answers,
            message,
        })
    }

    /// System resolver lookup (sorted unique addresses).
    pub async fn resolve_hostname(&self, hostname: &str) -> HostLookup {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return HostLookup {
                ok: false,
                hostname: String::new(),
                ips: Vec::new(),
                message: "hostname is empty".into(),
            };
        }
        match tokio::net::lookup_host((hostname, 443)).await {
            Ok(addrs) => {
                let ips: Vec<String> = addrs
                    .map(|a| a.ip().to_string())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let ok = !ips.is_empty();
                HostLookup {
                    ok,
                    hostname: hostname.to_string(),
                    message: if ok { String::new() } else { humanize_error("no records") },
                    ips,
                }
            }
            Err(e) => HostLookup {
                ok: false,
                hostname: hostname.to_string(),
                ips: Vec::new(),
                message: humanize_error(&e.to_string()),
            },
        }
    }
}
