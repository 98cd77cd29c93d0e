//! Translate low-level tool and network errors into operator phrasing.

use std::sync::LazyLock;

use regex::Regex;

static PORT_ALLOCATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bind\s+for\s+.*:(\d+)\s+failed:\s+port\s+is\s+already\s+allocated")
        .expect("static regex")
});

/// Map a known error substring to an actionable message.
///
/// Unknown text is returned trimmed and otherwise unchanged; empty input
/// yields an empty string.
pub fn humanize_error(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    let low = s.to_lowercase();

    // docker / compose
    if (low.contains("no such file or directory") && low.contains("'docker'"))
        || low.contains("docker not found in path")
    {
        return "Docker CLI not found (install and start Docker Desktop or OrbStack first)".into();
    }
    if low.contains("cannot connect to the docker daemon") || low.contains("docker daemon not reachable") {
        return "Docker engine is not running or unreachable (open Docker Desktop or OrbStack first)".into();
    }
    if low.contains("bind for") && low.contains("port is already allocated") {
        return match PORT_ALLOCATED.captures(&low) {
            Some(c) => format!("Port {} is already in use (resolve it from the backend port card)", &c[1]),
            None => "Port is already in use (resolve it from the backend port card)".into(),
        };
    }
    if low.contains("required variable postgres_password") && low.contains("missing a value") {
        return "POSTGRES_PASSWORD is not set (check deploy/.env.home)".into();
    }
    if low.contains("jwt_secret") && low.contains("required") {
        return "JWT_SECRET is not set (check deploy/.env.home)".into();
    }

    // dns / network
    if low.contains("no records") {
        return "No records configured".into();
    }
    if low.contains("temporary failure in name resolution") || low.contains("name or service not known") {
        return "Name resolution failed (DNS not propagated or network restricted)".into();
    }
    if low.contains("timed out") || low.contains("context deadline exceeded") {
        return "Request timed out (slow network or service not ready)".into();
    }
    if low.contains("connection refused") {
        return "Connection refused (service not started or port closed)".into();
    }
    if low.contains("eof occurred in violation of protocol") {
        return "TLS/HTTPS handshake failed (network issue, domain not live, or certificate not ready)".into();
    }

    s.to_string()
}

/// Git-specific variant: credential prompts, identity, rejected pushes.
pub fn humanize_git_error(raw: &str) -> String {
    let s = raw.trim();
    let low = s.to_lowercase();
    if low.contains("terminal prompts disabled") || low.contains("could not read username") {
        return "Not signed in to GitHub (log in once from a terminal, then retry)".into();
    }
    if low.contains("please tell me who you are") || low.contains("unable to auto-detect email address") {
        return "Git commit identity not configured (set git user.name / user.email)".into();
    }
    if low.contains("non-fast-forward") || low.contains("fetch first") {
        return "Push rejected (remote has new commits; pull and resolve first)".into();
    }
    if low.contains("repository not found") {
        return "Repository not found or no access (check GitHub permissions / remote origin)".into();
    }
    if low.contains("permission denied") && low.contains("publickey") {
        return "SSH permission denied (check the GitHub SSH key or switch to HTTPS + token)".into();
    }
    if s.is_empty() { "Operation failed".into() } else { s.to_string() }
}
