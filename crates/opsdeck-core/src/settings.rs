//! Typed view over the deployment env file.

use serde::Serialize;

use crate::env::{EnvMap, env_str, parse_port};

pub const DEFAULT_BACKEND_HOST_PORT: u16 = 18080;
pub const DEFAULT_PUBLIC_DOMAIN: &str = "naibao.me";
pub const DEFAULT_API_HOSTNAME: &str = "api.naibao.me";
pub const DEFAULT_TUNNEL_NAME: &str = "naibao-api";

pub const KEY_BACKEND_HOST_PORT: &str = "NB_BACKEND_HOST_PORT";
pub const KEY_PUBLIC_DOMAIN: &str = "NB_PUBLIC_DOMAIN";
pub const KEY_TUNNEL_MODE: &str = "NB_TUNNEL_MODE";
pub const KEY_TUNNEL_NAME: &str = "NB_TUNNEL_NAME";
pub const KEY_TUNNEL_HOSTNAME: &str = "NB_TUNNEL_HOSTNAME";

/// How the public API hostname reaches the local backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// Persistent named tunnel with a config + credentials file.
    Named,
    /// Throwaway `*.trycloudflare.com` URL.
    Quick,
}

impl TunnelMode {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("quick") {
            TunnelMode::Quick
        } else {
            TunnelMode::Named
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TunnelMode::Named => "named",
            TunnelMode::Quick => "quick",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomeSettings {
    pub backend_port: u16,
    /// Whether `NB_BACKEND_HOST_PORT` is set at all.
    pub backend_port_explicit: bool,
    pub public_domain: String,
    pub api_hostname: String,
    pub tunnel_mode: TunnelMode,
    pub tunnel_name: String,
}

impl HomeSettings {
    pub fn from_env(env: &EnvMap) -> Self {
        let raw_port = env.get(KEY_BACKEND_HOST_PORT).map(|s| s.trim()).unwrap_or_default();
        Self {
            backend_port: parse_port(raw_port, DEFAULT_BACKEND_HOST_PORT),
            backend_port_explicit: !raw_port.is_empty(),
            public_domain: env_str(env, KEY_PUBLIC_DOMAIN, DEFAULT_PUBLIC_DOMAIN),
            api_hostname: env_str(env, KEY_TUNNEL_HOSTNAME, DEFAULT_API_HOSTNAME),
            tunnel_mode: TunnelMode::parse(&env_str(env, KEY_TUNNEL_MODE, "named")),
            tunnel_name: env_str(env, KEY_TUNNEL_NAME, DEFAULT_TUNNEL_NAME),
        }
    }

    pub fn local_health_url(&self) -> String {
        format!("http://127.0.0.1:{}/health", self.backend_port)
    }

    pub fn public_api_health_url(&self) -> String {
        format!("https://{}/api/health", self.api_hostname)
    }

    pub fn frontend_url(&self) -> String {
        format!("https://{}", self.public_domain)
    }

    pub fn needs_named_tunnel(&self) -> bool {
        self.tunnel_mode != TunnelMode::Quick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_env() {
        let s = HomeSettings::from_env(&EnvMap::new());
        assert_eq!(s.backend_port, 18080);
        assert!(!s.backend_port_explicit);
        assert_eq!(s.tunnel_mode, TunnelMode::Named);
        assert_eq!(s.public_api_health_url(), "https://api.naibao.me/api/health");
    }

    #[test]
    fn quick_mode_and_port() {
        let mut env = EnvMap::new();
        env.insert("NB_TUNNEL_MODE".into(), "Quick".into());
        env.insert("NB_BACKEND_HOST_PORT".into(), "18082".into());
        let s = HomeSettings::from_env(&env);
        assert_eq!(s.tunnel_mode, TunnelMode::Quick);
        assert!(!s.needs_named_tunnel());
        assert_eq!(s.local_health_url(), "http://127.0.0.1:18082/health");
    }
}
