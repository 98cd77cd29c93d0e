//! opsdeck-probe — independent, cacheable health probes.
//!
//! Each probe reads current config, touches one external system and
//! returns a structured value. Internal steps use [`ProbeResult`]; the
//! public probe folds any error into an `ok: false` value with a
//! humanized message, so callers never handle probe failures.
//!
//! # Architecture
//!
//! ```text
//! Probes
//!   ├── Layout            (paths under the deployment root)
//!   ├── CommandRunner     docker · lsof · dig · git · cloudflared · sysctl
//!   ├── reqwest::Client   HTTP health checks, DNS-over-HTTPS
//!   └── ProbeCache        per-key TTL cache shared by callers
//! ```

pub mod cache;
pub mod dns;
pub mod docker;
pub mod error;
pub mod git;
pub mod host;
pub mod http;
pub mod ports;
pub mod process;
pub mod runner;
pub mod scripted;
pub mod tunnel;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use opsdeck_core::{EnvMap, HomeSettings, Layout, read_env_file};

pub use cache::ProbeCache;
pub use error::{ProbeError, ProbeResult};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use scripted::ScriptedRunner;

/// Pass/fail outcome with an operator-facing message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Check {
    pub ok: bool,
    pub message: String,
}

impl Check {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }

    /// Fold an internal error into a failed check.
    pub fn from_error(err: &ProbeError) -> Self {
        Self::fail(opsdeck_core::humanize_error(&err.chain_text()))
    }
}

/// Shared probe context. Cheap to share behind an `Arc`.
pub struct Probes {
    layout: Layout,
    runner: Arc<dyn CommandRunner>,
    http: reqwest::Client,
    cache: ProbeCache,
    started: tokio::time::Instant,
}

impl Probes {
    pub fn new(layout: Layout, runner: Arc<dyn CommandRunner>) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();
        Self::with_http_client(layout, runner, http)
    }

    pub fn with_http_client(
        layout: Layout,
        runner: Arc<dyn CommandRunner>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            layout,
            runner,
            http,
            cache: ProbeCache::new(),
            started: tokio::time::Instant::now(),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Cached probe call; see [`ProbeCache::get_or_refresh`].
    pub async fn cached<T, F, Fut>(&self, key: &str, ttl_secs: u64, fetch: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.cache
            .get_or_refresh(key, Duration::from_secs(ttl_secs), fetch)
            .await
    }

    /// Deployment env, re-read on every call.
    pub fn home_env(&self) -> EnvMap {
        read_env_file(&self.layout.home_env)
    }

    pub fn home_settings(&self) -> HomeSettings {
        HomeSettings::from_env(&self.home_env())
    }

    /// Seconds since this probe context was created.
    pub fn process_uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
