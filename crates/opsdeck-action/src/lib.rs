//! opsdeck-action — remediation actions behind `POST /api/action`.
//!
//! ```text
//!  {action, service} ──► Action::from_str ──► ActionExecutor::dispatch
//!                                                  │
//!            stack · tunnel · preview · publish · alert ops
//!                                                  │
//!                               ActionResult<OpsReply> (raw output)
//!                                                  ▼
//!                          normalize() ──► {ok, message, detail}
//! ```
//!
//! Actions always produce a reply. Unknown names, missing arguments and
//! tool failures all come back as `ok: false` with the raw text kept in
//! `detail`.

pub mod action;
pub mod error;
pub mod normalize;
pub mod preview;
pub mod publish;
pub mod spawn;
pub mod stack;
pub mod tunnel;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use opsdeck_core::OpsReply;
use opsdeck_core::bootstrap::ensure_home_env_file;
use opsdeck_probe::Probes;

pub use action::Action;
pub use error::{ActionError, ActionResult};
pub use normalize::normalize;
pub use preview::mobile_preview_logs;
pub use publish::PublishKind;
pub use stack::validate_backend_host_port;

pub struct ActionExecutor {
    probes: Arc<Probes>,
    client: reqwest::Client,
    shutdown: Option<watch::Sender<bool>>,
}

impl ActionExecutor {
    pub fn new(probes: Arc<Probes>, client: reqwest::Client) -> Self {
        Self {
            probes,
            client,
            shutdown: None,
        }
    }

    /// Let `ops_shutdown` flip this channel to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Sender<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn probes(&self) -> &Probes {
        &self.probes
    }

    /// Run the action named `name`. Never fails: every outcome is a reply.
    pub async fn execute(&self, name: &str, service: &str) -> OpsReply {
        let action = match name.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                warn!(action = name, "unknown action requested");
                let text = e.to_string();
                return OpsReply::failure(text.clone()).with_detail(text);
            }
        };
        let service = service.trim();
        info!(%action, service, "action requested");

        if action == Action::OpsShutdown {
            return self.request_shutdown();
        }

        if let Err(e) = ensure_home_env_file(self.probes.layout()) {
            warn!(error = %e, "cannot generate deployment env file");
        }

        let raw = match self.dispatch(action, service).await {
            Ok(reply) => reply,
            Err(e) => OpsReply::failure(e.raw_text()),
        };
        let reply = normalize(action, service, raw);
        if reply.ok {
            info!(%action, message = %reply.message, "action finished");
        } else {
            warn!(%action, message = %reply.message, "action failed");
        }
        reply
    }

    async fn dispatch(&self, action: Action, service: &str) -> ActionResult<OpsReply> {
        let probes = self.probes.as_ref();
        let layout = probes.layout();
        match action {
            Action::DockerUp => stack::docker_up(probes).await,
            Action::DockerDown => stack::docker_down(probes).await,
            Action::DockerRestart => stack::docker_restart(probes, service).await,
            Action::DockerRestartAll => stack::docker_restart_all(probes).await,
            Action::DockerStopContainer => stack::docker_stop_container(probes, service).await,
            Action::DockerPrune => stack::docker_prune(probes).await,
            Action::SetBackendPort => stack::set_backend_port(probes, service).await,

            Action::TunnelStart => tunnel::start_tunnel(probes).await,
            Action::TunnelStop => tunnel::stop_tunnel(probes).await,
            Action::TunnelRestart => {
                let stopped = tunnel::stop_tunnel(probes).await?;
                Ok(stopped.chain(tunnel::start_tunnel(probes).await?))
            }
            Action::NamedTunnelInit => tunnel::named_tunnel_init(probes).await,

            Action::MobilePreviewStart => preview::mobile_preview_start(probes).await,
            Action::MobilePreviewStop => preview::mobile_preview_stop(probes).await,
            Action::MobilePreviewRestart => {
                let stopped = preview::mobile_preview_stop(probes).await?;
                Ok(stopped.chain(preview::mobile_preview_start(probes).await?))
            }

            Action::GitPublishWorkflow => publish::git_publish(probes, PublishKind::Workflow, service).await,
            Action::GitPublishFrontend => publish::git_publish(probes, PublishKind::Frontend, service).await,

            Action::AlertsEnable => Ok(opsdeck_alert::ops::set_enabled(layout, true)),
            Action::AlertsDisable => Ok(opsdeck_alert::ops::set_enabled(layout, false)),
            Action::AlertsTest => Ok(opsdeck_alert::ops::send_test(layout, self.client.clone()).await),

            Action::OpsShutdown => Ok(self.request_shutdown()),
        }
    }

    fn request_shutdown(&self) -> OpsReply {
        match &self.shutdown {
            Some(tx) => {
                info!("console shutdown requested");
                tx.send_replace(true);
                OpsReply::success("Shutting down the console")
            }
            None => OpsReply::failure("Shutdown is not available in this process"),
        }
    }
}
