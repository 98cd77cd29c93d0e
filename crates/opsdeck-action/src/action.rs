//! Wire names of the console's remediation actions.

use std::fmt;
use std::str::FromStr;

use crate::error::ActionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    DockerUp,
    DockerDown,
    DockerRestart,
    DockerRestartAll,
    DockerStopContainer,
    DockerPrune,
    TunnelStart,
    TunnelStop,
    TunnelRestart,
    NamedTunnelInit,
    MobilePreviewStart,
    MobilePreviewStop,
    MobilePreviewRestart,
    GitPublishWorkflow,
    GitPublishFrontend,
    SetBackendPort,
    AlertsEnable,
    AlertsDisable,
    AlertsTest,
    OpsShutdown,
}

impl Action {
    pub const ALL: [Action; 20] = [
        Action::DockerUp,
        Action::DockerDown,
        Action::DockerRestart,
        Action::DockerRestartAll,
        Action::DockerStopContainer,
        Action::DockerPrune,
        Action::TunnelStart,
        Action::TunnelStop,
        Action::TunnelRestart,
        Action::NamedTunnelInit,
        Action::MobilePreviewStart,
        Action::MobilePreviewStop,
        Action::MobilePreviewRestart,
        Action::GitPublishWorkflow,
        Action::GitPublishFrontend,
        Action::SetBackendPort,
        Action::AlertsEnable,
        Action::AlertsDisable,
        Action::AlertsTest,
        Action::OpsShutdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::DockerUp => "docker_up",
            Action::DockerDown => "docker_down",
            Action::DockerRestart => "docker_restart",
            Action::DockerRestartAll => "docker_restart_all",
            Action::DockerStopContainer => "docker_stop_container",
            Action::DockerPrune => "docker_prune",
            Action::TunnelStart => "tunnel_start",
            Action::TunnelStop => "tunnel_stop",
            Action::TunnelRestart => "tunnel_restart",
            Action::NamedTunnelInit => "named_tunnel_init",
            Action::MobilePreviewStart => "mobile_preview_start",
            Action::MobilePreviewStop => "mobile_preview_stop",
            Action::MobilePreviewRestart => "mobile_preview_restart",
            Action::GitPublishWorkflow => "git_publish_workflow",
            Action::GitPublishFrontend => "git_publish_frontend",
            Action::SetBackendPort => "set_backend_port",
            Action::AlertsEnable => "alerts_enable",
            Action::AlertsDisable => "alerts_disable",
            Action::AlertsTest => "alerts_test",
            Action::OpsShutdown => "ops_shutdown",
        }
    }

    pub fn is_git_publish(self) -> bool {
        matches!(self, Action::GitPublishWorkflow | Action::GitPublishFrontend)
    }
}

impl FromStr for Action {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_wire_name_parses_back() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!(" docker_up ".parse::<Action>().unwrap(), Action::DockerUp);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = "open_docker".parse::<Action>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: open_docker");
        assert!("".parse::<Action>().is_err());
    }
}
