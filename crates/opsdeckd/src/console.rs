//! Console assembly: probes, status, actions, alert daemon and listener.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use opsdeck_action::ActionExecutor;
use opsdeck_alert::{AlertDaemon, ProbeObserver};
use opsdeck_api::ApiState;
use opsdeck_core::Layout;
use opsdeck_probe::{Probes, SystemRunner};
use opsdeck_status::{ProbeSnapshotSource, StatusAggregator};

/// Every long-lived component of one console process.
pub struct Console {
    pub layout: Layout,
    pub probes: Arc<Probes>,
    pub state: ApiState,
    pub shutdown_tx: watch::Sender<bool>,
}

impl Console {
    pub fn new(layout: Layout) -> Self {
        let runner = Arc::new(SystemRunner::new(layout.root.clone()));
        let probes = Arc::new(Probes::new(layout.clone(), runner));
        let (shutdown_tx, _) = watch::channel(false);

        let source = Arc::new(ProbeSnapshotSource::new(probes.clone()));
        let status = Arc::new(StatusAggregator::new(source, layout.root.display().to_string()));
        let actions = Arc::new(
            ActionExecutor::new(probes.clone(), probes.http().clone()).with_shutdown(shutdown_tx.clone()),
        );

        Self {
            layout,
            probes,
            state: ApiState::new(status, actions),
            shutdown_tx,
        }
    }

    /// Start the alert loop; it stops when the shutdown channel flips.
    pub fn spawn_alert_daemon(&self) -> tokio::task::JoinHandle<()> {
        let observer = Arc::new(ProbeObserver::new(self.probes.clone()));
        let daemon = AlertDaemon::new(self.layout.clone(), observer, self.probes.http().clone());
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move { daemon.run(shutdown).await })
    }
}

/// Outcome of claiming the console port.
pub enum Bound {
    Listening(TcpListener),
    /// A console for the same root already serves this address.
    AlreadyRunning(String),
}

/// Bind `addr`; when taken, defer to a console for the same root or fall
/// back to an OS-assigned port.
pub async fn bind_console(addr: SocketAddr, root_dir: &str) -> io::Result<Bound> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(Bound::Listening(listener)),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            let url = format!("http://{addr}/");
            if console_serves_root(addr, root_dir).await {
                return Ok(Bound::AlreadyRunning(url));
            }
            let listener = TcpListener::bind(SocketAddr::new(addr.ip(), 0)).await?;
            warn!(
                requested = addr.port(),
                actual = listener.local_addr()?.port(),
                "console port in use, switched"
            );
            Ok(Bound::Listening(listener))
        }
        Err(e) => Err(e),
    }
}

/// Whether `addr` answers `/api/status` with our `root_dir`.
pub async fn console_serves_root(addr: SocketAddr, root_dir: &str) -> bool {
    let url = format!("http://{addr}/api/status");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(1200))
        .build()
        .unwrap_or_default();
    let response = match client.get(&url).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            debug!(status = %r.status(), "port owner is not a console");
            return false;
        }
        Err(e) => {
            debug!(error = %e, "port owner did not answer");
            return false;
        }
    };
    match response.json::<serde_json::Value>().await {
        Ok(body) => body.get("root_dir").and_then(|v| v.as_str()) == Some(root_dir),
        Err(_) => false,
    }
}

/// Console PID/port files, removed when dropped.
pub struct RuntimeFiles {
    layout: Layout,
}

impl RuntimeFiles {
    pub fn write(layout: &Layout, port: u16) -> Self {
        let written = layout
            .ensure_runtime_dir()
            .map_err(io::Error::other)
            .and_then(|()| fs::write(&layout.console_pid, std::process::id().to_string()))
            .and_then(|()| fs::write(&layout.console_port, port.to_string()));
        if let Err(e) = written {
            warn!(error = %e, "cannot write console runtime files");
        }
        Self { layout: layout.clone() }
    }
}

impl Drop for RuntimeFiles {
    fn drop(&mut self) {
        for path in [&self.layout.console_pid, &self.layout.console_port] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "cannot remove runtime file");
                }
            }
        }
        info!("console runtime files removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_files_are_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        {
            let _files = RuntimeFiles::write(&layout, 17623);
            assert_eq!(fs::read_to_string(&layout.console_port).unwrap(), "17623");
            assert_eq!(
                fs::read_to_string(&layout.console_pid).unwrap(),
                std::process::id().to_string()
            );
        }
        assert!(!layout.console_pid.exists());
        assert!(!layout.console_port.exists());
    }

    #[tokio::test]
    async fn busy_port_without_console_falls_back() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        match bind_console(addr, "/srv/app").await.unwrap() {
            Bound::Listening(listener) => assert_ne!(listener.local_addr().unwrap().port(), addr.port()),
            Bound::AlreadyRunning(_) => panic!("a bare socket is not a console"),
        }
    }
}
