//! opsdeckd — the local ops console.
//!
//! One process per deployment root:
//! - HTTP console (status, logs, alert settings, actions)
//! - Non-blocking status aggregator (warmed up at start)
//! - Alert daemon loop
//!
//! # Usage
//!
//! ```text
//! opsdeckd --root ~/src/app --bind 127.0.0.1 --port 17623
//! ```
//!
//! Exit codes: `0` normal shutdown (or a console for this root is already
//! running), `1` runtime failure, `2` compose file missing.

mod console;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use opsdeck_core::Layout;
use opsdeck_core::bootstrap::ensure_home_env_file;

use crate::console::{Bound, Console, RuntimeFiles, bind_console};

#[derive(Parser)]
#[command(name = "opsdeckd", about = "Local ops console for a docker-compose home deployment")]
struct Cli {
    /// Deployment root (must contain deploy/docker-compose.home.yml).
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on; an OS-assigned port is used when taken.
    #[arg(long, default_value = "17623")]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,opsdeckd=debug,opsdeck=debug")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = format!("{e:#}"), "console failed");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let root = std::fs::canonicalize(&cli.root).unwrap_or(cli.root);
    let layout = Layout::new(root);

    if !layout.compose_file.is_file() {
        error!(path = %layout.compose_file.display(), "compose file missing");
        return Ok(ExitCode::from(2));
    }

    layout.ensure_runtime_dir()?;
    if ensure_home_env_file(&layout)? {
        info!(path = %layout.home_env.display(), "deployment env generated");
    }

    let root_dir = layout.root.display().to_string();
    let listener = match bind_console(SocketAddr::new(cli.bind, cli.port), &root_dir).await? {
        Bound::Listening(listener) => listener,
        Bound::AlreadyRunning(url) => {
            info!(%url, "console already running for this root");
            return Ok(ExitCode::SUCCESS);
        }
    };
    let addr = listener.local_addr()?;
    info!(url = %format!("http://{addr}/"), root = %root_dir, "console running");

    let console = Console::new(layout);
    let _runtime_files = RuntimeFiles::write(&console.layout, addr.port());

    // Warm up so the first page load is not a placeholder for long.
    console.state.status.trigger_refresh(true);
    let alerts_handle = console.spawn_alert_daemon();

    let router = opsdeck_api::build_router(console.state.clone());
    let shutdown_tx = console.shutdown_tx.clone();
    let mut requested = console.shutdown_tx.subscribe();

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let ctrl_c = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot install Ctrl-C handler");
                    std::future::pending::<()>().await;
                }
            };
            let from_console = async {
                let _ = requested.wait_for(|stop| *stop).await;
            };
            tokio::select! {
                _ = ctrl_c => info!("shutdown signal received"),
                _ = from_console => info!("shutdown requested from the console"),
            }
            shutdown_tx.send_replace(true);
        })
        .await?;

    let _ = alerts_handle.await;
    info!("console stopped");
    Ok(ExitCode::SUCCESS)
}
