//! Detached helper processes with PID files and append-only logs.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use opsdeck_probe::process::{pid_status, terminate};

use crate::error::{ActionError, ActionResult};

/// A helper started in its own process group, outliving the console.
pub struct Detached {
    pub pid: u32,
    child: Child,
}

impl Detached {
    /// Spawn `program args…` in `cwd`, appending a banner and all output
    /// to `log`, and record the PID in `pid_file`.
    pub fn spawn(
        program: &Path,
        args: &[String],
        cwd: &Path,
        log: &Path,
        pid_file: &Path,
        banner: &str,
    ) -> ActionResult<Self> {
        if let Some(parent) = log.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = OpenOptions::new().create(true).append(true).open(log)?;
        let line = std::iter::once(program.display().to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "\n[ops] {banner}: {line}")?;
        out.flush()?;
        let err = out.try_clone()?;

        let program_text = program.display().to_string();
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err));
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| ActionError::Spawn {
            program: program_text.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();
        fs::write(pid_file, pid.to_string())?;
        info!(program = %program_text, pid, "helper started");
        Ok(Self { pid, child })
    }

    /// Wait `grace`, then report the exit status if the helper already quit.
    pub async fn early_exit(&mut self, grace: Duration) -> ActionResult<Option<ExitStatus>> {
        tokio::time::sleep(grace).await;
        Ok(self.child.try_wait()?)
    }
}

/// SIGTERM the helper recorded in `pid_file` (if alive), wait `grace`
/// and remove the file. Returns the PID that was recorded, if any.
pub async fn stop_pid_file(pid_file: &Path, grace: Duration) -> Option<u32> {
    let status = pid_status(pid_file);
    if status.pid == 0 {
        return None;
    }
    if status.alive && terminate(status.pid) {
        debug!(pid = status.pid, "sent SIGTERM");
        tokio::time::sleep(grace).await;
    }
    remove_quietly(pid_file);
    Some(status.pid)
}

pub fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "cannot remove file");
        }
    }
}

pub(crate) fn bash() -> PathBuf {
    PathBuf::from("bash")
}
