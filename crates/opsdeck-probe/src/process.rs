//! PID-file liveness and log tailing.

use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use serde::Serialize;

/// PID file contents plus a liveness probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PidStatus {
    /// `0` when the file is missing or unreadable.
    pub pid: u32,
    pub alive: bool,
}

/// Read a positive PID from `path`.
pub fn read_pid(path: &Path) -> Option<u32> {
    let text = fs::read_to_string(path).ok()?;
    match text.trim().parse::<i64>() {
        Ok(pid) if pid > 0 && pid <= i64::from(i32::MAX) => Some(pid as u32),
        _ => None,
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Zero-signal existence check. A process owned by another user
/// (`EPERM`) still counts as alive.
pub fn is_pid_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };
    matches!(kill(pid, None), Ok(()) | Err(Errno::EPERM))
}

pub fn pid_status(path: &Path) -> PidStatus {
    match read_pid(path) {
        Some(pid) => PidStatus {
            pid,
            alive: is_pid_alive(pid),
        },
        None => PidStatus::default(),
    }
}

/// Send SIGTERM. Returns whether the signal was delivered.
pub fn terminate(pid: u32) -> bool {
    to_pid(pid).is_some_and(|pid| kill(pid, Signal::SIGTERM).is_ok())
}

/// Last `lines` lines of a text file; empty when unreadable.
pub fn tail_file(path: &Path, lines: usize) -> String {
    let Ok(file) = fs::File::open(path) else {
        return String::new();
    };
    let mut window: VecDeque<String> = VecDeque::with_capacity(lines + 1);
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        window.push_back(line);
        if window.len() > lines {
            window.pop_front();
        }
    }
    Vec::from(window).join("\n")
}

/// First non-empty line of a file, trimmed.
pub fn read_first_line(path: &Path) -> String {
    fs::read_to_string(path)
        .ok()
        .and_then(|t| t.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string))
        .unwrap_or_default()
}
