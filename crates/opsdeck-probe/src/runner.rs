//! External command execution.
//!
//! Every shell-out in the console goes through [`CommandRunner`], so
//! tests can substitute scripted output for docker, git, lsof and friends.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ProbeError, ProbeResult};

/// Directories searched when a tool is not on `PATH` (GUI-launched
/// processes often get a minimal one).
const FALLBACK_BIN_DIRS: &[&str] = &[
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/usr/bin",
    "/Applications/Docker.app/Contents/Resources/bin",
    "/Applications/OrbStack.app/Contents/MacOS/xbin",
];

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: Duration::from_secs(10),
            env: Vec::new(),
        }
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Shell-like rendering for logs and action details.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command. stdout and stderr are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            output: output.into(),
        }
    }

    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn text(&self) -> &str {
        self.output.trim()
    }

    /// Convert a non-zero exit into [`ProbeError::Exit`].
    pub fn into_result(self) -> ProbeResult<String> {
        if self.success() {
            Ok(self.output.trim().to_string())
        } else {
            Err(ProbeError::Exit {
                code: self.code,
                output: self.output,
            })
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion (or timeout).
    async fn run(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput>;

    /// Resolve a program name to an executable path.
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Run and fold non-zero exits into an error.
pub async fn capture(runner: &dyn CommandRunner, spec: &CommandSpec) -> ProbeResult<String> {
    runner.run(spec).await?.into_result()
}

/// Production runner backed by `tokio::process`.
pub struct SystemRunner {
    cwd: PathBuf,
}

impl SystemRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput> {
        let program = if spec.program.contains('/') {
            PathBuf::from(&spec.program)
        } else {
            self.locate(&spec.program)
                .ok_or_else(|| ProbeError::NotFound(spec.program.clone()))?
        };

        let child = tokio::process::Command::new(&program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        debug!(command = %spec.display(), "running");

        let out = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProbeError::Timeout {
                    program: spec.program.clone(),
                    secs: spec.timeout.as_secs(),
                });
            }
        };

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.trim().is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&stderr);
        }

        Ok(CommandOutput {
            code: out.status.code(),
            output,
        })
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        if let Ok(path) = which::which(program) {
            return Some(path);
        }
        let mut candidates: Vec<PathBuf> = FALLBACK_BIN_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(program))
            .collect();
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".orbstack").join("bin").join(program));
        }
        candidates.into_iter().find(|p| p.is_file())
    }
}
