//! Git repository probes: commit, branch, origin, sync counts and
//! scoped change summaries.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::Probes;
use crate::error::ProbeResult;
use crate::runner::{CommandSpec, capture};

/// Files covered by "publish workflow".
pub const WORKFLOW_PATHS: &[&str] = &[".github/workflows/pages.yml"];

/// Frontend sources watched for uncommitted changes.
pub const FRONTEND_SCOPE: &[&str] = &[
    "frontend/src",
    "frontend/index.html",
    "frontend/package.json",
    "frontend/package-lock.json",
    "frontend/vite.config.js",
    "frontend/.npmrc",
];

/// Files covered by "publish frontend": the sources plus the deploy workflow.
pub const FRONTEND_PUBLISH_PATHS: &[&str] = &[
    "frontend/src",
    "frontend/index.html",
    "frontend/package.json",
    "frontend/package-lock.json",
    "frontend/vite.config.js",
    "frontend/.npmrc",
    ".github/workflows/pages.yml",
];

static GITHUB_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:github\.com[/:])([^/]+)/([^/]+?)(?:\.git)?$").expect("static regex")
});

/// `git …` with interactive credential prompts disabled.
pub fn git_spec<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("git", args).env("GIT_TERMINAL_PROMPT", "0")
}

/// Links derived from a GitHub `origin` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GithubRepo {
    pub owner: String,
    pub repo: String,
    pub repo_url: String,
    pub pages_settings_url: String,
    pub actions_url: String,
    pub pages_workflow_url: String,
}

/// Accepts `https://github.com/o/r(.git)`, `git@github.com:o/r(.git)` and
/// `ssh://git@github.com/o/r(.git)`.
pub fn parse_github_remote(remote: &str) -> Option<GithubRepo> {
    let caps = GITHUB_REMOTE.captures(remote.trim())?;
    let owner = caps[1].trim().to_string();
    let repo = caps[2].trim().to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    let base = format!("https://github.com/{owner}/{repo}");
    Some(GithubRepo {
        pages_settings_url: format!("{base}/settings/pages"),
        actions_url: format!("{base}/actions"),
        pages_workflow_url: format!("{base}/actions/workflows/pages.yml"),
        repo_url: base,
        owner,
        repo,
    })
}

/// `(behind, ahead)` from `rev-list --left-right --count <ref>...HEAD`.
pub fn parse_left_right(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.split_whitespace();
    let behind = parts.next()?.parse().ok()?;
    let ahead = parts.next()?.parse().ok()?;
    Some((behind, ahead))
}

/// Paths from `status --porcelain=v1` lines; renames resolve to the new path.
pub fn parse_porcelain(text: &str) -> Vec<String> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let path = line.get(3..).unwrap_or(line).trim();
            let path = match path.split_once(" -> ") {
                Some((_, new)) => new.trim(),
                None => path,
            };
            (!path.is_empty()).then(|| path.to_string())
        })
        .collect()
}

/// Uncommitted changes within a path scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub ok: bool,
    pub count: usize,
    pub files: Vec<String>,
    pub message: String,
}

/// Repository sync metrics for the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitSync {
    pub commit: String,
    pub branch: String,
    pub origin: String,
    pub github: Option<GithubRepo>,
    pub behind: u32,
    pub ahead: u32,
}

impl Probes {
    /// Run git and return trimmed output, or the error.
    pub async fn git(&self, args: &[&str], timeout_secs: u64) -> ProbeResult<String> {
        let spec = git_spec(args.iter().copied()).timeout_secs(timeout_secs);
        capture(self.runner(), &spec).await
    }

    pub async fn git_commit(&self) -> String {
        self.git(&["rev-parse", "--short", "HEAD"], 4).await.unwrap_or_default()
    }

    pub async fn git_remote_origin(&self) -> String {
        self.git(&["remote", "get-url", "origin"], 4).await.unwrap_or_default()
    }

    /// Current branch; empty when detached or unknown.
    pub async fn git_branch(&self) -> String {
        match self.git(&["rev-parse", "--abbrev-ref", "HEAD"], 4).await {
            Ok(b) if b != "HEAD" => b,
            _ => String::new(),
        }
    }

    /// `(behind, ahead)` relative to `reference`; `(0, 0)` on failure.
    pub async fn git_ahead_behind(&self, reference: &str) -> (u32, u32) {
        let range = format!("{reference}...HEAD");
        self.git(&["rev-list", "--left-right", "--count", &range], 6)
            .await
            .ok()
            .and_then(|t| parse_left_right(&t))
            .unwrap_or((0, 0))
    }

    pub async fn git_porcelain(&self, paths: &[&str]) -> ProbeResult<String> {
        let mut args = vec!["status", "--porcelain=v1"];
        if !paths.is_empty() {
            args.push("--");
            args.extend_from_slice(paths);
        }
        self.git(&args, 8).await
    }

    pub async fn git_change_summary(&self, paths: &[&str], max_files: usize) -> ChangeSummary {
        match self.git_porcelain(paths).await {
            Ok(text) => {
                let mut files = parse_porcelain(&text);
                let count = files.len();
                files.truncate(max_files);
                ChangeSummary {
                    ok: true,
                    count,
                    files,
                    message: String::new(),
                }
            }
            Err(e) => ChangeSummary {
                message: e.chain_text(),
                ..ChangeSummary::default()
            },
        }
    }

    pub async fn git_file_exists_in_ref(&self, reference: &str, path: &str) -> bool {
        let object = format!("{reference}:{path}");
        self.git(&["cat-file", "-e", &object], 6).await.is_ok()
    }

    pub async fn git_sync(&self) -> GitSync {
        let (commit, branch, origin, (behind, ahead)) = tokio::join!(
            self.git_commit(),
            self.git_branch(),
            self.git_remote_origin(),
            self.git_ahead_behind("origin/main"),
        );
        GitSync {
            github: parse_github_remote(&origin),
            commit,
            branch,
            origin,
            behind,
            ahead,
        }
    }

    /// Operator-facing status for a scope: `""` (whole repo), `workflow`
    /// or `frontend`.
    pub async fn git_status_text(&self, scope: &str) -> String {
        let (heading, paths) = match scope.trim().to_lowercase().as_str() {
            "workflow" => ("Git status: deploy workflow", WORKFLOW_PATHS),
            "frontend" => ("Git status: frontend publish scope", FRONTEND_SCOPE),
            _ => return self.repo_status_text().await,
        };

        let mut status_args = vec!["status", "-sb", "--"];
        status_args.extend_from_slice(paths);
        let status = match self.git(&status_args, 10).await {
            Ok(s) => s,
            Err(e) => e.to_string(),
        };
        let mut lines = vec![format!("== {heading} =="), status];
        if let Ok(porcelain) = self.git_porcelain(paths).await {
            lines.push(String::new());
            lines.push(if porcelain.is_empty() { "(no changes)".into() } else { porcelain });
        }
        let text = lines.join("\n").trim().to_string();
        if text.is_empty() { "(no output)".into() } else { text }
    }

    async fn repo_status_text(&self) -> String {
        match self.git(&["status", "-sb"], 8).await {
            Ok(status) => {
                let (behind, ahead) = self.git_ahead_behind("origin/main").await;
                format!("{status}\n\n== Sync (origin/main) ==\nbehind: {behind}\nahead: {ahead}")
            }
            Err(e) => {
                let text = e.to_string();
                if text.trim().is_empty() {
                    "No git status available (is the root a git repository?)".into()
                } else {
                    text.trim().to_string()
                }
            }
        }
    }
}
