//! One-click publish: stage a fixed path set, commit with a generated
//! changelog and push `main`.
//!
//! Every step's output is kept in the reply detail so a failed publish
//! can be diagnosed from the console alone.

use std::fs;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use opsdeck_core::{OpsReply, humanize_git_error};
use opsdeck_probe::git::{FRONTEND_PUBLISH_PATHS, WORKFLOW_PATHS, git_spec};
use opsdeck_probe::{CommandOutput, Probes};

use crate::error::ActionResult;
use crate::spawn::remove_quietly;

const PUBLISH_BRANCH: &str = "main";
const MAX_LISTED_FILES: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishKind {
    Workflow,
    Frontend,
}

impl PublishKind {
    pub fn paths(self) -> &'static [&'static str] {
        match self {
            PublishKind::Workflow => WORKFLOW_PATHS,
            PublishKind::Frontend => FRONTEND_PUBLISH_PATHS,
        }
    }

    fn default_title(self) -> &'static str {
        match self {
            PublishKind::Workflow => "Publish: deploy workflow",
            PublishKind::Frontend => "Publish: frontend update",
        }
    }

    fn done_message(self) -> &'static str {
        match self {
            PublishKind::Workflow => "Pushed to GitHub (deploy workflow updated)",
            PublishKind::Frontend => "Pushed to GitHub (Actions will deploy the frontend)",
        }
    }
}

/// One `git diff --name-status` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEntry {
    Path { status: String, path: String },
    /// Renames and copies.
    Moved { status: String, old: String, new: String },
}

impl ChangeEntry {
    fn status(&self) -> &str {
        match self {
            ChangeEntry::Path { status, .. } | ChangeEntry::Moved { status, .. } => status,
        }
    }
}

pub fn parse_name_status(raw: &str) -> Vec<ChangeEntry> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = if line.contains('\t') {
                line.split('\t').map(str::trim).collect()
            } else {
                line.split_whitespace().collect()
            };
            let status = (*parts.first()?).to_string();
            let field = |i: usize| parts.get(i).copied().unwrap_or_default().to_string();
            let kind = status.chars().next().map(|c| c.to_ascii_uppercase());
            Some(match kind {
                Some('R' | 'C') => ChangeEntry::Moved {
                    old: field(1),
                    new: field(2),
                    status,
                },
                _ => ChangeEntry::Path { path: field(1), status },
            })
        })
        .collect()
}

fn verb(status: &str) -> &'static str {
    match status.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('A') => "Added",
        Some('M') => "Modified",
        Some('D') => "Deleted",
        Some('R') => "Renamed",
        Some('C') => "Copied",
        Some('T') => "Type changed",
        Some('U') => "Unmerged",
        _ => "Changed",
    }
}

pub fn changelog(entries: &[ChangeEntry]) -> String {
    if entries.is_empty() {
        return "Changelog:\n- none (push only)".into();
    }
    let mut lines = vec!["Changelog:".to_string()];
    for entry in entries {
        let v = verb(entry.status());
        let line = match entry {
            ChangeEntry::Moved { old, new, .. } if !old.is_empty() && !new.is_empty() => {
                format!("- {v} {old} -> {new}")
            }
            ChangeEntry::Moved { old, new, .. } => {
                let name = [old, new].into_iter().find(|s| !s.is_empty()).map_or("(unknown)", String::as_str);
                format!("- {v} {name}")
            }
            ChangeEntry::Path { path, .. } if path.is_empty() => format!("- {v} (unknown)"),
            ChangeEntry::Path { path, .. } => format!("- {v} {path}"),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// First line of `title` as the subject; time, file count and changelog
/// in the body.
pub fn commit_message(title: &str, entries: &[ChangeEntry], now: &DateTime<Local>) -> String {
    let subject = title.lines().next().map(str::trim).filter(|s| !s.is_empty()).unwrap_or("Publish");
    format!(
        "{subject}\n\nTime: {}\nFiles: {}\n\n{}",
        now.format("%Y-%m-%d %H:%M"),
        entries.len(),
        changelog(entries)
    )
}

/// `== title ==` sections joined by blank lines.
#[derive(Default)]
struct StepLog(Vec<String>);

impl StepLog {
    /// Record a step; steps without output are left out.
    fn add(&mut self, title: &str, out: &str) {
        let out = out.trim();
        if out.is_empty() {
            return;
        }
        self.0.push(format!("== {title} =="));
        self.0.push(out.to_string());
    }

    fn text(&self) -> String {
        self.0.join("\n\n").trim().to_string()
    }

    fn fail(&mut self, step: &str, out: &CommandOutput) -> OpsReply {
        let raw = if out.text().is_empty() {
            format!("exit={}", out.code.unwrap_or(-1))
        } else {
            out.text().to_string()
        };
        self.add(step, &raw);
        OpsReply::failure(humanize_git_error(&raw)).with_detail(self.text())
    }
}

async fn git(probes: &Probes, args: &[&str], timeout_secs: u64) -> ActionResult<CommandOutput> {
    let spec = git_spec(args.iter().copied()).timeout_secs(timeout_secs);
    Ok(probes.runner().run(&spec).await?)
}

fn with_paths<'a>(head: &[&'a str], paths: &[&'a str]) -> Vec<&'a str> {
    let mut args = head.to_vec();
    args.push("--");
    args.extend_from_slice(paths);
    args
}

pub async fn git_publish(probes: &Probes, kind: PublishKind, user_title: &str) -> ActionResult<OpsReply> {
    let mut log = StepLog::default();
    let paths = kind.paths();

    let branch = probes.git_branch().await;
    if !branch.is_empty() && branch != PUBLISH_BRANCH {
        let msg = format!(
            "Current branch is {branch}; switch to {PUBLISH_BRANCH} before publishing (auto-deploy watches {PUBLISH_BRANCH})"
        );
        log.add("Branch check", &msg);
        return Ok(OpsReply::failure(msg).with_detail(log.text()));
    }

    if let Ok(before) = probes.git(&["status", "-sb"], 8).await {
        log.add("Before · git status", &before);
    }

    let add = git(probes, &with_paths(&["add"], paths), 60).await?;
    if !add.success() {
        return Ok(log.fail("git add", &add));
    }
    log.add("git add", add.text());

    let staged = git(probes, &with_paths(&["diff", "--cached", "--name-only"], paths), 12).await?;
    let staged_files: Vec<&str> = staged.text().lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if !staged_files.is_empty() {
        let listed: Vec<&str> = staged_files.iter().take(MAX_LISTED_FILES).copied().collect();
        log.add("Staged files", &listed.join("\n"));

        let ns = git(probes, &with_paths(&["diff", "--cached", "--name-status"], paths), 18).await?;
        let entries = parse_name_status(&ns.output);
        let title = match user_title.trim() {
            "" => kind.default_title(),
            t => t,
        };
        let message = commit_message(title, &entries, &Local::now());
        log.add("Commit message (generated)", &message);

        let layout = probes.layout();
        layout.ensure_runtime_dir()?;
        let msg_file = layout.runtime_dir.join(format!(
            "gitmsg_{}_{}.txt",
            std::process::id(),
            Local::now().timestamp_millis()
        ));
        fs::write(&msg_file, format!("{message}\n"))?;
        let msg_path = msg_file.display().to_string();
        let commit = git(probes, &["commit", "-F", &msg_path], 90).await;
        remove_quietly(&msg_file);
        let commit = commit?;

        if !commit.success() && !commit.text().to_lowercase().contains("nothing to commit") {
            return Ok(log.fail("git commit", &commit));
        }
        log.add("git commit", commit.text());
    }

    // HEAD may be ahead even when nothing was staged.
    let push = git(probes, &["push", "origin", PUBLISH_BRANCH], 180).await?;
    if !push.success() {
        warn!(kind = ?kind, "publish push rejected");
        return Ok(log.fail("git push", &push));
    }
    log.add("git push", push.text());

    if let Ok(after) = probes.git(&["status", "-sb"], 8).await {
        log.add("After · git status", &after);
    }

    info!(kind = ?kind, files = staged_files.len(), "published");
    Ok(OpsReply::success(kind.done_message()).with_detail(log.text()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use opsdeck_core::Layout;
    use opsdeck_probe::ScriptedRunner;

    #[test]
    fn name_status_parsing() {
        let raw = "M\tfrontend/src/App.vue\nR100\tfrontend/a.js\tfrontend/b.js\nA  frontend/new.js\n\n";
        let entries = parse_name_status(raw);
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[1],
            ChangeEntry::Moved {
                status: "R100".into(),
                old: "frontend/a.js".into(),
                new: "frontend/b.js".into()
            }
        );
        assert_eq!(
            changelog(&entries),
            "Changelog:\n- Modified frontend/src/App.vue\n- Renamed frontend/a.js -> frontend/b.js\n- Added frontend/new.js"
        );
        assert_eq!(changelog(&[]), "Changelog:\n- none (push only)");
    }

    #[test]
    fn commit_message_layout() {
        let now = Local.with_ymd_and_hms(2026, 3, 4, 9, 5, 0).unwrap();
        let entries = parse_name_status("D\tfrontend/old.css");
        let msg = commit_message("  Fix header\nsecond line", &entries, &now);
        assert_eq!(
            msg,
            "Fix header\n\nTime: 2026-03-04 09:05\nFiles: 1\n\nChangelog:\n- Deleted frontend/old.css"
        );
        assert!(commit_message("", &[], &now).starts_with("Publish\n\n"));
    }

    fn probes(dir: &std::path::Path, runner: ScriptedRunner) -> (Probes, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        (Probes::new(Layout::new(dir), runner.clone()), runner)
    }

    #[tokio::test]
    async fn refuses_other_branches() {
        let dir = tempfile::tempdir().unwrap();
        let (p, runner) = probes(
            dir.path(),
            ScriptedRunner::new().on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("feature/x\n")),
        );
        let reply = git_publish(&p, PublishKind::Frontend, "").await.unwrap();
        assert!(!reply.ok);
        assert!(reply.message.starts_with("Current branch is feature/x"));
        assert!(reply.detail.starts_with("== Branch check =="));
        assert!(!runner.calls().iter().any(|c| c.contains("push")));
    }

    #[tokio::test]
    async fn full_publish_commits_and_pushes() {
        let dir = tempfile::tempdir().unwrap();
        let (p, runner) = probes(
            dir.path(),
            ScriptedRunner::new()
                .on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("main"))
                .on("git status -sb", CommandOutput::ok("## main...origin/main"))
                .on("git add --", CommandOutput::ok(""))
                .on("--name-only", CommandOutput::ok(".github/workflows/pages.yml\n"))
                .on("--name-status", CommandOutput::ok("M\t.github/workflows/pages.yml\n"))
                .on("git commit -F", CommandOutput::ok("[main abc123] Bump node"))
                .on("git push origin main", CommandOutput::ok("main -> main")),
        );
        let reply = git_publish(&p, PublishKind::Workflow, "Bump node").await.unwrap();
        assert!(reply.ok, "{reply:?}");
        assert_eq!(reply.message, "Pushed to GitHub (deploy workflow updated)");
        assert!(reply.detail.contains("== Commit message (generated) ==\n\nBump node\n\nTime: "));
        assert!(reply.detail.contains("- Modified .github/workflows/pages.yml"));
        assert!(reply.detail.contains("== git push ==\n\nmain -> main"));

        let calls = runner.calls();
        assert!(calls.iter().any(|c| c == "git add -- .github/workflows/pages.yml"));
        let push_at = calls.iter().position(|c| c.contains("push")).unwrap();
        let commit_at = calls.iter().position(|c| c.contains("commit -F")).unwrap();
        assert!(commit_at < push_at);
        // the message file is cleaned up
        let leftovers = fs::read_dir(&p.layout().runtime_dir).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn nothing_to_commit_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let (p, _) = probes(
            dir.path(),
            ScriptedRunner::new()
                .on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("main"))
                .on("git add --", CommandOutput::ok(""))
                .on("--name-only", CommandOutput::ok("frontend/src/main.js"))
                .on("--name-status", CommandOutput::ok("M\tfrontend/src/main.js"))
                .on("git commit", CommandOutput::failed(1, "nothing to commit, working tree clean"))
                .on("git push", CommandOutput::ok("")),
        );
        let reply = git_publish(&p, PublishKind::Frontend, "").await.unwrap();
        assert!(reply.ok, "{reply:?}");
    }

    #[tokio::test]
    async fn rejected_push_is_humanized() {
        let dir = tempfile::tempdir().unwrap();
        let (p, _) = probes(
            dir.path(),
            ScriptedRunner::new()
                .on("git rev-parse --abbrev-ref HEAD", CommandOutput::ok("main"))
                .on("git add --", CommandOutput::ok(""))
                .on("--name-only", CommandOutput::ok(""))
                .on(
                    "git push",
                    CommandOutput::failed(1, " ! [rejected] main -> main (fetch first)"),
                ),
        );
        let reply = git_publish(&p, PublishKind::Frontend, "").await.unwrap();
        assert!(!reply.ok);
        assert!(reply.message.starts_with("Push rejected"));
        assert!(reply.detail.ends_with("== git push ==\n\n! [rejected] main -> main (fetch first)"));
    }
}
