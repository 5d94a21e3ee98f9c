//! VCS Port
//!
//! The narrow version-control interface the sync engine depends on, and
//! `GitCli`, the production adapter that shells out to `git`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::utils::error::{AppError, AppResult};

use super::types::{BranchInfo, CommitInfo, MergeStateKind};

/// Outcome of a merge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// The merge stopped with these unmerged paths
    Conflicted(Vec<String>),
    /// The merge failed for another reason (unknown branch, dirty tree, ...)
    Failed(String),
}

/// Version-control operations used by the sync engine.
///
/// Paths passed in and returned are repo-relative with `/` separators.
pub trait VcsPort: Send + Sync {
    fn init(&self, repo: &Path) -> AppResult<()>;

    /// Tracked plus untracked-not-ignored files, sorted, VCS internals excluded
    fn list_files(&self, repo: &Path) -> AppResult<Vec<String>>;

    fn list_branches(&self, repo: &Path) -> AppResult<Vec<BranchInfo>>;

    /// Newest first; empty for a repository without commits
    fn log(&self, repo: &Path, limit: usize) -> AppResult<Vec<CommitInfo>>;

    /// `None` when HEAD is detached
    fn current_branch(&self, repo: &Path) -> AppResult<Option<String>>;

    fn checkout(&self, repo: &Path, branch: &str) -> AppResult<()>;

    fn create_branch(&self, repo: &Path, name: &str, base: Option<&str>) -> AppResult<()>;

    fn merge(&self, repo: &Path, branch: &str) -> AppResult<MergeOutcome>;

    fn stage(&self, repo: &Path, paths: &[String]) -> AppResult<()>;

    /// Commit the index; returns the new commit's SHA
    fn commit(&self, repo: &Path, message: &str) -> AppResult<String>;

    fn staged_files(&self, repo: &Path) -> AppResult<Vec<String>>;

    fn unmerged_paths(&self, repo: &Path) -> AppResult<Vec<String>>;

    fn merge_state(&self, repo: &Path) -> AppResult<MergeStateKind>;

    fn hooks_dir(&self, repo: &Path) -> AppResult<PathBuf>;
}

/// Result of a git command execution
#[derive(Debug)]
pub struct GitResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl GitResult {
    /// Check if the command was successful and return stdout or error
    pub fn into_result(self) -> AppResult<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(AppError::external_tool(
                "git",
                self.exit_code,
                self.stderr.trim(),
            ))
        }
    }
}

/// Production adapter: runs the `git` binary
#[derive(Debug, Default, Clone)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    /// Whether a usable `git` binary is on PATH
    pub fn is_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Execute a git command in the specified directory
    pub fn execute(&self, cwd: &Path, args: &[&str]) -> AppResult<GitResult> {
        tracing::debug!("[GitSync] git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            // Disable interactive prompts so hooks and tests never hang
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "never")
            .output()
            .map_err(|e| AppError::external_tool("git", -1, format!("failed to execute git: {}", e)))?;

        Ok(GitResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn run(&self, cwd: &Path, args: &[&str]) -> AppResult<String> {
        self.execute(cwd, args)?.into_result()
    }

    /// Resolve a `rev-parse` path output against the repository
    fn rev_parse_path(&self, repo: &Path, args: &[&str]) -> AppResult<PathBuf> {
        let output = self.run(repo, args)?;
        let raw = output.trim();
        let path = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            repo.join(raw)
        };
        Ok(path)
    }

    fn has_head(&self, repo: &Path) -> AppResult<bool> {
        Ok(self
            .execute(repo, &["rev-parse", "--verify", "--quiet", "HEAD"])?
            .success)
    }
}

/// Split NUL-separated `-z` output into unique, sorted paths
fn split_nul_paths(output: &str) -> Vec<String> {
    output
        .split('\0')
        .map(str::trim_end)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn is_vcs_internal(path: &str) -> bool {
    path.split('/').any(|segment| segment == ".git")
}

/// Parse `git log --format=%H%x00%h%x00%an%x00%aI%x00%s` output.
pub fn parse_log_output(output: &str) -> Vec<CommitInfo> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\0').collect();
            if parts.len() < 5 {
                return None;
            }
            Some(CommitInfo {
                sha: parts[0].to_string(),
                short_sha: parts[1].to_string(),
                author_name: parts[2].to_string(),
                date: parts[3].to_string(),
                message: parts[4].to_string(),
            })
        })
        .collect()
}

/// Parse `git for-each-ref --format=%(refname:short)%00%(objectname)%00%(HEAD)` output.
pub fn parse_branch_list(output: &str) -> Vec<BranchInfo> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\0').collect();
            if parts.len() < 3 {
                return None;
            }
            Some(BranchInfo {
                name: parts[0].to_string(),
                tip_sha: parts[1].to_string(),
                is_head: parts[2].trim() == "*",
            })
        })
        .collect()
}

impl VcsPort for GitCli {
    fn init(&self, repo: &Path) -> AppResult<()> {
        std::fs::create_dir_all(repo)?;
        self.run(repo, &["init"])?;
        Ok(())
    }

    fn list_files(&self, repo: &Path) -> AppResult<Vec<String>> {
        let output = self.run(
            repo,
            &["ls-files", "--cached", "--others", "--exclude-standard", "-z"],
        )?;
        Ok(split_nul_paths(&output)
            .into_iter()
            .filter(|p| !is_vcs_internal(p))
            .collect())
    }

    fn list_branches(&self, repo: &Path) -> AppResult<Vec<BranchInfo>> {
        let output = self.run(
            repo,
            &[
                "for-each-ref",
                "--format=%(refname:short)%00%(objectname)%00%(HEAD)",
                "refs/heads/",
            ],
        )?;
        Ok(parse_branch_list(&output))
    }

    fn log(&self, repo: &Path, limit: usize) -> AppResult<Vec<CommitInfo>> {
        if !self.has_head(repo)? {
            return Ok(Vec::new());
        }
        let count_arg = format!("-{}", limit);
        let output = self.run(
            repo,
            &["log", &count_arg, "--format=%H%x00%h%x00%an%x00%aI%x00%s"],
        )?;
        Ok(parse_log_output(&output))
    }

    fn current_branch(&self, repo: &Path) -> AppResult<Option<String>> {
        let result = self.execute(repo, &["symbolic-ref", "--short", "-q", "HEAD"])?;
        if result.success {
            Ok(Some(result.stdout.trim().to_string()))
        } else if result.exit_code == 1 {
            Ok(None)
        } else {
            result.into_result().map(|_| None)
        }
    }

    fn checkout(&self, repo: &Path, branch: &str) -> AppResult<()> {
        self.run(repo, &["checkout", branch])?;
        Ok(())
    }

    fn create_branch(&self, repo: &Path, name: &str, base: Option<&str>) -> AppResult<()> {
        let mut args = vec!["branch", name];
        if let Some(base) = base {
            args.push(base);
        }
        self.run(repo, &args)?;
        Ok(())
    }

    fn merge(&self, repo: &Path, branch: &str) -> AppResult<MergeOutcome> {
        let result = self.execute(repo, &["merge", "--no-ff", "--no-edit", branch])?;
        if result.success {
            return Ok(MergeOutcome::Merged);
        }

        let unmerged = self.unmerged_paths(repo)?;
        if !unmerged.is_empty() {
            return Ok(MergeOutcome::Conflicted(unmerged));
        }

        let reason = if result.stderr.trim().is_empty() {
            result.stdout.trim().to_string()
        } else {
            result.stderr.trim().to_string()
        };
        Ok(MergeOutcome::Failed(reason))
    }

    fn stage(&self, repo: &Path, paths: &[String]) -> AppResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run(repo, &args)?;
        Ok(())
    }

    fn commit(&self, repo: &Path, message: &str) -> AppResult<String> {
        self.run(repo, &["commit", "--no-gpg-sign", "-m", message])?;
        Ok(self.run(repo, &["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn staged_files(&self, repo: &Path) -> AppResult<Vec<String>> {
        let output = self.run(repo, &["diff", "--cached", "--name-only", "-z"])?;
        Ok(split_nul_paths(&output))
    }

    fn unmerged_paths(&self, repo: &Path) -> AppResult<Vec<String>> {
        let output = self.run(repo, &["diff", "--name-only", "--diff-filter=U", "-z"])?;
        Ok(split_nul_paths(&output))
    }

    /// Detect in-progress operations from the git dir's sentinel files
    fn merge_state(&self, repo: &Path) -> AppResult<MergeStateKind> {
        let git_dir = self.rev_parse_path(repo, &["rev-parse", "--git-dir"])?;

        let kind = if git_dir.join("MERGE_HEAD").exists() {
            MergeStateKind::Merging
        } else if git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists() {
            MergeStateKind::Rebasing
        } else if git_dir.join("CHERRY_PICK_HEAD").exists() {
            MergeStateKind::CherryPicking
        } else if git_dir.join("REVERT_HEAD").exists() {
            MergeStateKind::Reverting
        } else {
            MergeStateKind::None
        };
        Ok(kind)
    }

    fn hooks_dir(&self, repo: &Path) -> AppResult<PathBuf> {
        self.rev_parse_path(repo, &["rev-parse", "--git-path", "hooks"])
    }
}
