//! Fake VCS used by engine unit tests. Files live in a real directory; refs,
//! the index and merge state are kept in memory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::utils::error::{AppError, AppResult};

use super::types::{BranchInfo, CommitInfo, MergeStateKind};
use super::vcs::{MergeOutcome, VcsPort};

#[derive(Debug, Default)]
struct FakeState {
    head: Option<String>,
    /// Branch name -> file tree checked out by `checkout`
    trees: BTreeMap<String, BTreeMap<String, String>>,
    staged: Vec<String>,
    commits: Vec<CommitInfo>,
    unmerged: Vec<String>,
    merge_state: MergeStateKind,
    merge_outcome: Option<MergeOutcome>,
}

#[derive(Debug, Default)]
pub struct FakeVcs {
    state: Mutex<FakeState>,
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> AppResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_name() == ".git" {
            continue;
        }
        if path.is_dir() {
            walk(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}

impl FakeVcs {
    pub fn new() -> Self {
        let vcs = Self::default();
        vcs.with_state(|s| {
            s.head = Some("main".to_string());
            s.trees.insert("main".to_string(), BTreeMap::new());
        });
        vcs
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    /// Register a branch whose checkout replaces the working files
    pub fn add_branch(&self, name: &str, files: &[(&str, &str)]) {
        let tree = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        self.with_state(|s| {
            s.trees.insert(name.to_string(), tree);
        });
    }

    pub fn set_merge_state(&self, kind: MergeStateKind, unmerged: &[&str]) {
        self.with_state(|s| {
            s.merge_state = kind;
            s.unmerged = unmerged.iter().map(|p| p.to_string()).collect();
        });
    }

    pub fn set_merge_outcome(&self, outcome: MergeOutcome) {
        self.with_state(|s| s.merge_outcome = Some(outcome));
    }

    pub fn staged(&self) -> Vec<String> {
        self.with_state(|s| s.staged.clone())
    }
}

impl VcsPort for FakeVcs {
    fn init(&self, repo: &Path) -> AppResult<()> {
        std::fs::create_dir_all(repo.join(".git").join("hooks"))?;
        Ok(())
    }

    fn list_files(&self, repo: &Path) -> AppResult<Vec<String>> {
        let mut files = Vec::new();
        walk(repo, repo, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn list_branches(&self, _repo: &Path) -> AppResult<Vec<BranchInfo>> {
        Ok(self.with_state(|s| {
            s.trees
                .keys()
                .map(|name| BranchInfo {
                    name: name.clone(),
                    is_head: s.head.as_deref() == Some(name.as_str()),
                    tip_sha: format!("{:040}", 0),
                })
                .collect()
        }))
    }

    fn log(&self, _repo: &Path, limit: usize) -> AppResult<Vec<CommitInfo>> {
        Ok(self.with_state(|s| s.commits.iter().rev().take(limit).cloned().collect()))
    }

    fn current_branch(&self, _repo: &Path) -> AppResult<Option<String>> {
        Ok(self.with_state(|s| s.head.clone()))
    }

    fn checkout(&self, repo: &Path, branch: &str) -> AppResult<()> {
        let tree = self
            .with_state(|s| s.trees.get(branch).cloned())
            .ok_or_else(|| AppError::external_tool("git", 1, format!("pathspec '{}' did not match", branch)))?;

        for file in self.list_files(repo)? {
            std::fs::remove_file(repo.join(&file))?;
        }
        for (file, content) in &tree {
            let path = repo.join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        self.with_state(|s| s.head = Some(branch.to_string()));
        Ok(())
    }

    fn create_branch(&self, repo: &Path, name: &str, _base: Option<&str>) -> AppResult<()> {
        let mut tree = BTreeMap::new();
        for file in self.list_files(repo)? {
            tree.insert(file.clone(), std::fs::read_to_string(repo.join(&file))?);
        }
        self.with_state(|s| {
            s.trees.insert(name.to_string(), tree);
        });
        Ok(())
    }

    fn merge(&self, _repo: &Path, branch: &str) -> AppResult<MergeOutcome> {
        let outcome = self.with_state(|s| s.merge_outcome.clone());
        match outcome {
            Some(outcome) => Ok(outcome),
            None if self.with_state(|s| s.trees.contains_key(branch)) => Ok(MergeOutcome::Merged),
            None => Ok(MergeOutcome::Failed(format!("merge: {} - not something we can merge", branch))),
        }
    }

    fn stage(&self, _repo: &Path, paths: &[String]) -> AppResult<()> {
        self.with_state(|s| {
            for path in paths {
                if !s.staged.contains(path) {
                    s.staged.push(path.clone());
                }
                s.unmerged.retain(|p| p != path);
            }
        });
        Ok(())
    }

    fn commit(&self, _repo: &Path, message: &str) -> AppResult<String> {
        Ok(self.with_state(|s| {
            let sha = format!("{:040x}", s.commits.len() + 1);
            s.commits.push(CommitInfo {
                short_sha: sha[..7].to_string(),
                sha: sha.clone(),
                author_name: "Test".to_string(),
                date: "2026-01-01T00:00:00+00:00".to_string(),
                message: message.to_string(),
            });
            s.staged.clear();
            sha
        }))
    }

    fn staged_files(&self, _repo: &Path) -> AppResult<Vec<String>> {
        Ok(self.staged())
    }

    fn unmerged_paths(&self, _repo: &Path) -> AppResult<Vec<String>> {
        Ok(self.with_state(|s| s.unmerged.clone()))
    }

    fn merge_state(&self, _repo: &Path) -> AppResult<MergeStateKind> {
        Ok(self.with_state(|s| s.merge_state))
    }

    fn hooks_dir(&self, repo: &Path) -> AppResult<PathBuf> {
        Ok(repo.join(".git").join("hooks"))
    }
}
