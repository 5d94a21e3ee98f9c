//! Repository Locks
//!
//! Advisory per-repository locks for the sync engine. Paths are
//! canonicalized so `repo`, `repo/.` and a symlink to `repo` share a lock.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};
use crate::utils::locks::{acquire, LockRegistry};

#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    registry: LockRegistry<PathBuf>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical form of `repo`; NotFound if it does not exist
    pub fn canonical(repo: &Path) -> AppResult<PathBuf> {
        std::fs::canonicalize(repo)
            .map_err(|_| AppError::not_found(format!("repository {}", repo.display())))
    }

    /// Run `f` while holding the lock for `repo`. `f` receives the
    /// canonical repository path.
    pub fn with_lock<T, F>(&self, repo: &Path, f: F) -> AppResult<T>
    where
        F: FnOnce(&Path) -> AppResult<T>,
    {
        let canonical = Self::canonical(repo)?;
        let lock = self.registry.lock_for(&canonical);
        let _guard = acquire(&lock, "repository")?;
        f(&canonical)
    }

    /// Number of repositories that have been locked at least once
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
