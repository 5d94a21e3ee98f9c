//! Sync Orchestration
//!
//! Per-repository locking for sync cycles and the git hooks that trigger
//! them.

pub mod hooks;
pub mod lock;

pub use hooks::{
    install_git_hooks, trigger_hook, HookConfig, HookInstallResult, HookKind, HookOutcome,
    MANAGED_MARKER,
};
pub use lock::RepoLocks;
