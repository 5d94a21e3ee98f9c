//! Services
//!
//! The node store and the git synchronization engine, plus the hooks and
//! locks that orchestrate sync cycles.

pub mod git;
pub mod node_store;
pub mod sync;

pub use git::{GitCli, GitSyncEngine, VcsPort};
pub use node_store::NodeStore;
pub use sync::{install_git_hooks, trigger_hook, HookConfig, HookKind, HookOutcome, RepoLocks};
